use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 解析或构造分词器过程中的任何失败，原因保留在 `source` 中
    #[error("unable to load tokenizer for `{model}`")]
    Load {
        model: String,
        #[source]
        source: LoadError,
    },
    #[error(
        "processing QA data is only supported with fast tokenizers; \
         load the tokenizer with `LoadOptions::use_fast(true)`"
    )]
    NotFast,
    #[error("tokenizer was loaded without offset support (`use_fast = false`)")]
    OffsetsUnavailable,
    #[error("{documents} documents but {indices} batch indices")]
    IndexMismatch { documents: usize, indices: usize },
    #[error(transparent)]
    Truncation(#[from] TruncationError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "could not infer tokenizer class from model config or name `{name}`; \
         set `LoadOptions::tokenizer_class` to one of: {candidates}"
    )]
    Unresolved { name: String, candidates: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("unknown tokenizer class `{0}`")]
    UnknownClass(String),
    #[error("failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse `{}`", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed vocabulary `{}`", path.display())]
    Vocab {
        path: PathBuf,
        #[source]
        source: VocabError,
    },
    #[error("special token `{0}` is missing from the vocabulary")]
    MissingSpecialToken(String),
}

/// 词表文件内容错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("line {line}: {reason}")]
    Line { line: usize, reason: &'static str },
    #[error("protobuf truncated at byte {0}")]
    Truncated(usize),
    #[error("unsupported protobuf wire type {wire} at byte {pos}")]
    WireType { wire: u8, pos: usize },
    #[error("piece is not valid utf-8 at byte {0}")]
    Utf8(usize),
    #[error("`{0}` is not a valid byte piece")]
    BytePiece(String),
    #[error("vocabulary is empty")]
    Empty,
    #[error("sentencepiece model type {0} is not supported")]
    ModelType(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TruncationError {
    #[error(
        "cannot remove {requested} tokens with strategy `{strategy}`: \
         only {available} available"
    )]
    TooShort {
        strategy: &'static str,
        available: usize,
        requested: usize,
    },
    #[error("sequence exceeds the maximum length by {requested} tokens and truncation is disabled")]
    Refused { requested: usize },
    #[error("strategy `only_second` needs a second sequence")]
    MissingPair,
    #[error("unknown truncation strategy `{0}`")]
    UnknownStrategy(String),
}
