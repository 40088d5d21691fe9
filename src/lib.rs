mod bpe;
mod class;
mod error;
mod metadata;
mod normalize;
mod pretokenize;
mod qa;
mod resolve;
mod tokenizer;
mod truncation;
mod vocab;
mod wordpiece;

use std::{borrow::Cow, ops::Range};

pub use bpe::{ByteLevelBpe, SentencePiece};
pub use class::TokenizerClass;
pub use error::{Error, LoadError, TruncationError, VocabError};
pub use metadata::{
    normalize_whitespace, start_of_word_qa, start_of_word_with_sentinels, tokenize_with_metadata,
    truncate_sequences, TokenizedText, Truncated, SUBWORD_MARKERS,
};
pub use qa::{
    tokenize_batch_question_answering, Answer, Basket, QaInput, QaItem, QuestionSample,
    TokenizedSequence,
};
pub use resolve::{get_tokenizer, infer_tokenizer_class, LoadOptions, ModelConfig};
pub use tokenizer::{Encoding, Model, Tokenizer};
pub use truncation::TruncationStrategy;
pub use wordpiece::WordPiece;

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// 分词算法的输出单元：词序号及其在输入文本中的字节范围。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Segment {
    pub token: utok,
    pub range: Range<usize>,
}

/// 子词切分算法。
pub trait Method {
    fn unk_token(&self) -> utok;
    fn vocab_size(&self) -> usize;
    /// piece -> token
    fn token_id(&self, piece: &str) -> Option<utok>;
    /// token -> 词表中的字面形式
    fn piece(&self, token: utok) -> Cow<'_, str>;
    fn encode(&self, text: &str) -> impl IntoIterator<Item = Segment> + '_;
}

const fn as_byte_token(piece: &[u8]) -> Option<u8> {
    // 按结构分解并转换
    match piece {
        &[b'<', b'0', b'x', a, b, b'>'] if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => {
            // ascii 转数字
            #[inline(always)]
            const fn to_num(c: u8) -> u8 {
                match c {
                    b'0'..=b'9' => c - b'0',
                    b'a'..=b'f' => c - b'a' + 10,
                    b'A'..=b'F' => c - b'A' + 10,
                    _ => unreachable!(),
                }
            }

            Some(to_num(a) * 16 + to_num(b))
        }
        _ => None,
    }
}
