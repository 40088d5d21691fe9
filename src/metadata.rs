//! 保留字符偏移和词首标记的分词，以及按最大长度截断。

use crate::{
    as_byte_token, error::Error, tokenizer::Tokenizer, truncation::TruncationStrategy, utok,
};
use regex::Regex;
use serde::Serialize;
use std::{borrow::Cow, iter::zip, sync::LazyLock};

/// 子词的前导标记：WordPiece 续接、字节级 BPE 空格、SentencePiece 空格
pub const SUBWORD_MARKERS: [&str; 3] = ["##", "Ġ", "▁"];

/// 每 50 万个词输出一次进度
const PROGRESS_INTERVAL: usize = 500_000;

/// 三个序列等长：词序号、词在文本中的起始字符位置、是否为词首。
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize)]
pub struct TokenizedText {
    pub tokens: Vec<utok>,
    pub offsets: Vec<usize>,
    pub start_of_word: Vec<bool>,
}

impl TokenizedText {
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// 每个空白字符替换为一个空格，字符数不变。
pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
    static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s").unwrap());
    WHITESPACE.replace_all(text, " ")
}

/// 分词并记录每个词的字符偏移和词首标记。
///
/// 快速分词器直接使用编码结果中的偏移和词编号；
/// 否则按空格切词，再逐词切分子词并累计偏移。
pub fn tokenize_with_metadata(text: &str, tokenizer: &Tokenizer) -> TokenizedText {
    let text = normalize_whitespace(text);
    if tokenizer.is_fast() {
        let encoding = tokenizer.encode_unchecked(&text, true);
        TokenizedText {
            offsets: encoding.offsets.iter().map(|&(start, _)| start).collect(),
            start_of_word: start_of_word_with_sentinels(&encoding.words),
            tokens: encoding.ids,
        }
    } else {
        let words = text.split(' ').collect::<Vec<_>>();
        let mut offsets = Vec::with_capacity(words.len());
        let mut cumulated = 0;
        for word in &words {
            offsets.push(cumulated);
            cumulated += word.chars().count() + 1;
        }
        words_to_tokens(&words, &offsets, tokenizer)
    }
}

/// 由词编号推出词首标记，编号变化的位置是词首。
///
/// 首个位置固定为 `-1`，末个位置与倒数第二个相同，所以开头和结尾的特殊词不算词首；
/// 中间的特殊词沿用前一个编号。
/// 开头没有特殊词的模型族（XLNet）的首个真实词因此不是词首。
pub fn start_of_word_with_sentinels(words: &[Option<u32>]) -> Vec<bool> {
    match words {
        [] => return Vec::new(),
        [only] => return vec![only.is_some()],
        _ => {}
    }
    let mut last = -1i64;
    let mut ids = words
        .iter()
        .map(|w| {
            last = w.map_or(last, i64::from);
            last
        })
        .collect::<Vec<_>>();
    let n = ids.len();
    ids[0] = -1;
    ids[n - 1] = ids[n - 2];

    let mut flags = Vec::with_capacity(n);
    flags.push(false);
    flags.extend(ids.windows(2).map(|w| w[1] - w[0] > 0));
    flags
}

/// 问答数据的词首标记：首个词是词首，其余在词编号变化时是词首。
pub fn start_of_word_qa(words: &[Option<u32>]) -> Vec<bool> {
    let mut flags = Vec::with_capacity(words.len());
    let mut last = None;
    for (i, &w) in words.iter().enumerate() {
        flags.push(i == 0 || w != last);
        last = w.or(last);
    }
    flags
}

fn words_to_tokens(words: &[&str], offsets: &[usize], tokenizer: &Tokenizer) -> TokenizedText {
    let mut out = TokenizedText::default();
    for (i, (&word, &offset)) in zip(words, offsets).enumerate() {
        if (i + 1) % PROGRESS_INTERVAL == 0 {
            log::info!("tokenized {} words", i + 1);
        }
        if word.is_empty() {
            continue;
        }
        let add_prefix_space = tokenizer.needs_prefix_space() && !out.tokens.is_empty();
        let pieces = tokenizer.tokenize(word, add_prefix_space);

        let mut offset = offset;
        for (j, piece) in pieces.iter().enumerate() {
            out.tokens.push(tokenizer.token_to_id(piece));
            out.offsets.push(offset);
            out.start_of_word.push(j == 0);

            offset += piece_width(strip_marker(piece), tokenizer.unk_token());
        }
    }
    out
}

/// 子词在原文中占的字符数。未知词算一个字符；字节词 `<0xNN>` 由字符的首字节计一个字符，
/// 后续字节（`0x80..=0xBF`）不计。
fn piece_width(piece: &str, unk: &str) -> usize {
    match as_byte_token(piece.as_bytes()) {
        Some(b) => usize::from(!matches!(b, 0x80..=0xbf)),
        None if piece == unk => 1,
        None => piece.chars().count(),
    }
}

/// 去掉子词开头的一个标记
fn strip_marker(piece: &str) -> &str {
    SUBWORD_MARKERS
        .iter()
        .find_map(|m| piece.strip_prefix(m))
        .unwrap_or(piece)
}

/// 截断后的两条序列与溢出部分。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Truncated<T> {
    pub seq_a: Vec<T>,
    pub seq_b: Option<Vec<T>>,
    pub overflow: Vec<T>,
}

/// 使一条或两条对齐的序列（加上特殊词后）不超过 `max_seq_len`。
///
/// `max_seq_len` 为 0 表示不限制长度。
pub fn truncate_sequences<T: Clone>(
    seq_a: Vec<T>,
    seq_b: Option<Vec<T>>,
    tokenizer: &Tokenizer,
    max_seq_len: usize,
    strategy: TruncationStrategy,
    with_special_tokens: bool,
    stride: usize,
) -> Result<Truncated<T>, Error> {
    let special = if with_special_tokens {
        tokenizer.num_special_tokens_to_add(seq_b.is_some())
    } else {
        0
    };
    let total = seq_a.len() + seq_b.as_ref().map_or(0, Vec::len) + special;
    if max_seq_len == 0 || total <= max_seq_len {
        return Ok(Truncated {
            seq_a,
            seq_b,
            overflow: Vec::new(),
        });
    }
    let (seq_a, seq_b, overflow) =
        tokenizer.truncate_sequences(seq_a, seq_b, total - max_seq_len, strategy, stride)?;
    Ok(Truncated {
        seq_a,
        seq_b,
        overflow,
    })
}
