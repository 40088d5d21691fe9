//! 按模型族把文本切成词，每个词独立送入子词算法。

use regex::Regex;
use std::{ops::Range, sync::LazyLock};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PreTokenizer {
    /// BERT：按空白切分，标点和中日韩文字各自成词
    Bert,
    /// SentencePiece：按空白切分，词首补 `▁`
    Metaspace,
    /// GPT-2：正则切分，空格附着在后一个词上
    ByteLevel,
}

impl PreTokenizer {
    /// 返回每个词在 `text` 中的字节范围。
    pub fn split(self, text: &str) -> Vec<Range<usize>> {
        match self {
            Self::Bert => split_bert(text),
            Self::Metaspace => split_whitespace(text),
            Self::ByteLevel => split_byte_level(text),
        }
    }
}

fn split_whitespace(text: &str) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                words.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push(s..text.len());
    }
    words
}

fn split_bert(text: &str) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        let end = i + c.len_utf8();
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                words.push(s..i);
            }
        } else if is_punctuation(c) || is_cjk(c) {
            if let Some(s) = start.take() {
                words.push(s..i);
            }
            words.push(i..end);
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push(s..text.len());
    }
    words
}

/// ASCII 标点符号（包括 `$`、`^` 这类符号）和 Unicode 类别 P
fn is_punctuation(c: char) -> bool {
    static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{P}").unwrap());
    c.is_ascii_punctuation()
        || (!c.is_ascii() && PUNCTUATION.is_match(c.encode_utf8(&mut [0; 4])))
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4e00..=0x9fff
        | 0x3400..=0x4dbf
        | 0x20000..=0x2a6df
        | 0x2a700..=0x2b73f
        | 0x2b740..=0x2b81f
        | 0x2b820..=0x2ceaf
        | 0xf900..=0xfaff
        | 0x2f800..=0x2fa1f)
}

fn split_byte_level(text: &str) -> Vec<Range<usize>> {
    // regex 不支持 `\s+(?!\S)`，空白串之后紧跟词时把最后一个空格让给后面的词
    static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+").unwrap()
    });

    let mut words: Vec<Range<usize>> = Vec::new();
    for m in PATTERN.find_iter(text) {
        let range = m.range();
        if let Some(last) = words.last_mut() {
            let last_is_space = text[last.clone()].chars().all(char::is_whitespace);
            let joins = last_is_space
                && last.end == range.start
                && text[last.clone()].ends_with(' ')
                && !text[range.clone()].starts_with(char::is_whitespace);
            if joins {
                last.end -= 1;
                let start = last.end;
                if last.is_empty() {
                    words.pop();
                }
                words.push(start..range.end);
                continue;
            }
        }
        words.push(range);
    }
    words
}
