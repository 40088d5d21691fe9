//! WordPiece：对每个词做最长前缀匹配，词中间的片段使用 `##` 前缀的续接词。

use crate::{
    error::VocabError,
    utok,
    vocab::{CollectedVocab, CompressedVocab},
    Method, Segment,
};
use patricia_tree::PatriciaMap;
use std::borrow::Cow;

/// 续接词的前缀
pub const CONTINUATION: &str = "##";

pub struct WordPiece {
    /// 保存所有词的字符串内容
    vocab: CompressedVocab,
    /// 词首片段的前缀树
    words: PatriciaMap<utok>,
    /// 续接片段（去掉 `##`）的前缀树
    continuations: PatriciaMap<utok>,
    /// token: [UNK]
    unk: utok,
    /// 超过这个字符数的词直接映射为 [UNK]
    max_input_chars_per_word: usize,
}

impl WordPiece {
    /// 解析 BERT 的 vocab.txt，每行一个词，行号即词序号。
    pub fn from_vocab_txt(txt: &str, unk: &str) -> Result<Self, VocabError> {
        let lines = txt.lines().map(|line| line.trim_end_matches('\r')).collect::<Vec<_>>();
        let unk = lines
            .iter()
            .position(|&line| line == unk)
            .ok_or(VocabError::Line {
                line: 0,
                reason: "unknown token is missing from vocab.txt",
            })?;
        Self::new(lines, unk as _)
    }

    pub fn new<'a>(vocabs: impl IntoIterator<Item = &'a str>, unk: utok) -> Result<Self, VocabError> {
        let CollectedVocab {
            vocabs, total_len, ..
        } = CollectedVocab::collect(vocabs.into_iter().map(str::as_bytes), unk);
        if vocabs.is_empty() {
            return Err(VocabError::Empty);
        }
        let vocab = CompressedVocab::new(&vocabs, total_len);

        let mut words = PatriciaMap::new();
        let mut continuations = PatriciaMap::new();
        for (i, &piece) in vocabs.iter().enumerate() {
            if i as utok == unk {
                continue;
            }
            match piece.strip_prefix(CONTINUATION.as_bytes()) {
                Some(rest) if !rest.is_empty() => continuations.insert(rest, i as utok),
                _ => words.insert(piece, i as utok),
            };
        }

        Ok(Self {
            vocab,
            words,
            continuations,
            unk,
            max_input_chars_per_word: 100,
        })
    }

    fn whole_word_unk(&self, text: &str) -> Vec<Segment> {
        vec![Segment {
            token: self.unk,
            range: 0..text.len(),
        }]
    }
}

impl Method for WordPiece {
    #[inline]
    fn unk_token(&self) -> utok {
        self.unk
    }
    #[inline]
    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
    fn token_id(&self, piece: &str) -> Option<utok> {
        if self.vocab.get(self.unk) == piece.as_bytes() {
            return Some(self.unk);
        }
        match piece.strip_prefix(CONTINUATION) {
            Some(rest) if !rest.is_empty() => self.continuations.get(rest).copied(),
            _ => self.words.get(piece).copied(),
        }
    }
    #[inline]
    fn piece(&self, token: utok) -> Cow<'_, str> {
        String::from_utf8_lossy(self.vocab.get(token))
    }
    fn encode(&self, text: &str) -> impl IntoIterator<Item = Segment> + '_ {
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() > self.max_input_chars_per_word {
            return self.whole_word_unk(text);
        }

        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut start = 0;
        while start < bytes.len() {
            let trie = if start == 0 {
                &self.words
            } else {
                &self.continuations
            };
            match trie.get_longest_common_prefix(&bytes[start..]) {
                Some((pre, &token))
                    if !pre.is_empty() && text.is_char_boundary(start + pre.len()) =>
                {
                    segments.push(Segment {
                        token,
                        range: start..start + pre.len(),
                    });
                    start += pre.len();
                }
                // 任何位置无法匹配时整个词都是未知词
                _ => return self.whole_word_unk(text),
            }
        }
        segments
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const VOCAB_TXT: &str = "[PAD]
[UNK]
[CLS]
[SEP]
[MASK]
berlin
is
a
city
ci
##ty
##s
,
un
##aff
##able
";

    fn pieces(wp: &WordPiece, text: &str) -> Vec<String> {
        wp.encode(text)
            .into_iter()
            .map(|s| wp.piece(s.token).into_owned())
            .collect()
    }

    #[test]
    fn greedy_longest_prefix() {
        let wp = WordPiece::from_vocab_txt(VOCAB_TXT, "[UNK]").unwrap();
        assert_eq!(wp.unk_token(), 1);
        assert_eq!(pieces(&wp, "city"), ["city"]);
        assert_eq!(pieces(&wp, "cis"), ["ci", "##s"]);
        assert_eq!(pieces(&wp, "unaffable"), ["un", "##aff", "##able"]);
    }

    #[test]
    fn unmatched_word_is_unknown() {
        let wp = WordPiece::from_vocab_txt(VOCAB_TXT, "[UNK]").unwrap();
        let segments = wp.encode("cityx").into_iter().collect::<Vec<_>>();
        assert_eq!(segments, [Segment { token: 1, range: 0..5 }]);
        assert_eq!(pieces(&wp, &"a".repeat(101)), ["[UNK]"]);
    }

    #[test]
    fn looks_up_pieces() {
        let wp = WordPiece::from_vocab_txt(VOCAB_TXT, "[UNK]").unwrap();
        assert_eq!(wp.token_id("[CLS]"), Some(2));
        assert_eq!(wp.token_id("##ty"), Some(10));
        assert_eq!(wp.token_id("ty"), None);
        assert_eq!(wp.token_id("[UNK]"), Some(1));
        assert_eq!(wp.vocab_size(), 16);
    }

    #[test]
    fn requires_unknown_token() {
        assert!(matches!(
            WordPiece::from_vocab_txt("a\nb\n", "[UNK]"),
            Err(VocabError::Line { .. })
        ));
    }
}
