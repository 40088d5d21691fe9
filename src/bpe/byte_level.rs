//! GPT-2 / RoBERTa 使用的字节级 BPE。
//!
//! 词表中的每个字符代表一个字节，不可见字节被映射到 U+0100 之后的字符，
//! 所以空格在词表中写作 `Ġ`。合并顺序由 merges.txt 的行号决定。

use super::algorithm::{MergeState, Ranks, Symbol};
use crate::{error::VocabError, utok, Method, Segment};
use std::{borrow::Cow, collections::HashMap, sync::LazyLock};

pub struct ByteLevelBpe {
    /// 按 token 顺序保存词表中的字面形式
    pieces: Box<[String]>,
    /// piece -> token
    ids: HashMap<String, utok>,
    /// (左, 右) -> (排名, 合并结果)
    merges: HashMap<(utok, utok), (u32, utok)>,
    /// 每个字节对应的初始 token
    bytes: Box<[utok; 256]>,
    unk: utok,
}

/// 字节到可见字符的映射表
pub(crate) static BYTES_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut table = ['\0'; 256];
    let mut n = 0;
    for b in 0..=255u8 {
        let visible = matches!(b, b'!'..=b'~' | 0xa1..=0xac | 0xae..=0xff);
        table[b as usize] = if visible {
            b as char
        } else {
            n += 1;
            char::from_u32(0xff + n).unwrap_or('\u{fffd}')
        };
    }
    table
});

impl ByteLevelBpe {
    /// 解析 vocab.json 与 merges.txt。
    pub fn from_files(vocab_json: &str, merges_txt: &str, unk: &str) -> Result<Self, VocabError> {
        let ids = serde_json::from_str::<HashMap<String, utok>>(vocab_json).map_err(|_| {
            VocabError::Line {
                line: 0,
                reason: "vocab.json is not a map of piece to id",
            }
        })?;
        let mut merges = Vec::new();
        for (i, line) in merges_txt.lines().enumerate() {
            if line.starts_with("#version") || line.trim().is_empty() {
                continue;
            }
            match line.split_once(' ') {
                Some((l, r)) if !r.contains(' ') => merges.push((i + 1, l, r)),
                _ => {
                    return Err(VocabError::Line {
                        line: i + 1,
                        reason: "expected two space separated pieces",
                    })
                }
            }
        }
        Self::new(ids, merges.into_iter(), unk)
    }

    /// 从词表和按优先级排列的合并规则构造分词器，`line` 只用于报错。
    pub fn new<'a>(
        ids: HashMap<String, utok>,
        merges: impl IntoIterator<Item = (usize, &'a str, &'a str)>,
        unk: &str,
    ) -> Result<Self, VocabError> {
        let size = ids.values().map(|&t| t as usize + 1).max().ok_or(VocabError::Empty)?;
        let mut pieces = vec![String::new(); size];
        for (piece, &t) in &ids {
            pieces[t as usize].clone_from(piece);
        }
        let unk = ids.get(unk).copied().unwrap_or(0);

        let find = |line, piece: &str| {
            ids.get(piece).copied().ok_or(VocabError::Line {
                line,
                reason: "merge refers to a piece missing from the vocabulary",
            })
        };
        let mut table = HashMap::new();
        for (rank, (line, l, r)) in merges.into_iter().enumerate() {
            let pair = (find(line, l)?, find(line, r)?);
            let merged = find(line, &format!("{l}{r}"))?;
            table.entry(pair).or_insert((rank as u32, merged));
        }

        let mut bytes = Box::new([unk; 256]);
        let mut buf = [0u8; 4];
        for (b, c) in BYTES_CHAR.iter().enumerate() {
            if let Some(&t) = ids.get(&*c.encode_utf8(&mut buf)) {
                bytes[b] = t;
            }
        }

        Ok(Self {
            pieces: pieces.into_boxed_slice(),
            ids,
            merges: table,
            bytes,
            unk,
        })
    }
}

impl Ranks for ByteLevelBpe {
    #[inline]
    fn rank(&self, _text: &[u8], left: &Symbol, right: &Symbol) -> Option<(u32, utok)> {
        self.merges.get(&(left.token, right.token)).copied()
    }
}

impl Method for ByteLevelBpe {
    #[inline]
    fn unk_token(&self) -> utok {
        self.unk
    }
    #[inline]
    fn vocab_size(&self) -> usize {
        self.pieces.len()
    }
    #[inline]
    fn token_id(&self, piece: &str) -> Option<utok> {
        self.ids.get(piece).copied()
    }
    #[inline]
    fn piece(&self, token: utok) -> Cow<'_, str> {
        Cow::Borrowed(&self.pieces[token as usize])
    }
    fn encode(&self, text: &str) -> impl IntoIterator<Item = Segment> + '_ {
        let symbols = text
            .bytes()
            .enumerate()
            .map(|(i, b)| (self.bytes[b as usize], i..i + 1));
        MergeState::new(self, text.as_bytes(), symbols).into_segments()
    }
}
