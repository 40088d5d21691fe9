//! 这个模块提供对词表的预处理功能，这些功能适用于多种不同算法的分词器。

use crate::{as_byte_token, error::VocabError, utok};
use std::{iter::zip, slice::from_ref};

/// 收集和预处理词表。
///
/// SentencePiece 词表中同时包含一般词（*Normal token*）和单字节词（*Byte token*）。
/// 二者在相同的词空间中，但语义不同：单字节词 `<0x41>` 表示词表以外内容的一个字节，
/// 必须与一般词 `A` 分离到不同的空间中索引。
/// WordPiece 和字节级 BPE 的词表只有一般词。
pub(crate) struct CollectedVocab<'s> {
    /// 词序列表，按词序分割存储每个词的字节序列，并对字节词转义
    pub vocabs: Vec<&'s [u8]>,
    /// 词序表中片段的总字节数
    pub total_len: usize,
    /// 字节词到词序号的映射
    pub bytes: Box<[utok; 256]>,
}

impl<'s> CollectedVocab<'s> {
    /// 收集词表，所有词都视为一般词。
    pub fn collect(vocabs: impl IntoIterator<Item = &'s [u8]>, unk: utok) -> Self {
        let vocabs = vocabs.into_iter().collect::<Vec<_>>();
        let total_len = vocabs.iter().map(|piece| piece.len()).sum();
        Self {
            vocabs,
            total_len,
            bytes: Box::new([unk; 256]),
        }
    }

    /// 收集词表，根据提示决定一个词是否是单字节词。
    pub fn collect_with_hint(
        vocabs: impl IntoIterator<Item = &'s [u8]>,
        is_byte: impl IntoIterator<Item = bool>,
        unk: utok,
    ) -> Result<Self, VocabError> {
        let mut bytes = Box::new([unk; 256]);
        let mut total_len = 0;
        let mut collected = Vec::new();
        for (i, (piece, is_byte)) in zip(vocabs, is_byte).enumerate() {
            let piece = if is_byte {
                let b = as_byte_token(piece).ok_or_else(|| {
                    VocabError::BytePiece(String::from_utf8_lossy(piece).into_owned())
                })? as usize;
                bytes[b] = i as _;
                from_ref(&BYTES[b])
            } else {
                piece
            };
            total_len += piece.len();
            collected.push(piece);
        }
        Ok(Self {
            vocabs: collected,
            total_len,
            bytes,
        })
    }
}

/// 利用词表中的重复部分压缩词表。
pub(crate) struct CompressedVocab {
    pub vocabs: Box<[u8]>,
    pub slices: Vec<(usize, usize)>,
}

impl CompressedVocab {
    pub fn new(vocabs: &[&[u8]], total_len: usize) -> Self {
        // 创建字符内容缓存
        let mut slices = vec![(0usize, 0usize); vocabs.len()];
        let mut text_buf = Vec::<u8>::with_capacity(total_len);
        let mut indices = (0..vocabs.len()).collect::<Vec<_>>();
        // 对词按内容长度从长到短排序，因为短的内容有可能是长内容的子串，可以避免重复存储相同内容
        indices.sort_unstable_by_key(|&i| -(vocabs[i].len() as isize));
        for i in indices {
            let v = vocabs[i];
            // 查找子串，若存在则复用，否则将新的内容追加到缓存
            let off = memchr::memmem::find(&text_buf, v).unwrap_or_else(|| {
                let off = text_buf.len();
                text_buf.extend(v);
                off
            });
            slices[i] = (off, v.len());
        }
        log::debug!(
            "compressed {} pieces from {total_len} to {} bytes",
            vocabs.len(),
            text_buf.len(),
        );
        Self {
            vocabs: text_buf.into_boxed_slice(),
            slices,
        }
    }

    /// token id -> 字节内容
    #[inline]
    pub fn get(&self, token: utok) -> &[u8] {
        let (off, len) = self.slices[token as usize];
        &self.vocabs[off..][..len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slices.len()
    }
}

const BYTES: [u8; 256] = {
    let mut bytes = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        bytes[i] = i as _;
        i += 1;
    }
    bytes
};
