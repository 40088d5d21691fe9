mod algorithm;
pub(crate) mod byte_level;
mod model_file;
mod unigram;

use crate::{
    as_byte_token,
    error::VocabError,
    utok,
    vocab::{CollectedVocab, CompressedVocab},
    Method, Segment,
};
use algorithm::{MergeState, Ranks, Symbol};
use model_file::{parse_model, ModelType, PieceType};
use std::{borrow::Cow, iter::zip};

pub use byte_level::ByteLevelBpe;

/// SentencePiece 模型文件描述的分词器。
///
/// BPE 模型按词的评分决定合并顺序，Unigram 模型选择评分之和最大的切分。
/// 两者都把词表外的字符回退到单字节词。
pub struct SentencePiece {
    model_type: ModelType,
    /// 保存所有词的字符串内容
    vocab: CompressedVocab,
    /// 按 token 顺序保存词的类型和合并排名
    tokens: Box<[(PieceType, u32)]>,
    /// 按 token 顺序保存词的原始评分
    scores: Box<[f32]>,
    /// Unigram 中无法切分的字符的评分
    unk_score: f32,
    /// 可由文本构造的词的最大字节数
    max_piece_len: usize,
    /// 按字符串的字典序排序的 token 索引，用于从字符串二分查找 token。
    /// 字节词的内容已被转义，不参与排序
    sorted_pieces: Box<[utok]>,
    /// 用于索引单字节 token，因此不需要其他元信息
    bytes: Box<[utok; 256]>,
    /// token: <unk>
    unk: utok,
}

impl SentencePiece {
    /// 解析 tokenizer.model 文件，按其中的模型类型构造 BPE 或 Unigram 分词器。
    pub fn from_tokenizer_model(model: &[u8]) -> Result<Self, VocabError> {
        let model = parse_model(model)?;
        if matches!(model.model_type, ModelType::Word | ModelType::Char) {
            return Err(VocabError::ModelType(model.model_type.name()));
        }
        let pieces = model.pieces;
        let unk = pieces
            .iter()
            .position(|p| p.ty == PieceType::Unknown)
            .unwrap_or(0) as utok;
        Self::build(
            model.model_type,
            pieces.iter().map(|p| p.piece),
            pieces.iter().map(|p| p.score),
            pieces.iter().map(|p| p.ty),
            unk,
        )
    }

    /// 由词表直接构造 BPE 分词器。
    pub fn new<'a>(
        vocabs: impl IntoIterator<Item = &'a str>,
        scores: impl IntoIterator<Item = f32>,
        is_byte: impl IntoIterator<Item = bool>,
        unk: utok,
    ) -> Result<Self, VocabError> {
        let types = is_byte
            .into_iter()
            .enumerate()
            .map(|(i, is_byte)| match (is_byte, i as utok == unk) {
                (true, _) => PieceType::Byte,
                (false, true) => PieceType::Unknown,
                (false, false) => PieceType::Normal,
            });
        Self::build(ModelType::Bpe, vocabs, scores, types, unk)
    }

    fn build<'a>(
        model_type: ModelType,
        vocabs: impl IntoIterator<Item = &'a str>,
        scores: impl IntoIterator<Item = f32>,
        types: impl IntoIterator<Item = PieceType>,
        unk: utok,
    ) -> Result<Self, VocabError> {
        let types = types.into_iter().collect::<Vec<_>>();
        let CollectedVocab {
            vocabs,
            total_len,
            bytes,
        } = CollectedVocab::collect_with_hint(
            vocabs.into_iter().map(str::as_bytes),
            types.iter().map(|&ty| ty == PieceType::Byte),
            unk,
        )?;
        if vocabs.is_empty() {
            return Err(VocabError::Empty);
        }
        let scores = scores.into_iter().collect::<Box<[_]>>();
        // 对分词评分重新赋权，转换为整型
        let rank = rank(&scores);
        if rank.len() != vocabs.len() || types.len() != vocabs.len() {
            return Err(VocabError::Line {
                line: rank.len().min(types.len()),
                reason: "scores size mismatch with vocab size",
            });
        }
        let vocab = CompressedVocab::new(&vocabs, total_len);
        let tokens = zip(types, rank).collect::<Box<[_]>>();
        // 对 token 按字符串的字典序排序，用于从字符串二分查找 token
        let mut sorted_pieces = (0..tokens.len() as utok)
            .filter(|&i| tokens[i as usize].0 != PieceType::Byte)
            .collect::<Box<[_]>>();
        sorted_pieces.sort_unstable_by_key(|&i| vocab.get(i));

        let mut min_score = f32::INFINITY;
        let mut max_piece_len = 0;
        for (i, &(ty, _)) in tokens.iter().enumerate() {
            if matches!(ty, PieceType::Normal | PieceType::UserDefined) {
                min_score = min_score.min(scores[i]);
                max_piece_len = max_piece_len.max(vocab.get(i as utok).len());
            }
        }
        log::debug!(
            "sentencepiece {} model: {} pieces, longest {max_piece_len} bytes",
            model_type.name(),
            tokens.len(),
        );

        Ok(Self {
            model_type,
            vocab,
            tokens,
            scores,
            unk_score: if min_score.is_finite() { min_score - 10. } else { -10. },
            max_piece_len,
            sorted_pieces,
            bytes,
            unk,
        })
    }

    /// piece -> token，包括控制词
    #[inline]
    fn find_piece(&self, piece: &[u8]) -> Option<utok> {
        self.sorted_pieces
            .binary_search_by_key(&piece, |&i| self.vocab.get(i))
            .ok()
            .map(|i| self.sorted_pieces[i])
    }

    /// piece -> 可以由文本构造的 token
    #[inline]
    fn find_normal(&self, piece: &[u8]) -> Option<utok> {
        self.find_piece(piece).filter(|&t| self.is_normal(t))
    }

    #[inline]
    fn is_normal(&self, token: utok) -> bool {
        matches!(
            self.tokens[token as usize].0,
            PieceType::Normal | PieceType::UserDefined
        )
    }

    /// 字符的各字节都有字节词时返回这些字节词
    fn byte_fallback(&self, bytes: &[u8]) -> Option<Vec<utok>> {
        bytes
            .iter()
            .map(|&b| Some(self.bytes[b as usize]).filter(|&t| t != self.unk))
            .collect()
    }

    /// 文本切分为初始符号：词表内的字符直接映射，否则回退到单字节词，
    /// 没有字节词时整个字符映射为 <unk>
    fn initial_symbols(&self, text: &str) -> Vec<(utok, std::ops::Range<usize>)> {
        let mut symbols = Vec::with_capacity(text.len());
        for (i, c) in text.char_indices() {
            let end = i + c.len_utf8();
            let bytes = &text.as_bytes()[i..end];
            if let Some(token) = self.find_normal(bytes) {
                symbols.push((token, i..end));
            } else if let Some(tokens) = self.byte_fallback(bytes) {
                symbols.extend(
                    tokens
                        .into_iter()
                        .enumerate()
                        .map(|(k, t)| (t, i + k..i + k + 1)),
                );
            } else {
                symbols.push((self.unk, i..end));
            }
        }
        symbols
    }
}

impl Ranks for SentencePiece {
    fn rank(&self, text: &[u8], left: &Symbol, right: &Symbol) -> Option<(u32, utok)> {
        if !self.is_normal(left.token) || !self.is_normal(right.token) {
            return None;
        }
        self.find_normal(&text[left.start..right.end])
            .map(|merged| (self.tokens[merged as usize].1, merged))
    }
}

impl Method for SentencePiece {
    #[inline]
    fn unk_token(&self) -> utok {
        self.unk
    }
    #[inline]
    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
    fn token_id(&self, piece: &str) -> Option<utok> {
        match as_byte_token(piece.as_bytes()) {
            Some(b) => Some(self.bytes[b as usize]).filter(|&t| t != self.unk),
            None => self.find_piece(piece.as_bytes()),
        }
    }
    fn piece(&self, token: utok) -> Cow<'_, str> {
        match self.tokens[token as usize].0 {
            PieceType::Byte => Cow::Owned(format!("<0x{:02X}>", self.vocab.get(token)[0])),
            _ => String::from_utf8_lossy(self.vocab.get(token)),
        }
    }
    fn encode(&self, text: &str) -> impl IntoIterator<Item = Segment> + '_ {
        match self.model_type {
            ModelType::Unigram => self.viterbi(text),
            _ => {
                let symbols = self.initial_symbols(text);
                MergeState::new(self, text.as_bytes(), symbols).into_segments()
            }
        }
    }
}

/// 对一组评分排序、去重并重新赋权，转换为保持相同顺序的整型序列
fn rank(scores: &[f32]) -> Vec<u32> {
    use std::{
        cmp::Ordering,
        collections::{BTreeMap, BTreeSet},
    };

    #[derive(PartialEq, Debug)]
    struct FloatOrd(f32);
    impl Eq for FloatOrd {}
    impl PartialOrd for FloatOrd {
        #[inline]
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for FloatOrd {
        #[inline]
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.total_cmp(&other.0)
        }
    }

    let map = scores
        // 排序 + 去重
        .iter()
        .copied()
        .map(FloatOrd)
        .collect::<BTreeSet<_>>()
        // 重新赋权，评分越高排名越靠前
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, f)| (f, i as u32))
        .collect::<BTreeMap<_, _>>();

    scores.iter().map(|f| map[&FloatOrd(*f)]).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bpe::model_file::tests::encode_model;

    /// `▁Berlin ▁is ▁a ▁city` 可以完整合并的小词表
    pub fn toy_model() -> Vec<u8> {
        let mut pieces = vec![
            ("<unk>", 0., 2),
            ("<s>", 0., 3),
            ("</s>", 0., 3),
            ("<cls>", 0., 3),
            ("<sep>", 0., 3),
            ("[CLS]", 0., 3),
            ("[SEP]", 0., 3),
            ("<0x21>", 0., 6),
        ];
        let merged = [
            ("▁B", -1.),
            ("▁Be", -2.),
            ("▁Ber", -3.),
            ("▁Berl", -4.),
            ("▁Berli", -5.),
            ("▁Berlin", -6.),
            ("▁i", -1.5),
            ("▁is", -2.5),
            ("▁a", -1.2),
            ("▁c", -1.1),
            ("it", -1.3),
            ("ity", -2.2),
            ("▁city", -3.3),
        ];
        pieces.extend(merged.iter().map(|&(p, s)| (p, s, 1)));
        let chars = ["▁", "B", "e", "r", "l", "i", "n", "s", "a", "c", "t", "y"];
        pieces.extend(chars.iter().map(|&c| (c, -10., 1)));
        encode_model(Some(2), &pieces)
    }

    /// Unigram 词表：`▁abc` 整体的评分高于任何拆分
    pub fn unigram_model() -> Vec<u8> {
        let mut pieces = vec![("<unk>", 0., 2), ("<s>", 0., 3), ("</s>", 0., 3)];
        pieces.extend([("▁abc", -1., 1), ("▁ab", -2., 1), ("bc", -2.5, 1), ("c", -3., 1)]);
        pieces.extend(["▁", "a", "b"].map(|c| (c, -5., 1)));
        pieces.extend([("<0xC3>", 0., 6), ("<0x9F>", 0., 6)]);
        encode_model(Some(1), &pieces)
    }

    fn pieces(bpe: &SentencePiece, text: &str) -> Vec<String> {
        bpe.encode(text)
            .into_iter()
            .map(|s| bpe.piece(s.token).into_owned())
            .collect()
    }

    #[test]
    fn merges_whole_words() {
        let bpe = SentencePiece::from_tokenizer_model(&toy_model()).unwrap();
        assert_eq!(bpe.unk_token(), 0);
        assert_eq!(pieces(&bpe, "▁Berlin"), ["▁Berlin"]);
        assert_eq!(pieces(&bpe, "▁city"), ["▁city"]);
        let segments = bpe.encode("▁is▁a").into_iter().collect::<Vec<_>>();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].range, 5..9);
    }

    #[test]
    fn falls_back_to_bytes_and_unk() {
        let bpe = SentencePiece::from_tokenizer_model(&toy_model()).unwrap();
        // '!' 只有字节词，'?' 完全未知
        assert_eq!(pieces(&bpe, "a!?"), ["a", "<0x21>", "<unk>"]);
    }

    #[test]
    fn control_pieces_are_not_built_from_text() {
        let bpe = SentencePiece::from_tokenizer_model(&toy_model()).unwrap();
        assert_eq!(bpe.token_id("<s>"), Some(1));
        assert_eq!(bpe.token_id("<0x21>"), Some(7));
        assert_eq!(bpe.token_id("<0x22>"), None);
        assert!(pieces(&bpe, "<s>").iter().all(|p| p != "<s>"));
    }

    #[test]
    fn ranks_follow_scores() {
        assert_eq!(rank(&[-1., 0., -1., -3.]), [1, 0, 1, 2]);
    }

    #[test]
    fn new_marks_unk_and_bytes() {
        let bpe = SentencePiece::new(["<unk>", "<0x41>", "a"], [0., 0., -1.], [false, true, false], 0)
            .unwrap();
        assert_eq!(bpe.vocab_size(), 3);
        assert_eq!(pieces(&bpe, "aA"), ["a", "<0x41>"]);
    }

    #[test]
    fn unigram_prefers_best_total_score() {
        let sp = SentencePiece::from_tokenizer_model(&unigram_model()).unwrap();
        assert_eq!(pieces(&sp, "▁abc"), ["▁abc"]);
        // ▁abc + c = -4 优于 ▁ab + c + c = -8
        assert_eq!(pieces(&sp, "▁abcc"), ["▁abc", "c"]);
        let segments = sp.encode("▁abc").into_iter().collect::<Vec<_>>();
        assert_eq!(segments[0].range, 0..6);
    }

    #[test]
    fn unigram_falls_back_to_bytes_and_merges_unknowns() {
        let sp = SentencePiece::from_tokenizer_model(&unigram_model()).unwrap();
        assert_eq!(pieces(&sp, "aß"), ["a", "<0xC3>", "<0x9F>"]);
        let segments = sp.encode("aß").into_iter().collect::<Vec<_>>();
        assert_eq!(segments[1].range, 1..2);
        assert_eq!(segments[2].range, 2..3);
        // 连续的未知字符合并为一个 <unk>
        let segments = sp.encode("a?!b").into_iter().collect::<Vec<_>>();
        let tokens = segments.iter().map(|s| s.token).collect::<Vec<_>>();
        assert_eq!(tokens[1], sp.unk_token());
        assert_eq!(segments[1].range, 1..3);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn rejects_word_and_char_models() {
        let model = encode_model(Some(3), &[("<unk>", 0., 2), ("▁a", 0., 1)]);
        assert!(matches!(
            SentencePiece::from_tokenizer_model(&model),
            Err(VocabError::ModelType("WORD"))
        ));
    }
}
