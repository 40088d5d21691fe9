use crate::{
    bpe::{ByteLevelBpe, SentencePiece},
    class::{ModelKind, SpecialTokens, TokenizerClass},
    error::{Error, LoadError, TruncationError},
    normalize::{char_positions, Normalized, Normalizer},
    pretokenize::PreTokenizer,
    truncation::{self, TruncationStrategy},
    utok,
    wordpiece::WordPiece,
    Method, Segment,
};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, fs,
    ops::Range,
    path::{Path, PathBuf},
};

/// SentencePiece 模型文件的候选文件名，按顺序查找
const SENTENCEPIECE_FILES: [&str; 4] = [
    "spiece.model",
    "sentencepiece.bpe.model",
    "spm.model",
    "tokenizer.model",
];

/// 三种子词算法之一。
pub enum Model {
    WordPiece(WordPiece),
    SentencePiece(SentencePiece),
    ByteLevel(ByteLevelBpe),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Model::WordPiece($m) => $body,
            Model::SentencePiece($m) => $body,
            Model::ByteLevel($m) => $body,
        }
    };
}

impl Method for Model {
    fn unk_token(&self) -> utok {
        dispatch!(self, m => m.unk_token())
    }
    fn vocab_size(&self) -> usize {
        dispatch!(self, m => m.vocab_size())
    }
    fn token_id(&self, piece: &str) -> Option<utok> {
        dispatch!(self, m => m.token_id(piece))
    }
    fn piece(&self, token: utok) -> Cow<'_, str> {
        dispatch!(self, m => m.piece(token))
    }
    fn encode(&self, text: &str) -> impl IntoIterator<Item = Segment> + '_ {
        dispatch!(self, m => m.encode(text).into_iter().collect::<Vec<_>>())
    }
}

/// 快速路径的编码结果，各字段等长。
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize)]
pub struct Encoding {
    pub ids: Vec<utok>,
    /// 词表中的字面形式
    pub tokens: Vec<String>,
    /// 每个词在原文中的字符范围，添加的特殊词为 `(0, 0)`
    pub offsets: Vec<(usize, usize)>,
    /// 每个词来自原文第几个词，特殊词为 `None`
    pub words: Vec<Option<u32>>,
    pub special_tokens_mask: Vec<bool>,
}

impl Encoding {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn push(
        &mut self,
        id: utok,
        token: String,
        offsets: (usize, usize),
        word: Option<u32>,
        special: bool,
    ) {
        self.ids.push(id);
        self.tokens.push(token);
        self.offsets.push(offsets);
        self.words.push(word);
        self.special_tokens_mask.push(special);
    }
}

/// 预训练分词器：子词算法、特殊词和模型族的行为。
pub struct Tokenizer {
    class: TokenizerClass,
    model: Model,
    names: SpecialTokens,
    cls: utok,
    sep: utok,
    /// 文本中按字面出现时整体识别的特殊词
    special: HashMap<String, utok>,
    special_regex: Option<Regex>,
    normalizer: Normalizer,
    is_fast: bool,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("class", &self.class)
            .field("vocab_size", &self.model.vocab_size())
            .field("do_lower_case", &self.normalizer.lowercase)
            .field("is_fast", &self.is_fast)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// `is_fast` 为 `false` 时分词器不报告偏移，只能走逐词切分的慢速路径。
    pub fn new(
        class: TokenizerClass,
        model: Model,
        do_lower_case: bool,
        is_fast: bool,
    ) -> Result<Self, LoadError> {
        let names = class.special_tokens();
        let find = |piece: &str| {
            model
                .token_id(piece)
                .ok_or_else(|| LoadError::MissingSpecialToken(piece.to_string()))
        };
        let cls = find(names.cls)?;
        let sep = find(names.sep)?;
        let unk = find(names.unk)?;

        let mut special = HashMap::from([
            (names.cls.to_string(), cls),
            (names.sep.to_string(), sep),
            (names.unk.to_string(), unk),
        ]);
        for piece in [names.pad, names.mask] {
            if let Some(t) = model.token_id(piece) {
                special.insert(piece.to_string(), t);
            }
        }
        let special_regex = build_pattern(special.keys());

        log::debug!(
            "{class} tokenizer: {} pieces, {} special tokens, fast = {is_fast}",
            model.vocab_size(),
            special.len(),
        );
        Ok(Self {
            class,
            model,
            names,
            cls,
            sep,
            special,
            special_regex,
            normalizer: class.normalizer(do_lower_case),
            is_fast,
        })
    }

    /// 从模型目录读取词表文件。
    pub fn from_pretrained(
        dir: &Path,
        class: TokenizerClass,
        do_lower_case: bool,
        is_fast: bool,
    ) -> Result<Self, LoadError> {
        let unk = class.special_tokens().unk;
        let model = match class.model_kind() {
            ModelKind::WordPiece => {
                let path = dir.join("vocab.txt");
                let txt = read_to_string(&path)?;
                let wp = WordPiece::from_vocab_txt(&txt, unk)
                    .map_err(|source| LoadError::Vocab { path, source })?;
                Model::WordPiece(wp)
            }
            ModelKind::ByteLevel => {
                let path = dir.join("vocab.json");
                let vocab = read_to_string(&path)?;
                let merges = read_to_string(&dir.join("merges.txt"))?;
                let bpe = ByteLevelBpe::from_files(&vocab, &merges, unk)
                    .map_err(|source| LoadError::Vocab { path, source })?;
                Model::ByteLevel(bpe)
            }
            ModelKind::SentencePiece => {
                let path = SENTENCEPIECE_FILES
                    .iter()
                    .map(|name| dir.join(name))
                    .find(|path| path.is_file())
                    .unwrap_or_else(|| dir.join(SENTENCEPIECE_FILES[0]));
                let bytes = fs::read(&path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                let sp = SentencePiece::from_tokenizer_model(&bytes)
                    .map_err(|source| LoadError::Vocab { path, source })?;
                Model::SentencePiece(sp)
            }
        };
        Self::new(class, model, do_lower_case, is_fast)
    }

    #[inline]
    pub fn class(&self) -> TokenizerClass {
        self.class
    }

    #[inline]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[inline]
    pub fn is_fast(&self) -> bool {
        self.is_fast
    }

    #[inline]
    pub fn do_lower_case(&self) -> bool {
        self.normalizer.lowercase
    }

    #[inline]
    pub fn needs_prefix_space(&self) -> bool {
        self.class.needs_prefix_space()
    }

    #[inline]
    pub fn unk_token(&self) -> &str {
        self.names.unk
    }

    /// 把文本切成词表中的字面形式。`add_prefix_space` 只对字节级 BPE 有意义，
    /// 让文本开头的词也带上 `Ġ`。
    pub fn tokenize(&self, text: &str, add_prefix_space: bool) -> Vec<String> {
        self.split(text, add_prefix_space).tokens
    }

    /// piece -> token，词表外的 piece 映射为未知词
    pub fn token_to_id(&self, piece: &str) -> utok {
        self.special
            .get(piece)
            .copied()
            .or_else(|| self.model.token_id(piece))
            .unwrap_or_else(|| self.model.unk_token())
    }

    /// 编码并报告偏移，只有快速分词器支持。
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding, Error> {
        if !self.is_fast {
            return Err(Error::OffsetsUnavailable);
        }
        Ok(self.encode_unchecked(text, add_special_tokens))
    }

    /// 并行编码一批文本。
    pub fn encode_batch<S>(
        &self,
        texts: &[S],
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>, Error>
    where
        S: AsRef<str> + Sync,
    {
        if !self.is_fast {
            return Err(Error::OffsetsUnavailable);
        }
        Ok(texts
            .par_iter()
            .map(|text| self.encode_unchecked(text.as_ref(), add_special_tokens))
            .collect())
    }

    /// 编码单条（`pair = false`）或成对序列时需要补充的特殊词数量。
    #[inline]
    pub fn num_special_tokens_to_add(&self, pair: bool) -> usize {
        self.class.layout().num_special_tokens(pair)
    }

    /// 从序列中删除 `num_tokens_to_remove` 个元素，返回截断后的两条序列和溢出部分。
    pub fn truncate_sequences<T: Clone>(
        &self,
        ids: Vec<T>,
        pair: Option<Vec<T>>,
        num_tokens_to_remove: usize,
        strategy: TruncationStrategy,
        stride: usize,
    ) -> Result<(Vec<T>, Option<Vec<T>>, Vec<T>), TruncationError> {
        truncation::truncate(ids, pair, num_tokens_to_remove, strategy, stride)
    }

    pub(crate) fn encode_unchecked(&self, text: &str, add_special_tokens: bool) -> Encoding {
        let mut encoding = self.split(text, false);
        if add_special_tokens {
            self.add_special_tokens(&mut encoding);
        }
        encoding
    }

    fn add_special_tokens(&self, encoding: &mut Encoding) {
        use crate::class::Layout;

        let special = |id, piece: &str| Encoding {
            ids: vec![id],
            tokens: vec![piece.to_string()],
            offsets: vec![(0, 0)],
            words: vec![None],
            special_tokens_mask: vec![true],
        };
        let (head, tail) = match self.class.layout() {
            Layout::Bert | Layout::Roberta => (
                vec![special(self.cls, self.names.cls)],
                vec![special(self.sep, self.names.sep)],
            ),
            Layout::XlNet => (
                vec![],
                vec![
                    special(self.sep, self.names.sep),
                    special(self.cls, self.names.cls),
                ],
            ),
        };
        let body = std::mem::take(encoding);
        for part in head.into_iter().chain([body]).chain(tail) {
            encoding.ids.extend(part.ids);
            encoding.tokens.extend(part.tokens);
            encoding.offsets.extend(part.offsets);
            encoding.words.extend(part.words);
            encoding.special_tokens_mask.extend(part.special_tokens_mask);
        }
    }

    /// 先识别文本中的特殊词，再对其余部分分词。
    fn split(&self, text: &str, add_prefix_space: bool) -> Encoding {
        let chars = char_positions(text);
        let mut encoding = Encoding::default();
        let mut word = 0;
        let mut start = 0;
        if let Some(regex) = &self.special_regex {
            for m in regex.find_iter(text) {
                let plain = start..m.start();
                self.split_plain(text, plain, add_prefix_space, &chars, &mut word, &mut encoding);
                encoding.push(
                    self.special[m.as_str()],
                    m.as_str().to_string(),
                    (chars[m.start()], chars[m.end()]),
                    None,
                    true,
                );
                start = m.end();
            }
        }
        let plain = start..text.len();
        self.split_plain(text, plain, add_prefix_space, &chars, &mut word, &mut encoding);
        encoding
    }

    fn split_plain(
        &self,
        text: &str,
        range: Range<usize>,
        add_prefix_space: bool,
        chars: &[usize],
        word: &mut u32,
        encoding: &mut Encoding,
    ) {
        let pre = self.class.pre_tokenizer();
        for w in pre.split(&text[range.clone()]) {
            let w = range.start + w.start..range.start + w.end;
            let piece = &text[w.clone()];
            let prefix = match pre {
                PreTokenizer::Metaspace => "▁",
                PreTokenizer::ByteLevel
                    if add_prefix_space && w.start == 0 && !piece.starts_with(' ') =>
                {
                    " "
                }
                _ => "",
            };
            let normalized = Normalized::new(piece, w.start, prefix, self.normalizer);
            for segment in self.model.encode(&normalized.text) {
                let mut span = normalized.original(segment.range);
                if pre == PreTokenizer::ByteLevel {
                    // 偏移不包括附着在词前的空格
                    let skip = text[span.clone()].len() - text[span.clone()].trim_start().len();
                    span.start += skip;
                }
                encoding.push(
                    segment.token,
                    self.model.piece(segment.token).into_owned(),
                    (chars[span.start], chars[span.end]),
                    Some(*word),
                    false,
                );
            }
            *word += 1;
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: PathBuf::from(path),
        source,
    })
}

/// 特殊词的匹配模式，较长的词优先。
fn build_pattern<'a>(text: impl IntoIterator<Item = &'a String>) -> Option<Regex> {
    let mut pieces = text.into_iter().map(String::as_str).collect::<Vec<_>>();
    if pieces.is_empty() {
        return None;
    }
    pieces.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let pattern = pieces.into_iter().map(regex::escape).collect::<Vec<_>>().join("|");
    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::warn!("special tokens will not be matched in text: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bpe::{
            byte_level,
            tests::{toy_model, unigram_model},
        },
        wordpiece::tests::VOCAB_TXT,
    };

    fn bert() -> Tokenizer {
        let wp = WordPiece::from_vocab_txt(VOCAB_TXT, "[UNK]").unwrap();
        Tokenizer::new(TokenizerClass::Bert, Model::WordPiece(wp), true, true).unwrap()
    }

    fn roberta() -> Tokenizer {
        let bpe = ByteLevelBpe::from_files(
            byte_level::tests::VOCAB_JSON,
            byte_level::tests::MERGES_TXT,
            "<unk>",
        )
        .unwrap();
        Tokenizer::new(TokenizerClass::Roberta, Model::ByteLevel(bpe), false, true).unwrap()
    }

    fn xlnet() -> Tokenizer {
        let bpe = SentencePiece::from_tokenizer_model(&toy_model()).unwrap();
        Tokenizer::new(TokenizerClass::XlNet, Model::SentencePiece(bpe), false, true).unwrap()
    }

    fn cafe(do_lower_case: bool) -> Tokenizer {
        let wp = WordPiece::from_vocab_txt("[PAD]\n[UNK]\n[CLS]\n[SEP]\ncafe\n", "[UNK]").unwrap();
        Tokenizer::new(TokenizerClass::Bert, Model::WordPiece(wp), do_lower_case, true).unwrap()
    }

    #[test]
    fn bert_lowercases_and_adds_specials() {
        let enc = bert().encode("Berlin is a city", true).unwrap();
        assert_eq!(enc.tokens, ["[CLS]", "berlin", "is", "a", "city", "[SEP]"]);
        assert_eq!(enc.offsets, [(0, 0), (0, 6), (7, 9), (10, 11), (12, 16), (0, 0)]);
        assert_eq!(enc.words, [None, Some(0), Some(1), Some(2), Some(3), None]);
        assert_eq!(enc.special_tokens_mask, [true, false, false, false, false, true]);
    }

    #[test]
    fn bert_continuations_share_word() {
        let enc = bert().encode("cis, unaffable", false).unwrap();
        assert_eq!(enc.tokens, ["ci", "##s", ",", "un", "##aff", "##able"]);
        assert_eq!(enc.words, [Some(0), Some(0), Some(1), Some(2), Some(2), Some(2)]);
        assert_eq!(enc.offsets[1], (2, 3));
    }

    #[test]
    fn literal_special_tokens_are_kept_whole() {
        let enc = bert().encode("a [SEP] city", false).unwrap();
        assert_eq!(enc.tokens, ["a", "[SEP]", "city"]);
        assert_eq!(enc.ids[1], 3);
        assert_eq!(enc.words, [Some(0), None, Some(1)]);
        assert_eq!(enc.offsets[1], (2, 7));
    }

    #[test]
    fn byte_level_offsets_skip_spaces() {
        let enc = roberta().encode("Berlin is a city", true).unwrap();
        assert_eq!(enc.tokens, ["<s>", "Berlin", "Ġis", "Ġa", "Ġcity", "</s>"]);
        assert_eq!(enc.offsets[2..5], [(7, 9), (10, 11), (12, 16)]);
    }

    #[test]
    fn byte_level_prefix_space() {
        let tok = roberta();
        assert_eq!(tok.tokenize("city", false), ["c", "ity"]);
        assert_eq!(tok.tokenize("city", true), ["Ġcity"]);
    }

    #[test]
    fn sentencepiece_marks_word_starts() {
        let enc = xlnet().encode("Berlin is a city", true).unwrap();
        assert_eq!(enc.tokens, ["▁Berlin", "▁is", "▁a", "▁city", "<sep>", "<cls>"]);
        assert_eq!(enc.offsets[..4], [(0, 6), (7, 9), (10, 11), (12, 16)]);
        assert_eq!(enc.words[4..], [None, None]);
    }

    #[test]
    fn slow_tokenizer_has_no_offsets() {
        let wp = WordPiece::from_vocab_txt(VOCAB_TXT, "[UNK]").unwrap();
        let tok = Tokenizer::new(TokenizerClass::Bert, Model::WordPiece(wp), true, false).unwrap();
        assert!(matches!(tok.encode("a", true), Err(Error::OffsetsUnavailable)));
        assert_eq!(tok.tokenize("a city", false), ["a", "city"]);
        assert_eq!(tok.token_to_id("zzz"), 1);
    }

    #[test]
    fn missing_special_token_is_an_error() {
        let wp = WordPiece::from_vocab_txt("[UNK]\na\n", "[UNK]").unwrap();
        assert!(matches!(
            Tokenizer::new(TokenizerClass::Bert, Model::WordPiece(wp), true, true),
            Err(LoadError::MissingSpecialToken(piece)) if piece == "[CLS]"
        ));
    }

    #[test]
    fn batch_matches_single() {
        let tok = bert();
        let texts = ["Berlin is a city", "unaffable"];
        let batch = tok.encode_batch(&texts, false).unwrap();
        for (text, enc) in texts.iter().zip(batch) {
            assert_eq!(enc, tok.encode(text, false).unwrap());
        }
    }

    #[test]
    fn uncased_bert_strips_accents() {
        let tok = cafe(true);
        assert_eq!(tok.tokenize("Café", false), ["cafe"]);
        let enc = tok.encode("Ca\u{0}fé!", false).unwrap();
        assert_eq!(enc.tokens, ["cafe", "[UNK]"]);
        assert_eq!(enc.offsets, [(0, 5), (5, 6)]);
        // 保留大小写时也保留重音
        assert_eq!(cafe(false).tokenize("cafe café", false), ["cafe", "[UNK]"]);
    }

    #[test]
    fn unigram_model_picks_best_segmentation() {
        let sp = SentencePiece::from_tokenizer_model(&unigram_model()).unwrap();
        let tok =
            Tokenizer::new(TokenizerClass::XlmRoberta, Model::SentencePiece(sp), false, true)
                .unwrap();
        assert_eq!(tok.tokenize("abc", false), ["▁abc"]);
        let enc = tok.encode("abc ab", true).unwrap();
        assert_eq!(enc.tokens, ["<s>", "▁abc", "▁ab", "</s>"]);
        assert_eq!(enc.offsets[1..3], [(0, 3), (4, 6)]);
    }

    #[test]
    fn debug_shows_class_and_flags() {
        let debug = format!("{:?}", bert());
        assert!(debug.starts_with("Tokenizer { class: Bert"));
        assert!(debug.contains("vocab_size: "));
        assert!(debug.contains("do_lower_case: true"));
        assert!(debug.contains("is_fast: true"));
    }
}
