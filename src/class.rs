//! 支持的分词器类别，以及解析时用到的静态查找表。

use crate::{error::LoadError, normalize::Normalizer, pretokenize::PreTokenizer};
use std::{collections::HashMap, fmt, str::FromStr, sync::LazyLock};

/// 可以构造的分词器类别。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TokenizerClass {
    Albert,
    Bert,
    BigBird,
    Camembert,
    DebertaV2,
    DistilBert,
    DprContextEncoder,
    DprQuestionEncoder,
    Electra,
    Roberta,
    XlmRoberta,
    XlNet,
}

/// 子词算法的种类，决定读取哪些词表文件
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ModelKind {
    WordPiece,
    SentencePiece,
    ByteLevel,
}

/// 特殊词在序列中的排布方式
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Layout {
    /// `[CLS] A [SEP] (B [SEP])`
    Bert,
    /// `<s> A </s> (</s> B </s>)`
    Roberta,
    /// `A <sep> (B <sep>) <cls>`
    XlNet,
}

impl Layout {
    pub const fn num_special_tokens(self, pair: bool) -> usize {
        match (self, pair) {
            (Self::Roberta, true) => 4,
            (_, true) => 3,
            (_, false) => 2,
        }
    }
}

/// 特殊词的字面形式
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct SpecialTokens {
    pub cls: &'static str,
    pub sep: &'static str,
    pub unk: &'static str,
    pub pad: &'static str,
    pub mask: &'static str,
}

const BERT_SPECIAL: SpecialTokens = SpecialTokens {
    cls: "[CLS]",
    sep: "[SEP]",
    unk: "[UNK]",
    pad: "[PAD]",
    mask: "[MASK]",
};

const ROBERTA_SPECIAL: SpecialTokens = SpecialTokens {
    cls: "<s>",
    sep: "</s>",
    unk: "<unk>",
    pad: "<pad>",
    mask: "<mask>",
};

const XLNET_SPECIAL: SpecialTokens = SpecialTokens {
    cls: "<cls>",
    sep: "<sep>",
    unk: "<unk>",
    pad: "<pad>",
    mask: "<mask>",
};

/// 类别的默认构造参数
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub(crate) struct ClassParams {
    pub do_lower_case: bool,
}

/// config.json 中 `model_type` 到类别的映射，`dpr` 需要另看 `architectures`
pub(crate) static MODEL_TYPES: LazyLock<HashMap<&'static str, TokenizerClass>> =
    LazyLock::new(|| {
        use TokenizerClass::*;
        HashMap::from([
            ("albert", Albert),
            ("bert", Bert),
            ("big_bird", BigBird),
            ("camembert", Camembert),
            ("deberta-v2", DebertaV2),
            ("distilbert", DistilBert),
            ("electra", Electra),
            ("roberta", Roberta),
            ("xlm-roberta", XlmRoberta),
            ("xlnet", XlNet),
        ])
    });

/// 模型名中的子串到类别的映射，按顺序匹配，先匹配者优先
pub(crate) const NAME_HINTS: &[(&str, TokenizerClass)] = &[
    ("xlm-roberta", TokenizerClass::XlmRoberta),
    ("distilbert", TokenizerClass::DistilBert),
    ("roberta", TokenizerClass::Roberta),
    ("codebert", TokenizerClass::Roberta),
    ("camembert", TokenizerClass::Camembert),
    ("albert", TokenizerClass::Albert),
    ("big_bird", TokenizerClass::BigBird),
    ("bigbird", TokenizerClass::BigBird),
    ("deberta", TokenizerClass::DebertaV2),
    ("electra", TokenizerClass::Electra),
    ("xlnet", TokenizerClass::XlNet),
    ("bert", TokenizerClass::Bert),
];

static DEFAULT_PARAMS: LazyLock<HashMap<TokenizerClass, ClassParams>> = LazyLock::new(|| {
    use TokenizerClass::*;
    let lower = ClassParams {
        do_lower_case: true,
    };
    HashMap::from([
        (Albert, lower),
        (Bert, lower),
        (DistilBert, lower),
        (DprContextEncoder, lower),
        (DprQuestionEncoder, lower),
        (Electra, lower),
    ])
});

impl TokenizerClass {
    pub const ALL: [Self; 12] = [
        Self::Albert,
        Self::Bert,
        Self::BigBird,
        Self::Camembert,
        Self::DebertaV2,
        Self::DistilBert,
        Self::DprContextEncoder,
        Self::DprQuestionEncoder,
        Self::Electra,
        Self::Roberta,
        Self::XlmRoberta,
        Self::XlNet,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Albert => "Albert",
            Self::Bert => "Bert",
            Self::BigBird => "BigBird",
            Self::Camembert => "Camembert",
            Self::DebertaV2 => "DebertaV2",
            Self::DistilBert => "DistilBert",
            Self::DprContextEncoder => "DPRContextEncoder",
            Self::DprQuestionEncoder => "DPRQuestionEncoder",
            Self::Electra => "Electra",
            Self::Roberta => "Roberta",
            Self::XlmRoberta => "XLMRoberta",
            Self::XlNet => "XLNet",
        }
    }

    /// 只有 RoBERTa 在词中间调用时需要补一个前导空格。
    #[inline]
    pub const fn needs_prefix_space(self) -> bool {
        matches!(self, Self::Roberta)
    }

    pub(crate) const fn model_kind(self) -> ModelKind {
        match self {
            Self::Bert
            | Self::DistilBert
            | Self::DprContextEncoder
            | Self::DprQuestionEncoder
            | Self::Electra => ModelKind::WordPiece,
            Self::Roberta => ModelKind::ByteLevel,
            Self::Albert
            | Self::BigBird
            | Self::Camembert
            | Self::DebertaV2
            | Self::XlmRoberta
            | Self::XlNet => ModelKind::SentencePiece,
        }
    }

    pub(crate) const fn pre_tokenizer(self) -> PreTokenizer {
        match self.model_kind() {
            ModelKind::WordPiece => PreTokenizer::Bert,
            ModelKind::SentencePiece => PreTokenizer::Metaspace,
            ModelKind::ByteLevel => PreTokenizer::ByteLevel,
        }
    }

    /// WordPiece 族小写时去掉重音并清理控制字符；ALBERT 和 XLNet 总是去掉重音。
    pub(crate) const fn normalizer(self, do_lower_case: bool) -> Normalizer {
        let wordpiece = matches!(self.model_kind(), ModelKind::WordPiece);
        Normalizer {
            lowercase: do_lower_case,
            strip_accents: (wordpiece && do_lower_case)
                || matches!(self, Self::Albert | Self::XlNet),
            clean: wordpiece,
        }
    }

    pub(crate) const fn layout(self) -> Layout {
        match self {
            Self::Roberta | Self::XlmRoberta | Self::Camembert => Layout::Roberta,
            Self::XlNet => Layout::XlNet,
            _ => Layout::Bert,
        }
    }

    pub(crate) const fn special_tokens(self) -> SpecialTokens {
        match self {
            Self::Roberta | Self::XlmRoberta | Self::Camembert => ROBERTA_SPECIAL,
            Self::XlNet => XLNET_SPECIAL,
            Self::Albert => SpecialTokens {
                unk: "<unk>",
                pad: "<pad>",
                ..BERT_SPECIAL
            },
            Self::BigBird => SpecialTokens {
                cls: "[CLS]",
                sep: "[SEP]",
                mask: "[MASK]",
                ..ROBERTA_SPECIAL
            },
            _ => BERT_SPECIAL,
        }
    }

    pub(crate) fn default_params(self) -> ClassParams {
        DEFAULT_PARAMS.get(&self).copied().unwrap_or_default()
    }

    /// 所有类别名，用于报错
    pub(crate) fn candidates() -> String {
        Self::ALL.map(Self::name).join(", ")
    }
}

impl fmt::Display for TokenizerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenizerClass {
    type Err = LoadError;

    /// 接受 `Bert`、`BertTokenizer` 和 `BertTokenizerFast` 这样的写法，不区分大小写。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let base = lower
            .strip_suffix("tokenizerfast")
            .or_else(|| lower.strip_suffix("tokenizer"))
            .unwrap_or(&lower);
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(base))
            .ok_or_else(|| LoadError::UnknownClass(s.to_string()))
    }
}
