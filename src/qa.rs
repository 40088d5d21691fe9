//! 把问答数据（文档 + 若干问题）分词为篮子。

use crate::{
    error::Error,
    metadata::start_of_word_qa,
    tokenizer::{Encoding, Tokenizer},
    utok,
};
use serde::{Deserialize, Serialize};
use std::iter::zip;

/// 一篇文档及其问题，SQuAD 格式。
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct QaInput {
    pub context: String,
    #[serde(default)]
    pub qas: Vec<QaItem>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct QaItem {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Answer {
    pub text: String,
    pub answer_start: usize,
}

/// 一段文本的分词结果，偏移为字符位置。
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TokenizedSequence {
    pub text: String,
    pub tokens: Vec<utok>,
    pub offsets: Vec<usize>,
    pub start_of_word: Vec<bool>,
    /// 词表中的字面形式，便于调试
    pub token_strings: Vec<String>,
}

impl TokenizedSequence {
    fn new(text: &str, encoding: Encoding) -> Self {
        Self {
            text: text.to_string(),
            start_of_word: start_of_word_qa(&encoding.words),
            offsets: encoding.offsets.iter().map(|&(start, _)| start).collect(),
            tokens: encoding.ids,
            token_strings: encoding.tokens,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct QuestionSample {
    /// `"{文档序号}-{问题序号}"`
    pub id_internal: String,
    pub id_external: String,
    pub question: TokenizedSequence,
    pub answers: Vec<Answer>,
}

/// 一篇文档的分词结果和它的所有问题。
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Basket {
    pub id_internal: String,
    pub document: TokenizedSequence,
    pub questions: Vec<QuestionSample>,
}

/// 分词一批问答数据，`indices[i]` 是第 i 篇文档在整个数据集中的序号。
///
/// 文档并行编码，都不加特殊词。只支持快速分词器。
pub fn tokenize_batch_question_answering(
    pre_baskets: &[QaInput],
    tokenizer: &Tokenizer,
    indices: &[usize],
) -> Result<Vec<Basket>, Error> {
    if indices.len() != pre_baskets.len() {
        return Err(Error::IndexMismatch {
            documents: pre_baskets.len(),
            indices: indices.len(),
        });
    }
    if !tokenizer.is_fast() {
        return Err(Error::NotFast);
    }

    let texts = pre_baskets
        .iter()
        .map(|d| d.context.as_str())
        .collect::<Vec<_>>();
    let documents = tokenizer.encode_batch(&texts, false)?;
    log::debug!("tokenized {} documents", documents.len());

    zip(pre_baskets, zip(indices, documents))
        .map(|(input, (&index, document))| {
            let questions = input
                .qas
                .iter()
                .enumerate()
                .map(|(i, qa)| {
                    let encoding = tokenizer.encode(&qa.question, false)?;
                    Ok(QuestionSample {
                        id_internal: format!("{index}-{i}"),
                        id_external: qa.id.clone(),
                        question: TokenizedSequence::new(&qa.question, encoding),
                        answers: qa.answers.clone(),
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            Ok(Basket {
                id_internal: index.to_string(),
                document: TokenizedSequence::new(&input.context, document),
                questions,
            })
        })
        .collect()
}
