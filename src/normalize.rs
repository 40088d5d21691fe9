use regex::Regex;
use std::{ops::Range, sync::LazyLock};
use unicode_normalization::char::{decompose_canonical, is_combining_mark};

/// Unicode 类别 C（控制、格式、私用、代理、未分配）和替换字符
static CONTROL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{C}\x{FFFD}]").unwrap());

/// 逐字符的规范化。
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub(crate) struct Normalizer {
    pub lowercase: bool,
    /// 规范分解后丢掉组合附加符号，`é` -> `e`
    pub strip_accents: bool,
    /// 丢掉控制字符
    pub clean: bool,
}

impl Normalizer {
    fn push(self, c: char, out: &mut String) {
        if self.clean && is_control(c) {
            return;
        }
        let mut emit = |c: char| {
            if self.strip_accents {
                decompose_canonical(c, |d| {
                    if !is_combining_mark(d) {
                        out.push(d)
                    }
                })
            } else {
                out.push(c)
            }
        };
        if self.lowercase {
            c.to_lowercase().for_each(&mut emit)
        } else {
            emit(c)
        }
    }
}

fn is_control(c: char) -> bool {
    !matches!(c, '\t' | '\n' | '\r') && CONTROL.is_match(c.encode_utf8(&mut [0; 4]))
}

/// 规范化之后送入分词算法的文本，记录每个字节来自原文的哪个字符。
pub(crate) struct Normalized {
    pub text: String,
    /// `align[i]` 是规范化文本第 i 个字节所属原文字符的字节范围，长度为 `text.len()`
    align: Vec<(usize, usize)>,
    /// 原文末尾的字节位置
    end: usize,
}

impl Normalized {
    /// `original` 位于原文的 `base` 处；`prefix` 不对应任何原文内容，对齐到 `base`。
    /// 被丢掉的字符不占规范化文本的字节。
    pub fn new(original: &str, base: usize, prefix: &str, normalizer: Normalizer) -> Self {
        let mut text = String::with_capacity(prefix.len() + original.len());
        let mut align = Vec::with_capacity(prefix.len() + original.len());
        text.push_str(prefix);
        align.resize(prefix.len(), (base, base));
        for (i, c) in original.char_indices() {
            let before = text.len();
            normalizer.push(c, &mut text);
            let span = (base + i, base + i + c.len_utf8());
            align.resize(align.len() + text.len() - before, span);
        }
        Self {
            text,
            align,
            end: base + original.len(),
        }
    }

    /// 规范化文本中的字节范围 -> 原文中的字节范围
    #[inline]
    pub fn original(&self, range: Range<usize>) -> Range<usize> {
        if range.is_empty() {
            let pos = self.align.get(range.start).map_or(self.end, |&(start, _)| start);
            return pos..pos;
        }
        self.align[range.start].0..self.align[range.end - 1].1
    }
}

/// 字节位置 -> 字符位置，长度为 `text.len() + 1`，字符内部的字节映射到所在字符。
pub(crate) fn char_positions(text: &str) -> Vec<usize> {
    let mut positions = Vec::with_capacity(text.len() + 1);
    let mut count = 0;
    for (i, c) in text.chars().enumerate() {
        positions.resize(positions.len() + c.len_utf8(), i);
        count = i + 1;
    }
    positions.push(count);
    positions
}
