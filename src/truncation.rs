use crate::error::TruncationError;
use std::{fmt, str::FromStr};

/// 超长时从哪条序列删除元素。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum TruncationStrategy {
    /// 每次从较长的序列删除一个元素，两者等长时删第二条
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
    /// 需要删除时直接报错
    DoNotTruncate,
}

impl TruncationStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LongestFirst => "longest_first",
            Self::OnlyFirst => "only_first",
            Self::OnlySecond => "only_second",
            Self::DoNotTruncate => "do_not_truncate",
        }
    }
}

impl fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TruncationStrategy {
    type Err = TruncationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "longest_first" => Ok(Self::LongestFirst),
            "only_first" => Ok(Self::OnlyFirst),
            "only_second" => Ok(Self::OnlySecond),
            "do_not_truncate" => Ok(Self::DoNotTruncate),
            _ => Err(TruncationError::UnknownStrategy(s.to_string())),
        }
    }
}

/// 截断的结果：两条序列和被删除的部分（带 `stride` 长度的重叠窗口）
pub(crate) type Cut<T> = (Vec<T>, Option<Vec<T>>, Vec<T>);

/// 从 `ids`/`pair` 中删除 `n` 个元素。
pub(crate) fn truncate<T: Clone>(
    mut ids: Vec<T>,
    mut pair: Option<Vec<T>>,
    n: usize,
    strategy: TruncationStrategy,
    stride: usize,
) -> Result<Cut<T>, TruncationError> {
    use TruncationStrategy::*;

    if n == 0 {
        return Ok((ids, pair, Vec::new()));
    }
    let overflow = match strategy {
        DoNotTruncate => return Err(TruncationError::Refused { requested: n }),
        OnlyFirst => cut_tail(&mut ids, n, stride, strategy)?,
        OnlySecond => match pair.as_mut() {
            Some(b) => cut_tail(b, n, stride, strategy)?,
            None => return Err(TruncationError::MissingPair),
        },
        LongestFirst => match pair.as_mut() {
            Some(b) => longest_first(&mut ids, b, n, stride)?,
            None => cut_tail(&mut ids, n, stride, strategy)?,
        },
    };
    Ok((ids, pair, overflow))
}

/// 删除末尾 `n` 个元素，溢出部分为原序列末尾 `n + stride` 个元素
fn cut_tail<T: Clone>(
    seq: &mut Vec<T>,
    n: usize,
    stride: usize,
    strategy: TruncationStrategy,
) -> Result<Vec<T>, TruncationError> {
    if seq.len() <= n {
        return Err(TruncationError::TooShort {
            strategy: strategy.as_str(),
            available: seq.len(),
            requested: n,
        });
    }
    let window = seq.len().min(n + stride);
    let overflow = seq[seq.len() - window..].to_vec();
    seq.truncate(seq.len() - n);
    Ok(overflow)
}

fn longest_first<T: Clone>(
    a: &mut Vec<T>,
    b: &mut Vec<T>,
    n: usize,
    stride: usize,
) -> Result<Vec<T>, TruncationError> {
    if a.len() + b.len() < n {
        return Err(TruncationError::TooShort {
            strategy: TruncationStrategy::LongestFirst.as_str(),
            available: a.len() + b.len(),
            requested: n,
        });
    }
    let mut removed = Vec::new();
    for _ in 0..n {
        if a.len() > b.len() {
            removed.extend(a.pop());
        } else {
            b.pop();
        }
    }
    removed.reverse();
    let window = stride.min(a.len());
    let mut overflow = a[a.len() - window..].to_vec();
    overflow.extend(removed);
    Ok(overflow)
}
