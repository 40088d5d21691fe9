use crate::{utok, Segment};
use std::{
    cmp::Ordering::{self, Equal},
    collections::BinaryHeap,
    fmt,
    ops::Range,
};

/// 合并规则：给定两个相邻的符号，返回合并结果及其排名，排名越小越优先。
pub(crate) trait Ranks {
    fn rank(&self, text: &[u8], left: &Symbol, right: &Symbol) -> Option<(u32, utok)>;
}

/// 一次 BPE 合并的中间状态。
///
/// 符号按文本顺序组成双向链表，合并时右侧符号被吸收进左侧符号，
/// 因此链表头始终是 0 号符号。
pub(crate) struct MergeState<'r, 't, R> {
    ranks: &'r R,
    text: &'t [u8],
    symbols: Vec<Symbol>,
    merges: BinaryHeap<Merge>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Symbol {
    pub token: utok,
    pub start: usize,
    pub end: usize,
    prev: Option<usize>,
    next: Option<usize>,
    merged: bool,
}

impl Symbol {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Merge {
    rank: u32,
    pos: usize,
    pair: (utok, utok),
    merge: utok,
}

impl Ord for Merge {
    fn cmp(&self, other: &Self) -> Ordering {
        // 比较顺序：rank -> pos -> pair，取反以得到小顶堆
        match self.rank.cmp(&other.rank) {
            Equal => match self.pos.cmp(&other.pos) {
                Equal => self.pair.cmp(&other.pair),
                other => other,
            },
            other => other,
        }
        .reverse()
    }
}

impl PartialOrd for Merge {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'r, 't, R: Ranks> MergeState<'r, 't, R> {
    pub fn new(
        ranks: &'r R,
        text: &'t [u8],
        initial: impl IntoIterator<Item = (utok, Range<usize>)>,
    ) -> Self {
        let symbols = initial
            .into_iter()
            .enumerate()
            .map(|(i, (token, range))| Symbol {
                token,
                start: range.start,
                end: range.end,
                prev: i.checked_sub(1),
                next: Some(i + 1),
                merged: false,
            })
            .collect::<Vec<_>>();
        let mut state = Self {
            ranks,
            text,
            symbols,
            merges: BinaryHeap::new(),
        };
        if let Some(last) = state.symbols.last_mut() {
            last.next = None;
        }
        for i in 1..state.symbols.len() {
            state.push_merge(i - 1, i);
        }
        state
    }

    fn push_merge(&mut self, left: usize, right: usize) {
        let (l, r) = (&self.symbols[left], &self.symbols[right]);
        if let Some((rank, merge)) = self.ranks.rank(self.text, l, r) {
            self.merges.push(Merge {
                rank,
                pos: left,
                pair: (l.token, r.token),
                merge,
            })
        }
    }

    /// 尝试执行一次合并，返回是否成功执行了一次合并。
    pub fn merge(&mut self) -> bool {
        while let Some(Merge {
            pos,
            pair: (t1, t2),
            merge,
            ..
        }) = self.merges.pop()
        {
            // 确认合并项有效性：左侧仍存活且未被改写，右邻居仍是记录时的 token
            let left = self.symbols[pos];
            if left.merged || left.token != t1 {
                continue;
            }
            let Some(right) = left.next else {
                continue;
            };
            if self.symbols[right].token != t2 {
                continue;
            }
            // 合并
            let Symbol { end, next, .. } = self.symbols[right];
            self.symbols[right].merged = true;
            let left = &mut self.symbols[pos];
            left.token = merge;
            left.end = end;
            left.next = next;
            // 创建 merge + t3 与 t0 + merge 合并项
            if let Some(next) = next {
                self.symbols[next].prev = Some(pos);
                self.push_merge(pos, next);
            }
            if let Some(prev) = self.symbols[pos].prev {
                self.push_merge(prev, pos);
            }
            return true;
        }
        false
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            symbols: &self.symbols,
            i: if self.symbols.is_empty() { None } else { Some(0) },
        }
    }

    pub fn into_segments(mut self) -> Vec<Segment> {
        while self.merge() {}
        self.iter()
            .map(|s| Segment {
                token: s.token,
                range: s.range(),
            })
            .collect()
    }
}

pub(crate) struct Iter<'a> {
    symbols: &'a [Symbol],
    i: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Symbol;

    fn next(&mut self) -> Option<Self::Item> {
        let symbol = &self.symbols[self.i?];
        self.i = symbol.next;
        Some(symbol)
    }
}

impl<R> fmt::Display for MergeState<'_, '_, R>
where
    R: Ranks,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "---------------------------")?;
        writeln!(f, "text:")?;
        writeln!(f, "  {}", String::from_utf8_lossy(self.text))?;
        writeln!(f, "---------------------------")?;
        writeln!(f, "symbols:")?;
        for s in self.iter() {
            writeln!(
                f,
                "  {:>6}: {}",
                s.token,
                String::from_utf8_lossy(&self.text[s.range()])
            )?;
        }
        writeln!(f, "---------------------------")?;
        writeln!(f, "pending merges: {}", self.merges.len())?;
        writeln!(f, "---------------------------")
    }
}
