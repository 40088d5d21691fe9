//! SentencePiece Unigram 模型的 Viterbi 切分。

use super::SentencePiece;
use crate::{utok, Segment};

/// 到达某个字节位置的最优路径的最后一步
#[derive(Clone, Copy, Debug)]
struct Node {
    score: f32,
    start: usize,
    token: utok,
}

impl SentencePiece {
    /// 在所有切分中选择评分之和最大的一种。
    ///
    /// 没有单字符的词能覆盖某个字符时，这个字符也可以作为未知词，评分低于词表中的所有词。
    /// 未知字符优先回退到字节词，否则相邻的未知字符合并为一个 <unk>。
    pub(super) fn viterbi(&self, text: &str) -> Vec<Segment> {
        let bytes = text.as_bytes();
        let mut best = vec![None::<Node>; text.len() + 1];
        best[0] = Some(Node {
            score: 0.,
            start: 0,
            token: self.unk,
        });

        for (i, c) in text.char_indices() {
            let Some(prev) = best[i] else {
                continue;
            };
            let char_end = i + c.len_utf8();
            let mut single = false;
            let ends = text[i..]
                .char_indices()
                .map(|(k, c)| i + k + c.len_utf8())
                .take_while(|&end| end - i <= self.max_piece_len);
            for end in ends {
                if let Some(token) = self.find_normal(&bytes[i..end]) {
                    single |= end == char_end;
                    let score = prev.score + self.scores[token as usize];
                    relax(&mut best[end], Node { score, start: i, token });
                }
            }
            if !single {
                let score = prev.score + self.unk_score;
                relax(
                    &mut best[char_end],
                    Node {
                        score,
                        start: i,
                        token: self.unk,
                    },
                );
            }
        }

        // 回溯
        let mut path = Vec::new();
        let mut end = text.len();
        while end > 0 {
            let Some(node) = best[end] else {
                break;
            };
            path.push(Segment {
                token: node.token,
                range: node.start..end,
            });
            end = node.start;
        }
        path.reverse();

        let mut segments = Vec::<Segment>::with_capacity(path.len());
        for segment in path {
            if segment.token != self.unk {
                segments.push(segment);
                continue;
            }
            let range = segment.range;
            if let Some(tokens) = self.byte_fallback(&bytes[range.clone()]) {
                segments.extend(tokens.into_iter().zip(range).map(|(token, i)| Segment {
                    token,
                    range: i..i + 1,
                }));
            } else {
                match segments.last_mut() {
                    Some(last) if last.token == self.unk && last.range.end == range.start => {
                        last.range.end = range.end
                    }
                    _ => segments.push(Segment {
                        token: self.unk,
                        range,
                    }),
                }
            }
        }
        segments
    }
}

#[inline]
fn relax(slot: &mut Option<Node>, node: Node) {
    if slot.map_or(true, |old| node.score > old.score) {
        *slot = Some(node);
    }
}
