#![allow(dead_code)]

use std::{fs, path::Path};
use tempfile::TempDir;

pub const BERT_VOCAB: &str = "[PAD]
[UNK]
[CLS]
[SEP]
[MASK]
berlin
is
a
city
ci
##ty
##s
,
what
?
un
##aff
##able
";

pub const ROBERTA_VOCAB: &str = r#"{
    "<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3, "<mask>": 4,
    "B": 5, "e": 6, "r": 7, "l": 8, "i": 9, "n": 10, "s": 11, "a": 12,
    "c": 13, "t": 14, "y": 15, "Ġ": 16,
    "Be": 17, "Ber": 18, "Berl": 19, "Berli": 20, "Berlin": 21,
    "Ġi": 22, "Ġis": 23, "Ġa": 24, "Ġc": 25, "it": 26, "ity": 27, "Ġcity": 28
}"#;

pub const ROBERTA_MERGES: &str = "#version: 0.2
B e
Be r
Ber l
Berl i
Berli n
Ġ i
Ġi s
Ġ a
Ġ c
i t
it y
Ġc ity
";

fn varint(mut v: u64, out: &mut Vec<u8>) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// `TrainerSpec.model_type`
pub const UNIGRAM: u64 = 1;
pub const BPE: u64 = 2;

/// 手工编码的 SentencePiece `ModelProto`：trainer_spec 只写模型类型，词表带字节词
pub fn sentencepiece_model(model_type: u64) -> Vec<u8> {
    let mut pieces = vec![
        ("<unk>", 0., 2),
        ("<s>", 0., 3),
        ("</s>", 0., 3),
        ("<cls>", 0., 3),
        ("<sep>", 0., 3),
        ("[CLS]", 0., 3),
        ("[SEP]", 0., 3),
        ("[UNK]", 0., 3),
        ("<pad>", 0., 3),
        ("[MASK]", 0., 3),
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
        ("▁city", -3.),
        // BPE 先合并 ▁ci，之后无法得到 ▁city
        ("▁ci", -1.),
    ];
    pieces.extend(merged.iter().map(|&(p, s)| (p, s, 1)));
    let chars = ["▁", "B", "e", "r", "l", "i", "n", "s", "a", "c", "t", "y"];
    pieces.extend(chars.iter().map(|&c| (c, -10., 1)));
    pieces.extend(["<0x21>", "<0xC3>", "<0x9F>"].map(|b| (b, 0., 6)));

    // trainer_spec { model_type }
    let mut out = vec![0x12, 0x02, 0x18];
    varint(model_type, &mut out);
    for (piece, score, ty) in pieces {
        let mut msg = vec![0x0a];
        varint(piece.len() as u64, &mut msg);
        msg.extend_from_slice(piece.as_bytes());
        msg.push(0x15);
        msg.extend_from_slice(&f32::to_le_bytes(score));
        msg.push(0x18);
        varint(ty, &mut msg);
        out.push(0x0a);
        varint(msg.len() as u64, &mut out);
        out.extend(msg);
    }
    out
}

fn write(dir: &Path, name: &str, content: impl AsRef<[u8]>) {
    fs::write(dir.join(name), content).unwrap();
}

pub fn bert_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "config.json", r#"{"model_type": "bert"}"#);
    write(dir.path(), "vocab.txt", BERT_VOCAB);
    dir
}

pub fn roberta_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "config.json", r#"{"model_type": "roberta"}"#);
    write(dir.path(), "vocab.json", ROBERTA_VOCAB);
    write(dir.path(), "merges.txt", ROBERTA_MERGES);
    dir
}

/// `model_type` 写入 config.json，`file` 是模型文件名
pub fn sentencepiece_dir(model_type: &str, file: &str, spm_type: u64) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let config = format!(r#"{{"model_type": "{model_type}"}}"#);
    write(dir.path(), "config.json", config);
    write(dir.path(), file, sentencepiece_model(spm_type));
    dir
}

pub fn xlnet_dir() -> TempDir {
    sentencepiece_dir("xlnet", "spiece.model", UNIGRAM)
}

pub fn path(dir: &TempDir) -> &str {
    dir.path().to_str().unwrap()
}
