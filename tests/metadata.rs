mod common;

use common::{bert_dir, path, roberta_dir, xlnet_dir};
use qatok::{get_tokenizer, tokenize_with_metadata, LoadOptions, Tokenizer, SUBWORD_MARKERS};

const TEXT: &str = "Berlin is a city";

fn load(dir: &tempfile::TempDir, use_fast: bool) -> Tokenizer {
    get_tokenizer(path(dir), &LoadOptions::default().use_fast(use_fast)).unwrap()
}

fn strip(piece: &str) -> &str {
    SUBWORD_MARKERS
        .iter()
        .find_map(|m| piece.strip_prefix(m))
        .unwrap_or(piece)
}

#[test]
fn slow_path_word_offsets() {
    for dir in [bert_dir(), roberta_dir(), xlnet_dir()] {
        let tokenizer = load(&dir, false);
        let out = tokenize_with_metadata(TEXT, &tokenizer);
        assert_eq!(out.offsets, [0, 7, 10, 12], "{}", tokenizer.class());
        assert_eq!(out.start_of_word, [true; 4]);
        assert_eq!(out.tokens.len(), 4);
    }
}

#[test]
fn slow_path_offsets_reconstruct_text() {
    let dir = bert_dir();
    let tokenizer = load(&dir, false);
    let text = "cis,\tunaffable  city";
    let out = tokenize_with_metadata(text, &tokenizer);
    assert_eq!(out.tokens.len(), out.offsets.len());
    assert_eq!(out.tokens.len(), out.start_of_word.len());

    let chars = text.chars().collect::<Vec<_>>();
    let pieces = tokenizer.tokenize("cis,", false);
    assert_eq!(pieces, ["ci", "##s", ","]);
    for (piece, &offset) in ["ci", "##s", ",", "un", "##aff", "##able", "city"]
        .iter()
        .zip(&out.offsets)
    {
        let original = strip(piece);
        let found = chars[offset..offset + original.chars().count()]
            .iter()
            .collect::<String>();
        assert_eq!(found, original);
    }
    assert_eq!(out.start_of_word, [true, false, false, true, false, false, true]);
}

#[test]
fn slow_path_unknown_advances_one_char() {
    let dir = bert_dir();
    let tokenizer = load(&dir, false);
    let out = tokenize_with_metadata("zzz city", &tokenizer);
    assert_eq!(out.tokens, [1, 8]);
    assert_eq!(out.offsets, [0, 4]);
}

#[test]
fn slow_path_byte_pieces_stay_inside_text() {
    let dir = xlnet_dir();
    let tokenizer = load(&dir, false);
    let text = "!a ßa city";
    assert_eq!(tokenizer.tokenize("!a", false), ["▁", "<0x21>", "a"]);
    let out = tokenize_with_metadata(text, &tokenizer);
    assert_eq!(out.offsets, [0, 0, 1, 3, 3, 4, 4, 6]);
    assert_eq!(
        out.start_of_word,
        [true, false, false, true, false, false, false, true]
    );
    let chars = text.chars().count();
    assert!(out.offsets.windows(2).all(|w| w[0] <= w[1]));
    assert!(out.offsets.iter().all(|&o| o < chars));
}

#[test]
fn slow_roberta_adds_prefix_space_after_first_word() {
    let dir = roberta_dir();
    let tokenizer = load(&dir, false);
    let out = tokenize_with_metadata(TEXT, &tokenizer);
    assert_eq!(out.tokens, [21, 23, 24, 28]);
}

#[test]
fn fast_path_bert() {
    let dir = bert_dir();
    let tokenizer = load(&dir, true);
    let out = tokenize_with_metadata("Berlin\tis a city", &tokenizer);
    assert_eq!(out.tokens, [2, 5, 6, 7, 8, 3]);
    assert_eq!(out.offsets, [0, 0, 7, 10, 12, 0]);
    assert_eq!(out.start_of_word, [false, true, true, true, true, false]);
}

#[test]
fn fast_path_subwords_share_word() {
    let dir = bert_dir();
    let tokenizer = load(&dir, true);
    let out = tokenize_with_metadata("unaffable city", &tokenizer);
    assert_eq!(out.offsets, [0, 0, 2, 5, 10, 0]);
    assert_eq!(out.start_of_word, [false, true, false, false, true, false]);
}

#[test]
fn fast_path_roberta() {
    let dir = roberta_dir();
    let tokenizer = load(&dir, true);
    let out = tokenize_with_metadata(TEXT, &tokenizer);
    assert_eq!(out.tokens, [0, 21, 23, 24, 28, 2]);
    assert_eq!(out.offsets, [0, 0, 7, 10, 12, 0]);
    assert_eq!(out.start_of_word, [false, true, true, true, true, false]);
}

#[test]
fn fast_path_xlnet_first_token_is_not_a_word_start() {
    let dir = xlnet_dir();
    let tokenizer = load(&dir, true);
    let out = tokenize_with_metadata(TEXT, &tokenizer);
    // ▁Berlin ▁is ▁a ▁city <sep> <cls>
    assert_eq!(out.tokens.len(), 6);
    assert_eq!(out.offsets[..4], [0, 7, 10, 12]);
    assert_eq!(out.start_of_word, [false, true, true, true, false, false]);
}

#[test]
fn empty_text() {
    let dir = bert_dir();
    let out = tokenize_with_metadata("", &load(&dir, false));
    assert!(out.is_empty());
    let out = tokenize_with_metadata("", &load(&dir, true));
    assert_eq!(out.tokens, [2, 3]);
    assert_eq!(out.start_of_word, [false, false]);
}
