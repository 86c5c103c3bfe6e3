//! Text preparation for file-rendering TTS engines.

use crate::traits::NumeralNormalizer;

const PAUSE_MARKS: [char; 4] = ['.', '!', '?', ','];

/// Rewrite `text` into a form file-rendering engines pronounce well.
///
/// Ellipsis and dash glyphs become ASCII, numerals are expanded by
/// `numerals`, sentence punctuation is surrounded by spaces so engines
/// pause on it, and whitespace runs collapse to one space.
///
/// Idempotent whenever `numerals` is.
pub fn normalize_for_speech(text: &str, numerals: &dyn NumeralNormalizer) -> String {
    let glyphs = text.replace('…', "...").replace(['—', '–'], "-");
    let expanded = numerals.normalize_numerals(&glyphs);
    collapse_whitespace(&space_punctuation(&expanded))
}

/// Put spaces around each run of pause marks, except inside numbers
/// (`3.5`, `1,000`).
fn space_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        if !PAUSE_MARKS.contains(&chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && PAUSE_MARKS.contains(&chars[i]) {
            i += 1;
        }
        let run: String = chars[start..i].iter().collect();
        let in_number = start > 0
            && chars[start - 1].is_ascii_digit()
            && i - start == 1
            && chars.get(i).is_some_and(char::is_ascii_digit);
        if in_number {
            out.push_str(&run);
        } else {
            out.push(' ');
            out.push_str(&run);
            out.push(' ');
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
