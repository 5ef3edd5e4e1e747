//! Conversion of LaTeX accent escapes (`{\'e}`, `\"o`, `\c{c}`, `\ss`, ...)
//! into precomposed Unicode characters.
//!
//! Unknown escapes are left untouched. Braces are only consumed when they
//! belong to the escape itself (`{\'e}`, `\'{e}`), never when they delimit an
//! enclosing group, so author-list grouping survives normalization.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

/// Accents spelled with a punctuation command: `\'e`, `\'{e}`.
const SYMBOL_ACCENT: &str = r#"\\([`'^"~=.])(?:\{(\\[ij]|[A-Za-z])\}|(\\[ij]|[A-Za-z]))"#;

/// Accents spelled with a letter command: `\c{c}`, `\v s`.
const LETTER_ACCENT: &str = r"\\([uvHckrdb])(?:\s*\{(\\[ij]|[A-Za-z])\}|\s+(\\[ij]|[A-Za-z]))";

/// Standalone special letters: `\ss`, `\o`, `\AE`, ...
const SPECIAL_LETTER: &str = r"\\(ss|aa|AA|ae|AE|oe|OE|o|O|l|L|i|j)";

static WRAPPED_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\{{{}\}}", SYMBOL_ACCENT)).unwrap());
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(SYMBOL_ACCENT).unwrap());
static WRAPPED_LETTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\{{{}\}}", LETTER_ACCENT)).unwrap());
static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(LETTER_ACCENT).unwrap());
static WRAPPED_SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\{{{}\}}", SPECIAL_LETTER)).unwrap());
static SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}(?:\{{\}}| |\b)", SPECIAL_LETTER)).unwrap());

/// Macros with no visible output: `\nobreak`, `\relax`, `\protect`,
/// italic correction `\/` and discretionary hyphen `\-`.
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:(?:nobreak|relax|protect)\b(?:\{\})?|[-/])").unwrap());

/// Replace LaTeX accent escapes with precomposed characters and strip
/// invisible control macros.
///
/// Idempotent: passes repeat until the text stops changing, so removing one
/// macro cannot leave behind a new escape for a later call to rewrite.
pub fn normalize(text: &str) -> String {
    let mut current: String = text.nfc().collect();
    // Every pass that changes the text removes at least one backslash.
    while current.contains('\\') {
        let next = normalize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn normalize_pass(text: &str) -> String {
    let text = CONTROL_RE.replace_all(text, "");
    let text = WRAPPED_SYMBOL_RE.replace_all(&text, compose_accent);
    let text = SYMBOL_RE.replace_all(&text, compose_accent);
    let text = WRAPPED_LETTER_RE.replace_all(&text, compose_accent);
    let text = LETTER_RE.replace_all(&text, compose_accent);
    let text = WRAPPED_SPECIAL_RE.replace_all(&text, special_letter);
    let text = SPECIAL_RE.replace_all(&text, special_letter);

    text.nfc().collect()
}

fn compose_accent(caps: &Captures) -> String {
    let command = &caps[1];
    let letter = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    // Accented dotless i/j is written \'\i but means the ordinary letter.
    let letter = match letter {
        "\\i" => "i",
        "\\j" => "j",
        other => other,
    };
    match combining_mark(command) {
        Some(mark) => format!("{letter}{mark}").nfc().collect(),
        None => caps[0].to_string(),
    }
}

fn special_letter(caps: &Captures) -> String {
    let replacement = match &caps[1] {
        "ss" => "ß",
        "aa" => "å",
        "AA" => "Å",
        "ae" => "æ",
        "AE" => "Æ",
        "oe" => "œ",
        "OE" => "Œ",
        "o" => "ø",
        "O" => "Ø",
        "l" => "ł",
        "L" => "Ł",
        "i" => "ı",
        "j" => "ȷ",
        _ => return caps[0].to_string(),
    };
    replacement.to_string()
}

/// Unicode combining mark for a LaTeX accent command.
fn combining_mark(command: &str) -> Option<char> {
    let mark = match command {
        "'" => '\u{301}',
        "`" => '\u{300}',
        "^" => '\u{302}',
        "\"" => '\u{308}',
        "~" => '\u{303}',
        "=" => '\u{304}',
        "." => '\u{307}',
        "u" => '\u{306}',
        "v" => '\u{30C}',
        "H" => '\u{30B}',
        "c" => '\u{327}',
        "k" => '\u{328}',
        "r" => '\u{30A}',
        "d" => '\u{323}',
        "b" => '\u{331}',
        _ => return None,
    };
    Some(mark)
}
