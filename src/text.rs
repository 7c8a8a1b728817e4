//! Text helpers.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Remove accents from a string.
///
/// Characters are decomposed canonically and combining marks dropped, so `é`
/// becomes `e`. Ligatures and letters without a decomposition (`æ`, `œ`, `ß`,
/// `ø`, `đ`, `ł`) are spelled out.
pub fn remove_accents(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for c in input.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ß' => out.push_str("sz"),
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'đ' => out.push('d'),
            'Đ' => out.push('D'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            _ => out.push(c),
        }
    }

    out
}

/// Uppercase, accent-free first letter of a sort key, as used by letter indexes.
///
/// Case folding covers every script (`д` gives `Д`). Empty input has none.
pub fn first_letter(input: &str) -> Option<String> {
    remove_accents(input.trim_start())
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
}
