//! Text-encoding repair for mis-decoded metadata.
//!
//! A chunk of the source data was written as UTF-8 but decoded as Latin-1
//! somewhere along the way, so curly quotes and accented letters arrive as
//! two- or three-character mojibake sequences. This repairs the sequences we
//! actually see in the ETD corpus; clean text passes through untouched.

/// Mojibake sequences observed in the export, paired with their intended
/// characters. Longer sequences come first so they win over their prefixes.
const REPAIRS: &[(&str, &str)] = &[
    ("â€œ", "\u{201c}"), // left double quote
    ("â€\u{9d}", "\u{201d}"), // right double quote
    ("â€™", "\u{2019}"), // right single quote
    ("â€˜", "\u{2018}"), // left single quote
    ("â€“", "\u{2013}"), // en dash
    ("â€”", "\u{2014}"), // em dash
    ("â€¦", "\u{2026}"), // ellipsis
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã­", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã¤", "ä"),
    ("Ã¶", "ö"),
    ("Ã¼", "ü"),
    ("Ã¨", "è"),
    ("Ã§", "ç"),
    ("Ã\u{9f}", "ß"),
    ("Â ", " "), // stray non-breaking-space marker
];

/// Repair common mis-decoded byte sequences in a metadata value.
pub fn fix_encoding(text: &str) -> String {
    // Cheap scan first: mojibake always involves one of these lead bytes.
    if !text.contains('Ã') && !text.contains('â') && !text.contains('Â') {
        return text.to_string();
    }
    let mut fixed = text.to_string();
    for (broken, repaired) in REPAIRS {
        if fixed.contains(broken) {
            fixed = fixed.replace(broken, repaired);
        }
    }
    fixed
}
