//! Script-aware content length.
//!
//! Chinese prose has no word-separating spaces, so counting characters is the
//! only honest measure; English counted by characters would dwarf it. The
//! mixed metric counts CJK ideographs individually and each maximal run of
//! ASCII letters as one word.

/// Semantic length of `text`: CJK chars + Latin word runs.
#[must_use]
pub fn semantic_length(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;

    for ch in text.chars() {
        if ('\u{4e00}'..='\u{9fa5}').contains(&ch) {
            count += 1;
            in_word = false;
        } else if ch.is_ascii_alphabetic() {
            if !in_word {
                count += 1;
                in_word = true;
            }
        } else {
            in_word = false;
        }
    }

    count
}
