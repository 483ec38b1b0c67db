//! Text normalization shared by the lexical scorer.

/// Split text into lowercase terms.
///
/// Every character that is neither alphanumeric nor whitespace is treated as
/// a separator, so `"don't-stop"` yields `["don", "t", "stop"]`.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}
