//! Approximate token estimation
//!
//! Budgets and cost accounting use a character-count heuristic, not a real
//! tokenizer. Counts are characters rather than bytes so that multi-byte
//! scripts are not inflated 3x. The heuristic undercounts for scripts
//! without word segmentation (CJK), where one character is often one token.

/// Characters per estimated token
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a text: `ceil(chars / 4)`.
///
/// # Example
///
/// ```
/// use ragline_core::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcd"), 1);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Sum of per-text estimates
pub fn estimate_tokens_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> usize {
    texts.into_iter().map(estimate_tokens).sum()
}
