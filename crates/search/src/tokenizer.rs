//! Text tokenizer for lexical search
//!
//! Pipeline: UAX#29 word boundaries → strip possessives → remove non-alpha
//!           → lowercase → filter short tokens → remove stopwords
//!
//! Runs of CJK characters have no word separators, so each run is split
//! into overlapping character bigrams instead (a lone character stays a
//! unigram).

use unicode_segmentation::UnicodeSegmentation;

/// Standard English stopwords (Lucene's default set).
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

#[inline]
fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Whether a character belongs to a script without word separators
/// (CJK punctuation, Hiragana, Katakana, CJK Unified Ideographs, Hangul).
#[inline]
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3000..=0x303F | 0x3040..=0x309F | 0x30A0..=0x30FF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF
    )
}

/// Whether any character of the text is CJK
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Strip English possessive suffix (`'s` / `\u{2019}s`).
#[inline]
fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word)
}

fn normalize_word(word: &str) -> Option<String> {
    let cleaned: String = strip_possessive(word)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if cleaned.len() < 2 || is_stopword(&cleaned) {
        return None;
    }
    Some(cleaned)
}

fn flush_cjk_run(run: &mut Vec<char>, out: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => out.push(run[0].to_string()),
        _ => out.extend(run.windows(2).map(|w| w.iter().collect::<String>())),
    }
    run.clear();
}

/// Tokenize text into searchable terms.
///
/// # Example
///
/// ```
/// use ragline_search::tokenizer::tokenize;
///
/// let tokens = tokenize("The Quick Brown Foxes");
/// assert_eq!(tokens, vec!["quick", "brown", "foxes"]);
///
/// let tokens = tokenize("売上高");
/// assert_eq!(tokens, vec!["売上", "上高"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cjk_run: Vec<char> = Vec::new();
    let mut prev_end = 0;

    for (start, word) in text.unicode_word_indices() {
        // A bigram never spans a gap between words
        if start != prev_end {
            flush_cjk_run(&mut cjk_run, &mut out);
        }
        prev_end = start + word.len();

        if word.chars().all(is_cjk) {
            cjk_run.extend(word.chars().filter(|c| c.is_alphanumeric()));
            continue;
        }
        flush_cjk_run(&mut cjk_run, &mut out);
        if contains_cjk(word) {
            // Mixed script word such as "iPhone用": split at script changes
            let mut latin = String::new();
            for c in word.chars() {
                if is_cjk(c) {
                    if let Some(t) = normalize_word(&latin) {
                        out.push(t);
                    }
                    latin.clear();
                    cjk_run.push(c);
                } else {
                    flush_cjk_run(&mut cjk_run, &mut out);
                    latin.push(c);
                }
            }
            if let Some(t) = normalize_word(&latin) {
                out.push(t);
            }
            continue;
        }
        if let Some(t) = normalize_word(word) {
            out.push(t);
        }
    }
    flush_cjk_run(&mut cjk_run, &mut out);
    out
}

/// Tokenize and deduplicate for query processing.
///
/// # Example
///
/// ```
/// use ragline_search::tokenizer::tokenize_unique;
///
/// let tokens = tokenize_unique("test test TEST");
/// assert_eq!(tokens, vec!["test"]);
/// ```
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
