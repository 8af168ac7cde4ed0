//! Garbage-output detection heuristics (§7): a pure function over strings,
//! unit-testable in isolation, shared by the chat service and the
//! orchestrator's answering agent.

const REPEATED_TRIGRAM_LIMIT: usize = 20;
const SINGLE_CHAR_TOKEN_MIN_COUNT: usize = 100;
const SINGLE_CHAR_TOKEN_MIN_DISTINCT: usize = 10;
const LONG_OUTPUT_MIN_LEN: usize = 5000;
const LONG_OUTPUT_MAX_UNIQUE_RATIO: f64 = 0.10;

/// `true` if `text` fails any of the three §7 sanity checks.
pub fn is_garbage(text: &str) -> bool {
    has_repeated_trigram(text) || has_degenerate_single_char_tokens(text) || has_low_unique_word_ratio(text)
}

/// Any 3-word substring repeated more than `REPEATED_TRIGRAM_LIMIT` times.
fn has_repeated_trigram(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 3 {
        return false;
    }

    let mut counts = std::collections::HashMap::new();
    for window in words.windows(3) {
        let key = window.join(" ");
        *counts.entry(key).or_insert(0usize) += 1;
    }
    counts.values().any(|&count| count > REPEATED_TRIGRAM_LIMIT)
}

/// More than 100 single-character tokens with fewer than 10 distinct values.
fn has_degenerate_single_char_tokens(text: &str) -> bool {
    let single_char_tokens: Vec<&str> = text.split_whitespace().filter(|w| w.chars().count() == 1).collect();
    if single_char_tokens.len() <= SINGLE_CHAR_TOKEN_MIN_COUNT {
        return false;
    }
    let distinct: std::collections::HashSet<&str> = single_char_tokens.into_iter().collect();
    distinct.len() < SINGLE_CHAR_TOKEN_MIN_DISTINCT
}

/// Output length >= 5000 chars with unique-word ratio < 0.10.
fn has_low_unique_word_ratio(text: &str) -> bool {
    if text.chars().count() < LONG_OUTPUT_MIN_LEN {
        return false;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let distinct: std::collections::HashSet<&str> = words.iter().copied().collect();
    let ratio = distinct.len() as f64 / words.len() as f64;
    ratio < LONG_OUTPUT_MAX_UNIQUE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_good_output_is_not_garbage() {
        let text = "The Kalman filter estimates the state of a linear dynamic system from noisy measurements.";
        assert!(!is_garbage(text));
    }

    #[test]
    fn repeated_trigram_is_garbage() {
        let text = "the cat sat ".repeat(25);
        assert!(is_garbage(&text));
    }

    #[test]
    fn degenerate_single_char_tokens_are_garbage() {
        let tokens: Vec<String> = (0..150).map(|i| (b'a' + (i % 5) as u8) as char).map(|c| c.to_string()).collect();
        let text = tokens.join(" ");
        assert!(is_garbage(&text));
    }

    #[test]
    fn low_unique_word_ratio_on_long_output_is_garbage() {
        let text = "word ".repeat(2000);
        assert!(text.chars().count() >= LONG_OUTPUT_MIN_LEN);
        assert!(is_garbage(&text));
    }

    #[test]
    fn long_output_with_high_uniqueness_is_not_garbage() {
        let text: String = (0..1200).map(|i| format!("token{i} ")).collect();
        assert!(text.chars().count() >= LONG_OUTPUT_MIN_LEN);
        assert!(!is_garbage(&text));
    }
}
