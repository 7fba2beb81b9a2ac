/// Conservative, deterministic token-count approximation.
///
/// Averages two heuristics - chars/4, and words*1.25 + punctuation*0.2 - and
/// adds a small penalty for non-ASCII characters (which tend to tokenize
/// less efficiently in real tokenizers), then rounds up so downstream budget
/// checks stay conservative.
pub fn estimate_tokens(s: &str) -> usize {
    if s.is_empty() {
        return 0;
    }

    let chars = s.chars().count() as f64;
    let words = s.split_whitespace().count() as f64;
    let punct = s.chars().filter(|c| c.is_ascii_punctuation()).count() as f64;
    let non_ascii = s.chars().filter(|c| !c.is_ascii()).count() as f64;

    let by_chars = chars / 4.0;
    let by_words = words.mul_add(1.25, punct * 0.2);
    let base = (by_chars + by_words) / 2.0;
    let penalty = non_ascii * 0.05;

    (base + penalty).ceil().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn longer_text_yields_more_tokens() {
        let short = estimate_tokens("hello world");
        let long = estimate_tokens(&"hello world ".repeat(50));
        assert!(long > short);
    }

    #[test]
    fn is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog, 1234!";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }

    #[test]
    fn non_ascii_text_costs_more_than_equivalent_length_ascii() {
        let ascii = "a".repeat(20);
        let non_ascii = "é".repeat(20);
        assert!(estimate_tokens(&non_ascii) >= estimate_tokens(&ascii));
    }
}
