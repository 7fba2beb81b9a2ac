//! Tolerant tokenization for both the FTS5 match expression builder and the
//! `LIKE`-based last-resort fallback.

const MAX_FTS_TOKENS: usize = 12;
const MAX_LIKE_TOKENS: usize = 8;
const MIN_LIKE_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "are", "was", "were",
    "be", "been", "being", "with", "by", "at", "from", "as", "that", "this", "these", "those",
    "it", "its", "what", "which", "who", "whom", "how", "why", "when", "where", "do", "does",
    "did", "can", "could", "will", "would", "should", "about",
];

fn split_alnum_lowercase(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Builds a tolerant FTS5 `MATCH` expression: lowercase, strip
/// non-alphanumerics, keep up to 12 tokens, conjoin as quoted terms
/// (`"t1" AND "t2" ...`). Falls back to quoting the whole input verbatim if
/// tokenization yields nothing (e.g. the query is all punctuation).
pub fn build_match_expression(query: &str) -> String {
    let tokens = split_alnum_lowercase(query);
    if tokens.is_empty() {
        return format!("\"{}\"", query.replace('"', "\"\""));
    }

    tokens
        .into_iter()
        .take(MAX_FTS_TOKENS)
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Tokenizes `query` for the `LIKE` fallback: stopword-filtered,
/// length-`>= 3`, up to 8 tokens.
pub fn tokenize_for_like(query: &str) -> Vec<String> {
    split_alnum_lowercase(query)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_LIKE_TOKEN_LEN && !STOPWORDS.contains(&t.as_str()))
        .take(MAX_LIKE_TOKENS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_conjoined_quoted_terms() {
        let expr = build_match_expression("Artemis II NASA announcement");
        assert_eq!(expr, "\"artemis\" AND \"ii\" AND \"nasa\" AND \"announcement\"");
    }

    #[test]
    fn strips_punctuation_before_tokenizing() {
        let expr = build_match_expression("what's the deal? (urgent!!)");
        assert_eq!(expr, "\"what\" AND \"s\" AND \"the\" AND \"deal\" AND \"urgent\"");
    }

    #[test]
    fn caps_at_twelve_tokens() {
        let query = (0..20).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let expr = build_match_expression(&query);
        assert_eq!(expr.matches("AND").count(), 11);
    }

    #[test]
    fn falls_back_to_quoting_the_whole_input_when_no_tokens_found() {
        let expr = build_match_expression("!!!???");
        assert_eq!(expr, "\"!!!???\"");
    }

    #[test]
    fn like_tokenizer_drops_stopwords_and_short_tokens() {
        let tokens = tokenize_for_like("What is the history of photosynthesis in plants?");
        assert_eq!(tokens, vec!["what", "history", "photosynthesis", "plants"]);
    }

    #[test]
    fn like_tokenizer_caps_at_eight_tokens() {
        let query = (0..20).map(|i| format!("term{i}longenough")).collect::<Vec<_>>().join(" ");
        let tokens = tokenize_for_like(&query);
        assert_eq!(tokens.len(), 8);
    }
}
