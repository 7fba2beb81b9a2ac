//! Tolerant JSON extraction for LLM completions that are supposed to be
//! JSON-only but sometimes wrap the payload in prose or code fences. A
//! small hand-rolled scanner rather than an incremental streaming parser,
//! since verification here is a single non-streaming call.

/// Strips a leading/trailing ``` fenced block (with or without a language
/// tag) if present, trimming outer whitespace either way.
fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Finds the largest balanced `{...}` substring in `s`, tracking string
/// literals so braces inside quoted text don't confuse the scan.
fn largest_balanced_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    if stack.is_empty() {
                        let len = i - start + 1;
                        let better = best.map(|(_, blen)| len > blen).unwrap_or(true);
                        if better {
                            best = Some((start, len));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(start, len)| &s[start..start + len])
}

/// Parses `raw` as JSON, tolerating code fences and leading/trailing
/// prose around the payload. Returns `None` only if no balanced `{...}`
/// substring parses at all.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let stripped = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stripped) {
        return Some(value);
    }
    let candidate = largest_balanced_object(stripped)?;
    serde_json::from_str(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let value = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn strips_code_fences() {
        let value = extract_json_object("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_largest_object_amid_prose() {
        let raw = "Sure, here you go: {\"a\": {\"b\": 2}} - hope that helps!";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["a"]["b"], 2);
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let raw = r#"{"a": "text with } brace", "b": 2}"#;
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["b"], 2);
    }

    #[test]
    fn returns_none_for_unparseable_input() {
        assert!(extract_json_object("not json at all, sorry").is_none());
    }
}
