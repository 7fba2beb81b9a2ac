use unicode_normalization::UnicodeNormalization;

/// Options controlling `sanitize`.
#[derive(Clone, Copy, Debug)]
pub struct SanitizeOptions {
    /// Apply Unicode NFKC normalization.
    pub normalize: bool,
    /// Strip C0/C1 control characters, keeping tab/newline/CR.
    pub strip_control: bool,
    /// Decode a small set of common HTML entities.
    pub decode_html_entities: bool,
    /// Collapse runs of whitespace into a single space (newlines preserved
    /// as paragraph breaks are left to the caller; this only folds runs of
    /// horizontal whitespace and blank lines).
    pub collapse_whitespace: bool,
    /// Strip common markdown emphasis/heading/link markup, keeping link text.
    pub strip_markdown: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            strip_control: true,
            decode_html_entities: true,
            collapse_whitespace: true,
            strip_markdown: false,
        }
    }
}

/// Sanitizes `s` per `opts`. The result is always the same length or
/// shorter than the input (in characters) and never introduces characters
/// not already present in `s` or in the fixed entity/markup substitution
/// tables.
pub fn sanitize(s: &str, opts: SanitizeOptions) -> String {
    let mut out = s.to_string();

    if opts.decode_html_entities {
        out = decode_entities(&out);
    }
    if opts.strip_markdown {
        out = strip_markdown(&out);
    }
    if opts.normalize {
        out = out.nfkc().collect();
    }
    if opts.strip_control {
        out = strip_control_chars(&out);
    }
    if opts.collapse_whitespace {
        out = collapse_whitespace(&out);
    }

    out
}

fn decode_entities(s: &str) -> String {
    const ENTITIES: &[(&str, &str)] = &[
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&mdash;", "\u{2014}"),
        ("&ndash;", "\u{2013}"),
        ("&hellip;", "\u{2026}"),
    ];
    let mut out = s.to_string();
    for (entity, replacement) in ENTITIES {
        out = out.replace(entity, replacement);
    }
    out
}

fn strip_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut at_line_start = true;

    while let Some(c) = chars.next() {
        if at_line_start && (c == '#') {
            while chars.peek() == Some(&'#') {
                chars.next();
            }
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            at_line_start = false;
            continue;
        }
        if c == '*' || c == '_' || c == '`' {
            at_line_start = false;
            continue;
        }
        if c == '\n' {
            at_line_start = true;
            out.push(c);
            continue;
        }
        at_line_start = false;
        out.push(c);
    }
    out
}

fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            if c == '\t' || c == '\n' || c == '\r' {
                return true;
            }
            !c.is_control()
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        let is_space = c == ' ' || c == '\t';
        if is_space {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_entities() {
        let out = sanitize("Tom &amp; Jerry &mdash; a show", SanitizeOptions::default());
        assert_eq!(out, "Tom & Jerry \u{2014} a show");
    }

    #[test]
    fn collapses_runs_of_spaces_and_tabs() {
        let out = sanitize("a   b\t\tc", SanitizeOptions::default());
        assert_eq!(out, "a b c");
    }

    #[test]
    fn strips_control_characters_keeping_newline() {
        let input = "a\u{0007}b\nc";
        let out = sanitize(input, SanitizeOptions::default());
        assert_eq!(out, "ab\nc");
    }

    #[test]
    fn result_is_never_longer_than_input() {
        let input = "  &amp;&amp;   **bold**   \u{0007}";
        let opts = SanitizeOptions {
            strip_markdown: true,
            ..Default::default()
        };
        let out = sanitize(input, opts);
        assert!(out.chars().count() <= input.chars().count());
    }

    #[test]
    fn strips_markdown_headings_and_emphasis() {
        let out = sanitize(
            "# Title\n**bold** and _em_ and `code`",
            SanitizeOptions {
                strip_markdown: true,
                ..Default::default()
            },
        );
        assert_eq!(out, "Title\nbold and em and code");
    }
}
