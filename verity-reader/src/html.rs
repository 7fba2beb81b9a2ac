use regex::Regex;
use std::sync::OnceLock;

/// Content-type prefixes/values rejected as binary.
const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/",
    "video/",
    "audio/",
    "application/octet-stream",
];

pub fn is_binary_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    BINARY_CONTENT_TYPES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</\1>").expect("valid regex")
    })
}

fn br_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn para_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</p\s*>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"))
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"))
}

fn lang_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<html[^>]*\blang\s*=\s*["']([^"']+)["']"#).expect("valid regex"))
}

/// Converts `html` to plain text by dropping `<script>`/`<style>`, turning
/// `<br>` into newlines and `</p>` into paragraph breaks, stripping all
/// remaining tags, and normalizing newline runs.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = script_style_re().replace_all(html, "");
    let with_breaks = br_re().replace_all(&without_scripts, "\n");
    let with_paragraphs = para_close_re().replace_all(&with_breaks, "\n\n");
    let without_tags = tag_re().replace_all(&with_paragraphs, "");
    let decoded = decode_basic_entities(&without_tags);
    let normalized = decoded.replace("\r\n", "\n").replace('\r', "\n");
    blank_run_re().replace_all(&normalized, "\n\n").trim().to_string()
}

fn decode_basic_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Extracts `<title>` text, if present.
pub fn extract_title(html: &str) -> Option<String> {
    title_re()
        .captures(html)
        .map(|c| decode_basic_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

/// Extracts the `lang` attribute of `<html>`, if present.
pub fn extract_lang(html: &str) -> Option<String> {
    lang_re().captures(html).map(|c| c[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_script_and_style_blocks() {
        let html = "<html><head><style>.a{}</style></head><body><script>alert(1)</script>Hello</body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Hello");
    }

    #[test]
    fn converts_br_and_paragraph_breaks() {
        let html = "<p>First line<br>second line</p><p>Second para</p>";
        let text = html_to_text(html);
        assert_eq!(text, "First line\nsecond line\n\nSecond para");
    }

    #[test]
    fn strips_remaining_tags() {
        let html = "<div><a href=\"x\">link text</a> and <b>bold</b></div>";
        let text = html_to_text(html);
        assert_eq!(text, "link text and bold");
    }

    #[test]
    fn extracts_title_and_lang() {
        let html = "<html lang=\"en-US\"><head><title>My Page &amp; Co</title></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("My Page & Co"));
        assert_eq!(extract_lang(html).as_deref(), Some("en-US"));
    }

    #[test]
    fn recognizes_binary_content_types() {
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("VIDEO/mp4"));
        assert!(!is_binary_content_type("text/html; charset=utf-8"));
    }
}
