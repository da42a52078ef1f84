use once_cell::sync::Lazy;
use regex::Regex;

static HIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:script|style|noscript)\b.*?</(?:script|style|noscript)\s*>")
        .expect("hidden block pattern compiles")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern compiles"));

/// Approximates the text a browser would render for `html`.
pub fn visible_text(html: &str) -> String {
    let without_hidden = HIDDEN_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_hidden, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}
