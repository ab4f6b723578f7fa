//! HTML-to-structure extraction.
//!
//! Turns raw page markup into a [`SiteStructure`]: title, meta description,
//! headings in document order, breadcrumbs, and a body-text excerpt. The
//! extractor is pure. The same input always yields the same record.

mod breadcrumbs;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use seoscope_shared::{Heading, Result, SeoscopeError, SiteStructure};

/// Elements whose text never counts as body copy.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer",
];

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static META_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("valid selector"));
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector"));
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Converts raw markup into a [`SiteStructure`].
#[derive(Debug, Clone)]
pub struct StructureExtractor {
    excerpt_chars: usize,
}

impl Default for StructureExtractor {
    fn default() -> Self {
        Self::new(4000)
    }
}

impl StructureExtractor {
    /// `excerpt_chars` bounds the length of `body_excerpt`.
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    /// Extract the structural record of one page.
    ///
    /// Fails with [`SeoscopeError::Parse`] when the input is empty, is not
    /// text, or contains no title, headings, or body text at all. Missing
    /// optional elements (meta description, breadcrumbs) are left empty.
    #[instrument(skip(self, raw), fields(url = %url, bytes = raw.len()))]
    pub fn extract(&self, url: &str, raw: &str) -> Result<SiteStructure> {
        if raw.trim().is_empty() {
            return Err(SeoscopeError::parse(format!("{url}: empty page content")));
        }
        if !looks_like_text(raw) {
            return Err(SeoscopeError::parse(format!("{url}: content is not text")));
        }

        let doc = Html::parse_document(raw);

        let headings = extract_headings(&doc);
        let body_text = extract_body_text(&doc);
        let title = extract_title(&doc, &headings);

        if title.is_empty() && headings.is_empty() && body_text.is_empty() {
            return Err(SeoscopeError::parse(format!(
                "{url}: structurally degenerate page (no title, headings, or body text)"
            )));
        }

        let structure = SiteStructure {
            url: url.to_string(),
            title,
            meta_description: extract_meta_description(&doc),
            breadcrumbs: breadcrumbs::extract(&doc),
            word_count: body_text.split_whitespace().count(),
            body_excerpt: truncate_chars(&body_text, self.excerpt_chars),
            headings,
        };

        debug!(
            headings = structure.headings.len(),
            breadcrumbs = structure.breadcrumbs.len(),
            word_count = structure.word_count,
            "structure extracted"
        );

        Ok(structure)
    }
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

fn extract_title(doc: &Html, headings: &[Heading]) -> String {
    if let Some(title) = doc
        .select(&TITLE_SEL)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
    {
        return title;
    }
    if let Some(og) = meta_content(doc, "property", "og:title") {
        return og;
    }
    headings
        .iter()
        .find(|h| h.level == 1)
        .map(|h| h.text.clone())
        .unwrap_or_default()
}

fn extract_meta_description(doc: &Html) -> String {
    meta_content(doc, "name", "description")
        .or_else(|| meta_content(doc, "property", "og:description"))
        .unwrap_or_default()
}

/// First non-empty `content` of a `<meta>` whose `attr` equals `value`,
/// compared case-insensitively.
fn meta_content(doc: &Html, attr: &str, value: &str) -> Option<String> {
    doc.select(&META_SEL)
        .filter(|el| {
            el.value()
                .attr(attr)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
        })
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|c| !c.is_empty())
}

fn extract_headings(doc: &Html) -> Vec<Heading> {
    doc.select(&HEADING_SEL)
        .filter_map(|el| {
            let level = el.value().name()[1..].parse::<u8>().ok()?;
            let text = element_text(&el);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

/// Visible body copy with chrome and non-content elements removed.
fn extract_body_text(doc: &Html) -> String {
    let Some(body) = doc.select(&BODY_SEL).next() else {
        return String::new();
    };

    let mut words: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a char boundary without splitting a word when possible.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let head = &text[..cut];
            match head.rfind(' ') {
                Some(space) if space > 0 => head[..space].to_string(),
                _ => head.to_string(),
            }
        }
    }
}

/// Reject binary payloads: NUL bytes or a high share of control characters.
fn looks_like_text(raw: &str) -> bool {
    if raw.contains('\0') {
        return false;
    }
    let total = raw.chars().count();
    let control = raw
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{c}'))
        .count();
    control * 100 <= total
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>  Industrial Sensors |
     Buyer's Guide </title>
  <meta name="Description" content="Everything about industrial sensors.">
  <script>var tracking = "ignore me";</script>
  <style>body { color: red; }</style>
</head>
<body>
  <header><a href="/">Home</a> Site header</header>
  <nav aria-label="Breadcrumb">
    <ol><li><a href="/">Home</a></li><li><a href="/sensors">Sensors</a></li><li>Guide</li></ol>
  </nav>
  <main>
    <h1>Industrial   Sensors</h1>
    <p>Sensors measure pressure, temperature and flow.</p>
    <h2>Types</h2>
    <p>There are many types.</p>
    <h3>Pressure</h3>
    <h2></h2>
    <h2>Pricing</h2>
    <noscript>Enable JavaScript</noscript>
  </main>
  <footer>Copyright footer</footer>
</body>
</html>"#;

    fn extractor() -> StructureExtractor {
        StructureExtractor::new(4000)
    }

    #[test]
    fn extracts_all_fields() {
        let s = extractor().extract("https://a.example.com/", PAGE).unwrap();

        assert_eq!(s.url, "https://a.example.com/");
        assert_eq!(s.title, "Industrial Sensors | Buyer's Guide");
        assert_eq!(s.meta_description, "Everything about industrial sensors.");
        assert_eq!(s.breadcrumbs, ["Home", "Sensors", "Guide"]);

        let headings: Vec<_> = s.headings.iter().map(|h| (h.level, h.text.as_str())).collect();
        assert_eq!(
            headings,
            [(1, "Industrial Sensors"), (2, "Types"), (3, "Pressure"), (2, "Pricing")]
        );
    }

    #[test]
    fn body_text_skips_chrome_and_scripts() {
        let s = extractor().extract("https://a.example.com/", PAGE).unwrap();

        assert!(s.body_excerpt.starts_with("Industrial Sensors Sensors measure"));
        assert!(!s.body_excerpt.contains("ignore me"));
        assert!(!s.body_excerpt.contains("Site header"));
        assert!(!s.body_excerpt.contains("Copyright"));
        assert!(!s.body_excerpt.contains("Enable JavaScript"));
        assert!(!s.body_excerpt.contains("Guide"));
        assert_eq!(s.word_count, s.body_excerpt.split_whitespace().count());
    }

    #[test]
    fn extraction_is_deterministic() {
        let a = extractor().extract("https://a.example.com/", PAGE).unwrap();
        let b = extractor().extract("https://a.example.com/", PAGE).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn missing_optional_fields_degrade_gracefully() {
        let html = "<html><body><h1>Only a heading</h1><p>And text.</p></body></html>";
        let s = extractor().extract("https://b.example.com/", html).unwrap();
        assert_eq!(s.title, "Only a heading");
        assert!(s.meta_description.is_empty());
        assert!(s.breadcrumbs.is_empty());
    }

    #[test]
    fn og_fallbacks() {
        let html = r#"<html><head>
            <meta property="og:title" content="OG Title">
            <meta property="og:description" content="OG description">
        </head><body><p>text</p></body></html>"#;
        let s = extractor().extract("https://c.example.com/", html).unwrap();
        assert_eq!(s.title, "OG Title");
        assert_eq!(s.meta_description, "OG description");
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        let err = extractor().extract("https://a.example.com/", "  \n ").unwrap_err();
        assert!(matches!(err, SeoscopeError::Parse { .. }));
    }

    #[test]
    fn binary_input_is_a_parse_error() {
        let raw = "%PDF-1.4\0\u{1}\u{2}\u{3}binary";
        let err = extractor().extract("https://a.example.com/", raw).unwrap_err();
        assert!(err.to_string().contains("not text"));
    }

    #[test]
    fn degenerate_markup_is_a_parse_error() {
        let raw = "<html><head><script>x()</script></head><body><nav>menu</nav></body></html>";
        let err = extractor().extract("https://a.example.com/", raw).unwrap_err();
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn excerpt_is_bounded() {
        let body = "word ".repeat(500);
        let html = format!("<html><head><title>T</title></head><body><p>{body}</p></body></html>");
        let s = StructureExtractor::new(100).extract("https://a.example.com/", &html).unwrap();
        assert!(s.body_excerpt.chars().count() <= 100);
        assert!(s.body_excerpt.ends_with("word"));
        assert_eq!(s.word_count, 500);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("産業用センサー", 3), "産業用");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("alpha beta gamma", 8), "alpha");
    }
}
