//! Content normalization
//!
//! Turns a fetched body into the normalized parts of a `FetchResult`:
//! - plain text and markdown renderings
//! - outbound links (from `<a>` tags and canonical links)
//! - image references
//! - title, description, author, and language metadata

use crate::model::PageMetadata;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose content never reaches the text rendering
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];

/// Elements that start a new line in the text rendering
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Characters of an undeclared body inspected for an HTML signature
const SNIFF_CHARS: usize = 512;

/// Normalized view of a page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub metadata: PageMetadata,

    /// All links found on the page (absolute URLs, deduplicated)
    pub links: Vec<String>,

    /// All image references (absolute URLs, deduplicated)
    pub images: Vec<String>,

    pub text: String,

    pub markdown: String,
}

/// Returns true when the body should be treated as HTML
///
/// The declared content type wins; without one the body is sniffed.
pub fn is_html(content_type: Option<&str>, body: &str) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        }
        None => {
            let body = body.trim_start();
            let head = body
                .char_indices()
                .nth(SNIFF_CHARS)
                .map_or(body, |(end, _)| &body[..end])
                .to_ascii_lowercase();
            head.starts_with("<!doctype html") || head.contains("<html")
        }
    }
}

/// Normalizes any fetched body
///
/// Non-HTML bodies (plain text, JSON, XML) are passed through verbatim as both
/// text and markdown, with no links or images.
pub fn parse_body(body: &str, content_type: Option<&str>, base_url: &Url) -> ParsedPage {
    if is_html(content_type, body) {
        parse_html(body, base_url)
    } else {
        ParsedPage {
            text: body.trim().to_string(),
            markdown: body.trim().to_string(),
            ..ParsedPage::default()
        }
    }
}

/// Parses HTML content and extracts text, markdown, links, images and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links (same page anchors)
///
/// Relative references resolve against `<base href>` when present, otherwise
/// against `base_url`.
///
/// # Example
///
/// ```
/// use sumi_harvest::fetch::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.metadata.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, base_url);

    let metadata = extract_metadata(&document);
    let links = extract_links(&document, &base);
    let images = extract_images(&document, &base);
    let text = extract_text(&document);
    let markdown = render_markdown(html).unwrap_or_else(|| text.clone());

    ParsedPage {
        metadata,
        links,
        images,
        text,
        markdown,
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Honors `<base href>` for relative resolution
fn document_base(document: &Html, fallback: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| fallback.join(href.trim()).ok())
        })
        .unwrap_or_else(|| fallback.clone())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn extract_metadata(document: &Html) -> PageMetadata {
    let title = selector("title")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        })
        .filter(|s| !s.is_empty())
        .or_else(|| first_attr(document, "meta[property='og:title']", "content"));

    let description = first_attr(document, "meta[name='description']", "content")
        .or_else(|| first_attr(document, "meta[property='og:description']", "content"));

    let author = first_attr(document, "meta[name='author']", "content")
        .or_else(|| first_attr(document, "meta[property='article:author']", "content"));

    let language = first_attr(document, "html[lang]", "lang")
        .or_else(|| first_attr(document, "meta[http-equiv='content-language']", "content"));

    PageMetadata {
        title,
        description,
        author,
        language,
    }
}

/// Extracts all valid, deduplicated links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if seen.insert(absolute.clone()) {
                    links.push(absolute);
                }
            }
        }
    }

    if let Some(canonical_selector) = selector("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(absolute) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if seen.insert(absolute.clone()) {
                    links.push(absolute);
                }
            }
        }
    }

    links
}

/// Extracts image references from `<img>` and the Open Graph image
fn extract_images(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    let mut push = |raw: &str| {
        if let Some(absolute) = resolve_link(raw, base_url) {
            if seen.insert(absolute.clone()) {
                images.push(absolute);
            }
        }
    };

    if let Some(img_selector) = selector("img") {
        for element in document.select(&img_selector) {
            let attrs = element.value();
            if let Some(src) = attrs.attr("src").or_else(|| attrs.attr("data-src")) {
                push(src);
            } else if let Some(candidate) = attrs
                .attr("srcset")
                .and_then(|set| set.split(',').next())
                .and_then(|c| c.split_whitespace().next())
            {
                push(candidate);
            }
        }
    }

    if let Some(og) = first_attr(document, "meta[property='og:image']", "content") {
        push(&og);
    }

    images
}

/// Resolves an href to an absolute http(s) URL without its fragment
///
/// Returns None if the reference should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute.to_string())
}

/// Visible text of the document, one block per line
fn extract_text(document: &Html) -> String {
    let mut buffer = String::new();
    let root = document
        .select(&Selector::parse("body").expect("static selector"))
        .next()
        .unwrap_or_else(|| document.root_element());
    collect_text(root, &mut buffer);

    buffer
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, buffer: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                buffer.push_str(text);
            }
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    buffer.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, buffer);
                }
                if block {
                    buffer.push('\n');
                } else {
                    buffer.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn render_markdown(html: &str) -> Option<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "template", "head", "svg"])
        .build();

    match converter.convert(html) {
        Ok(markdown) => Some(markdown.trim().to_string()),
        Err(e) => {
            tracing::debug!("Markdown conversion failed, using plain text: {}", e);
            None
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test
            Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.metadata.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.metadata.title, None);
    }

    #[test]
    fn test_metadata() {
        let html = r#"<html lang="sv"><head>
            <meta name="description" content="A page about things">
            <meta name="author" content="Ada">
            </head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.metadata.description.as_deref(),
            Some("A page about things")
        );
        assert_eq!(parsed.metadata.author.as_deref(), Some("Ada"));
        assert_eq!(parsed.metadata.language.as_deref(), Some("sv"));
    }

    #[test]
    fn test_relative_links_resolved_and_deduplicated() {
        let html = r##"<html><body>
            <a href="/other">One</a>
            <a href="other">Two</a>
            <a href="/other#section">Three</a>
            <a href="https://other.com/page">Four</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.links,
            vec![
                "https://example.com/other".to_string(),
                "https://other.com/page".to_string()
            ]
        );
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,hi">data</a>
            <a href="#top">anchor</a>
            <a href="/file.pdf" download>download</a>
            <a href="/valid">valid</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links, vec!["https://example.com/valid".to_string()]);
    }

    #[test]
    fn test_base_href_respected() {
        let html = r#"<html><head><base href="https://cdn.example.com/root/"></head>
            <body><a href="child">c</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.links,
            vec!["https://cdn.example.com/root/child".to_string()]
        );
    }

    #[test]
    fn test_images() {
        let html = r#"<html><head><meta property="og:image" content="/og.png"></head><body>
            <img src="/a.png"><img data-src="b.png"><img srcset="/c.png 1x, /c2.png 2x">
            <img src="/a.png">
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.images,
            vec![
                "https://example.com/a.png".to_string(),
                "https://example.com/b.png".to_string(),
                "https://example.com/c.png".to_string(),
                "https://example.com/og.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_text_skips_scripts_and_splits_blocks() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head><body>
            <h1>Heading</h1>
            <p>First   paragraph with <b>bold</b> text.</p>
            <script>var hidden = 1;</script>
            <p>Second</p>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.text,
            "Heading\nFirst paragraph with bold text.\nSecond"
        );
    }

    #[test]
    fn test_markdown_rendering() {
        let html = r#"<html><body><h1>Title</h1><p>Body <a href="/x">link</a></p></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.markdown.contains("# Title") || parsed.markdown.contains("Title\n==="));
        assert!(parsed.markdown.contains("[link](/x)"));
        assert!(!parsed.markdown.contains("<p>"));
    }

    #[test]
    fn test_non_html_passthrough() {
        let parsed = parse_body(
            "{\"a\": 1}",
            Some("application/json"),
            &base_url(),
        );
        assert_eq!(parsed.text, "{\"a\": 1}");
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_is_html_sniffing() {
        assert!(is_html(None, "  <!DOCTYPE html><html></html>"));
        assert!(is_html(Some("text/html; charset=utf-8"), ""));
        assert!(!is_html(Some("text/plain"), "<html>"));
        assert!(!is_html(None, "plain words"));
    }

    #[test]
    fn test_sniffing_multibyte_body() {
        // Byte 512 falls inside a two-byte character
        let body = format!("a{}", "é".repeat(400));
        assert!(!is_html(None, &body));

        let page = format!("<html><body>{}</body></html>", "日本語".repeat(300));
        assert!(is_html(None, &page));
        let parsed = parse_body(&page, None, &base_url());
        assert!(parsed.text.starts_with("日本語"));
    }
}
