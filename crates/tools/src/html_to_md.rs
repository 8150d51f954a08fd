//! Shared HTML-to-Markdown conversion for page-source previews.
//!
//! The browser executors feed rendered page source through `htmd`; when that
//! fails on malformed markup, `scraper` pulls plain text out of the main
//! content areas instead.

/// Convert HTML to clean Markdown.
///
/// Strips nav, header, footer, script, style, aside and similar chrome to
/// focus on main content. Preserves headings, links, lists, tables, code
/// blocks, and emphasis.
pub fn html_to_markdown(html: &str) -> String {
    use htmd::HtmlToMarkdown;

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe",
        ])
        .build();

    match converter.convert(html) {
        Ok(md) => clean_markdown(&md),
        Err(_) => extract_text_fallback(html),
    }
}

/// Clean up converted markdown:
/// - Collapse excessive blank lines (3+ → 2)
/// - Trim leading/trailing whitespace
fn clean_markdown(md: &str) -> String {
    let mut result = String::with_capacity(md.len());
    let mut consecutive_newlines: usize = 0;

    for line in md.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            consecutive_newlines += 1;
        } else {
            if !result.is_empty() {
                let separator_newlines = if consecutive_newlines > 0 { 2 } else { 1 };
                for _ in 0..separator_newlines {
                    result.push('\n');
                }
            }
            consecutive_newlines = 0;
            result.push_str(line);
        }
    }

    result.trim().to_string()
}

/// Fallback text extraction using scraper (when htmd fails).
fn extract_text_fallback(html: &str) -> String {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);

    // Try main content areas first
    let selectors = [
        "article",
        "main",
        "[role=\"main\"]",
        ".content",
        "#content",
        "body",
    ];

    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(element) = document.select(&selector).next() {
                let text: String = element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_basic() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let md = html_to_markdown(html);
        assert!(md.contains("# Hello") || md.contains("Hello"));
        assert!(md.contains("World"));
    }

    #[test]
    fn test_html_to_markdown_strips_scripts() {
        let html = "<html><body><script>alert('x')</script><p>Content</p></body></html>";
        let md = html_to_markdown(html);
        assert!(!md.contains("alert"));
        assert!(md.contains("Content"));
    }

    #[test]
    fn test_html_to_markdown_preserves_links() {
        let html = r#"<html><body><a href="https://example.com">Click here</a></body></html>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("Click here"));
        assert!(md.contains("https://example.com"));
    }

    #[test]
    fn test_clean_markdown_collapses_blanks() {
        let input = "Line 1\n\n\n\n\nLine 2\n\n\n\nLine 3";
        let result = clean_markdown(input);
        assert!(!result.contains("\n\n\n"));
    }
}
