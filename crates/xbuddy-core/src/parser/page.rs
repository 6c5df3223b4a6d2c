//! Process page parser
//!
//! Extracts candidate anchors, the format/resolution labels and the
//! single-click download button from a rendered process page.

use scraper::{ElementRef, Html, Selector};

use crate::classifier::LinkRules;
use crate::error::{Result, XbuddyError};
use crate::types::Anchor;

/// Format and resolution labels shown next to the links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSummary {
    /// Lower-cased format labels in page order, without repeats
    pub formats: Vec<String>,
    /// Whether any resolution cell mentions the resolution hint
    pub has_resolution_hint: bool,
}

impl FormatSummary {
    pub fn has_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| XbuddyError::Config(format!("Invalid selector `{}`: {:?}", selector, e)))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>()
}

/// Parses every candidate anchor from the rendered page
///
/// # Arguments
/// * `html` - Rendered page HTML
/// * `rules` - Rule set providing the anchor selector
///
/// # Returns
/// Anchors with an `href`, in document order. Empty if none matched.
///
/// # Errors
/// Returns `Config` if the anchor selector is invalid
pub fn parse_anchors(html: &str, rules: &LinkRules) -> Result<Vec<Anchor>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&rules.anchor_selector)?;

    let anchors = document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let parent_text = element
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| element_text(&parent))
                .unwrap_or_default();
            Some(Anchor::new(href, parent_text))
        })
        .collect();

    Ok(anchors)
}

/// Collects the format labels and checks the resolution cells
///
/// Only used for diagnostics; classification relies on each anchor's
/// parent text instead.
pub fn parse_formats(html: &str, rules: &LinkRules) -> Result<FormatSummary> {
    let document = Html::parse_document(html);
    let format_selector = parse_selector(&rules.format_selector)?;
    let resolution_selector = parse_selector(&rules.resolution_selector)?;

    let mut summary = FormatSummary::default();

    for element in document.select(&format_selector) {
        let text = element_text(&element).trim().to_lowercase();
        if !text.is_empty() && !summary.formats.contains(&text) {
            summary.formats.push(text);
        }
    }

    if !rules.resolution_hint.is_empty() {
        summary.has_resolution_hint = document
            .select(&resolution_selector)
            .any(|element| element_text(&element).contains(&rules.resolution_hint));
    }

    Ok(summary)
}

/// Checks whether the single-click download button is on the page
pub fn has_direct_button(html: &str, rules: &LinkRules) -> Result<bool> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&rules.direct_button_selector)?;
    Ok(document.select(&selector).next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCESS_PAGE: &str = r#"
    <html>
    <body>
    <main id="root">
        <section class="w-full max-w-4xl">
            <div class="mb-4 mt-8 text-center">
                <div>
                    <div class="w-24 text-blue-500 uppercase">mp4</div>
                    <div class="w-1/2 truncate">854x480</div>
                    <div class="w-1/3"><a rel="noreferrer nofollow noopener" href="https://a.workers.dev/480.mp4">Download 480p</a></div>
                </div>
                <div>
                    <div class="w-24 text-blue-500 uppercase">MP4</div>
                    <div class="w-1/2 truncate">1280x720</div>
                    <div class="w-1/3"><a rel="noreferrer nofollow noopener" href="https://b.9xbud.com/720.mp4">Download</a></div>
                </div>
                <div>
                    <div class="w-24 text-blue-500 uppercase">mpeg</div>
                    <span><a rel="noreferrer nofollow noopener" href="https://twitter.com/intent/tweet?u=1">Share</a></span>
                </div>
                <a rel="noreferrer nofollow noopener">No href</a>
                <a rel="nofollow" href="https://ignored.example/x.mp4">Wrong rel</a>
            </div>
        </section>
    </main>
    <a rel="noreferrer nofollow noopener" href="https://outside.example/x.mp4">Outside root</a>
    </body>
    </html>
    "#;

    #[test]
    fn test_parse_anchors_scoped_to_root() {
        let anchors = parse_anchors(PROCESS_PAGE, &LinkRules::default()).unwrap();
        let hrefs: Vec<&str> = anchors.iter().map(|a| a.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://a.workers.dev/480.mp4",
                "https://b.9xbud.com/720.mp4",
                "https://twitter.com/intent/tweet?u=1"
            ]
        );
    }

    #[test]
    fn test_parse_anchors_parent_text() {
        let anchors = parse_anchors(PROCESS_PAGE, &LinkRules::default()).unwrap();
        assert_eq!(anchors[0].parent_text, "Download 480p");
        assert_eq!(anchors[1].parent_text, "Download");
        assert_eq!(anchors[2].parent_text, "Share");
    }

    #[test]
    fn test_parse_anchors_empty_page() {
        let anchors = parse_anchors("<html><body></body></html>", &LinkRules::default()).unwrap();
        assert!(anchors.is_empty());
    }

    #[test]
    fn test_parse_anchors_invalid_selector() {
        let rules = LinkRules {
            anchor_selector: "a[".to_string(),
            ..LinkRules::default()
        };
        match parse_anchors(PROCESS_PAGE, &rules) {
            Err(XbuddyError::Config(msg)) => assert!(msg.contains("a[")),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_parse_formats() {
        let summary = parse_formats(PROCESS_PAGE, &LinkRules::default()).unwrap();
        assert_eq!(summary.formats, vec!["mp4".to_string(), "mpeg".to_string()]);
        assert!(summary.has_format("mp4"));
        assert!(summary.has_format("mpeg"));
        assert!(summary.has_resolution_hint);
    }

    #[test]
    fn test_parse_formats_without_hint() {
        let html = r#"<div class="truncate">1280x720</div>"#;
        let summary = parse_formats(html, &LinkRules::default()).unwrap();
        assert!(summary.formats.is_empty());
        assert!(!summary.has_resolution_hint);
    }

    #[test]
    fn test_has_direct_button() {
        let html = r#"<main><a class="btn btn-success btn-lg w-full mt-4" href="/dl">Download Now</a></main>"#;
        assert!(has_direct_button(html, &LinkRules::default()).unwrap());
        assert!(!has_direct_button(PROCESS_PAGE, &LinkRules::default()).unwrap());
    }
}
