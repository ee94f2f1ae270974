//! HTML link extraction
//!
//! Turns a fetched page into the set of canonical outlinks it references,
//! plus the meta-robots directives the fetcher may need to honor. Parsing is
//! synchronous on purpose: `scraper::Html` is not `Send`, so no document may
//! live across an await point.

use crate::url::{CrawlUrl, Normalizer};
use scraper::{Html, Selector};
use url::Url;

/// Meta-robots directives observed on a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    /// `<meta name="robots" content="noindex">` was present
    pub noindex: bool,

    /// `<meta name="robots" content="nofollow">` was present
    pub nofollow: bool,
}

/// Outcome of parsing one HTML page
#[derive(Debug, Default)]
pub struct ExtractedPage {
    /// Canonical outlinks, in document order
    pub links: Vec<CrawlUrl>,

    /// Meta directives found in the head
    pub meta: PageMeta,
}

/// Extracts outlinks and meta directives from an HTML body
///
/// Links come from `<a href>`, `<link href>`, `<iframe src>`,
/// `<iframe srcdoc>` (parsed recursively as a nested fragment),
/// `<object data>`, and `<embed src>`. Each raw href is trimmed, resolved
/// against `base`, and normalized; anything that fails to parse as an
/// http(s) URL is silently discarded.
///
/// Honoring the returned meta directives is the caller's decision; this
/// function always reports what the page declared and what it linked to.
pub fn extract_links(base: &Url, body: &str, normalizer: &Normalizer) -> ExtractedPage {
    let document = Html::parse_document(body);

    let mut page = ExtractedPage {
        links: Vec::new(),
        meta: extract_meta(&document),
    };
    collect_links(&document, base, normalizer, &mut page.links);
    page
}

/// Attribute sources links are pulled from
const LINK_SELECTORS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("iframe[src]", "src"),
    ("object[data]", "data"),
    ("embed[src]", "src"),
];

fn collect_links(document: &Html, base: &Url, normalizer: &Normalizer, out: &mut Vec<CrawlUrl>) {
    for (selector, attr) in LINK_SELECTORS {
        if let Ok(selector) = Selector::parse(selector) {
            for element in document.select(&selector) {
                if let Some(raw) = element.value().attr(attr) {
                    if let Ok(link) = normalizer.resolve(base, raw) {
                        out.push(link);
                    }
                }
            }
        }
    }

    // srcdoc carries an inline document of its own
    if let Ok(selector) = Selector::parse("iframe[srcdoc]") {
        for element in document.select(&selector) {
            if let Some(srcdoc) = element.value().attr("srcdoc") {
                let fragment = Html::parse_fragment(srcdoc);
                collect_links(&fragment, base, normalizer, out);
            }
        }
    }
}

fn extract_meta(document: &Html) -> PageMeta {
    let mut meta = PageMeta::default();

    let Ok(selector) = Selector::parse("meta[name][content]") else {
        return meta;
    };
    for element in document.select(&selector) {
        let name = element.value().attr("name").unwrap_or_default();
        if !name.eq_ignore_ascii_case("robots") {
            continue;
        }
        let content = element.value().attr("content").unwrap_or_default();
        for token in content.split(',') {
            match token.trim().to_ascii_lowercase().as_str() {
                "noindex" => meta.noindex = true,
                "nofollow" => meta.nofollow = true,
                _ => {}
            }
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(base: &str, body: &str) -> ExtractedPage {
        let base = Url::parse(base).unwrap();
        extract_links(&base, body, &Normalizer::default())
    }

    fn link_strings(page: &ExtractedPage) -> Vec<String> {
        page.links.iter().map(|l| l.as_str().to_string()).collect()
    }

    #[test]
    fn test_relative_and_absolute_anchors() {
        let page = extract(
            "http://linktests.com/links/test.html",
            r#"<div id="menu">
                <a href="relative-dir/">link</a>
                <a href="relative-page/page.html">link</a>
                <a href="/abs-relative-dir/">link</a>
                <a href="/abs-relative-page/page.html">link</a>
                <a href="https://other.org/abs-dir/">link</a>
                <a href="https://other.org/abs-page/page.html">link</a>
                <a href="javascript:doStuff();">link</a>
                <a href="ftp:ignoreme.zip;">link</a>
            </div>"#,
        );

        assert_eq!(
            link_strings(&page),
            vec![
                "http://linktests.com/links/relative-dir/",
                "http://linktests.com/links/relative-page/page.html",
                "http://linktests.com/abs-relative-dir/",
                "http://linktests.com/abs-relative-page/page.html",
                "https://other.org/abs-dir/",
                "https://other.org/abs-page/page.html",
            ]
        );
    }

    #[test]
    fn test_hrefs_with_leading_whitespace() {
        let page = extract(
            "http://t.com/page1.html",
            r#"<div>
                <a href=" relative-dir/">link</a>
                <a href=" /abs-relative-page/page.html">link</a>
                <a href=" https://other.org/abs-dir/">link</a>
            </div>"#,
        );

        assert_eq!(
            link_strings(&page),
            vec![
                "http://t.com/relative-dir/",
                "http://t.com/abs-relative-page/page.html",
                "https://other.org/abs-dir/",
            ]
        );
    }

    #[test]
    fn test_object_embed_iframe_tags() {
        let page = extract(
            "http://t1.com/target.html",
            r#"<body>
                <object data="/object_data/page.html"></object>
                <iframe src="/iframe_src/page.html"> </iframe>
                <embed src="/embed_src/page.html" />
                <iframe srcdoc="<a href=/iframe_srcdoc/page.html > Link </a>"></iframe>
            </body>"#,
        );

        let links = link_strings(&page);
        for expected in [
            "http://t1.com/object_data/page.html",
            "http://t1.com/iframe_src/page.html",
            "http://t1.com/embed_src/page.html",
            "http://t1.com/iframe_srcdoc/page.html",
        ] {
            assert!(links.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_link_tag_href() {
        let page = extract(
            "http://a.com/",
            r#"<head><link rel="canonical" href="http://a.com/canonical"></head>"#,
        );
        assert_eq!(link_strings(&page), vec!["http://a.com/canonical"]);
    }

    #[test]
    fn test_no_links() {
        let page = extract("http://a.com/", "<html><div id=\"menu\"></div></html>");
        assert!(page.links.is_empty());
        assert_eq!(page.meta, PageMeta::default());
    }

    #[test]
    fn test_meta_nofollow_case_insensitive() {
        let page = extract(
            "http://t1.com/nofollow.html",
            r#"<head><meta name="ROBOTS" content="NoFollow"></head>
               <a href="/page.html">link</a>"#,
        );
        assert!(page.meta.nofollow);
        assert!(!page.meta.noindex);
        // The links are still reported; honoring nofollow is the caller's job
        assert_eq!(page.links.len(), 1);
    }

    #[test]
    fn test_meta_noindex_and_nofollow_tokens() {
        let page = extract(
            "http://t1.com/both.html",
            r#"<head><meta name="ROBOTS" content="noindeX, nofoLLow"></head>"#,
        );
        assert!(page.meta.noindex);
        assert!(page.meta.nofollow);
    }

    #[test]
    fn test_unrelated_meta_ignored() {
        let page = extract(
            "http://a.com/",
            r#"<head><meta name="description" content="noindex, nofollow"></head>"#,
        );
        assert_eq!(page.meta, PageMeta::default());
    }

    #[test]
    fn test_malformed_html_does_not_panic() {
        let page = extract("http://a.com/", "<<<>]] <a href=\"/ok\">x</a> <div");
        assert_eq!(link_strings(&page), vec!["http://a.com/ok"]);
    }
}
