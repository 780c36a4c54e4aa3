//! HTML parsing utilities for extracting text, links, images, forms and metadata.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::types::{Form, FormField, Image, Link, ScrapedPage};
use crate::scrape::ScrapingOptions;

/// Elements whose text counts as visible page text.
const TEXT_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, div, span, article, section";

/// Text fragments of this many bytes or fewer are ignored.
const MIN_TEXT_FRAGMENT_LEN: usize = 3;

/// Parse a fetched document into a [`ScrapedPage`], honoring the extract flags
/// of `options`. Status and headers are left to the caller.
pub fn parse_page(url: &str, body: &str, options: &ScrapingOptions) -> ScrapedPage {
    let document = Html::parse_document(body);
    let base = Url::parse(url).ok();
    let mut page = ScrapedPage::new(url);

    if options.extract_html {
        page.html_body = body.to_string();
    }
    if options.extract_text {
        page.text = extract_text(&document);
    }
    if options.extract_meta {
        page.title = extract_title(&document);
        page.meta_tags = extract_meta_tags(&document);
    }
    if options.extract_links {
        page.links = extract_links(&document, base.as_ref());
    }
    if options.extract_images {
        page.images = extract_images(&document, base.as_ref());
    }
    if options.extract_forms {
        page.forms = extract_forms(&document);
    }
    if options.extract_scripts {
        page.scripts = extract_scripts(&document, base.as_ref());
        page.stylesheets = extract_stylesheets(&document, base.as_ref());
    }

    debug!(
        url = %url,
        text_length = page.text.len(),
        links = page.links.len(),
        images = page.images.len(),
        forms = page.forms.len(),
        "page_parsed"
    );

    page
}

/// Resolve `reference` against `base`; unresolvable references are returned as-is.
pub fn resolve_url(base: Option<&Url>, reference: &str) -> String {
    match base {
        Some(base) => base
            .join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
        None => reference.to_string(),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn attr(element: &ElementRef<'_>, name: &str) -> String {
    element.value().attr(name).unwrap_or_default().to_string()
}

/// Extract the page title.
pub fn extract_title(document: &Html) -> String {
    let selector = Selector::parse("head title").expect("Invalid selector");
    document
        .select(&selector)
        .map(|t| element_text(&t))
        .collect::<Vec<_>>()
        .join("")
}

/// Extract visible text from block and inline text elements.
///
/// Nested elements contribute their text once per enclosing element.
pub fn extract_text(document: &Html) -> String {
    let selector = Selector::parse(TEXT_SELECTOR).expect("Invalid selector");

    document
        .select(&selector)
        .map(|el| element_text(&el))
        .filter(|text| text.len() > MIN_TEXT_FRAGMENT_LEN)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract `<meta>` tags keyed by their `name` and/or `property`.
pub fn extract_meta_tags(document: &Html) -> BTreeMap<String, String> {
    let selector = Selector::parse("meta").expect("Invalid selector");
    let mut tags = BTreeMap::new();

    for meta in document.select(&selector) {
        let content = match meta.value().attr("content") {
            Some(c) if !c.is_empty() => c,
            _ => continue,
        };

        for key in ["name", "property"] {
            if let Some(k) = meta.value().attr(key).filter(|k| !k.is_empty()) {
                tags.insert(k.to_string(), content.to_string());
            }
        }
    }

    tags
}

/// Extract all links with absolute URLs.
pub fn extract_links(document: &Html, base: Option<&Url>) -> Vec<Link> {
    let selector = Selector::parse("a[href]").expect("Invalid selector");

    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href").filter(|h| !h.is_empty())?;
            Some(Link {
                url: resolve_url(base, href),
                text: element_text(&a),
                rel: attr(&a, "rel"),
                target: attr(&a, "target"),
                download: attr(&a, "download"),
            })
        })
        .collect()
}

/// Extract all images with absolute source URLs.
pub fn extract_images(document: &Html, base: Option<&Url>) -> Vec<Image> {
    let selector = Selector::parse("img[src]").expect("Invalid selector");

    document
        .select(&selector)
        .filter_map(|img| {
            let src = img.value().attr("src").filter(|s| !s.is_empty())?;
            Some(Image {
                url: resolve_url(base, src),
                alt: attr(&img, "alt"),
                title: attr(&img, "title"),
                width: attr(&img, "width"),
                height: attr(&img, "height"),
            })
        })
        .collect()
}

/// Extract forms and their input fields.
pub fn extract_forms(document: &Html) -> Vec<Form> {
    let form_selector = Selector::parse("form").expect("Invalid selector");
    let field_selector = Selector::parse("input, textarea, select").expect("Invalid selector");

    document
        .select(&form_selector)
        .map(|form| {
            let method = attr(&form, "method").to_uppercase();
            let fields = form
                .select(&field_selector)
                .map(|field| {
                    let field_type = match field.value().attr("type").filter(|t| !t.is_empty()) {
                        Some(t) => t.to_string(),
                        None => match field.value().name() {
                            "textarea" => "textarea".to_string(),
                            "select" => "select".to_string(),
                            _ => "text".to_string(),
                        },
                    };

                    FormField {
                        name: attr(&field, "name"),
                        field_type,
                        value: attr(&field, "value"),
                        placeholder: attr(&field, "placeholder"),
                        required: field.value().attr("required").is_some(),
                    }
                })
                .collect();

            Form {
                action: attr(&form, "action"),
                method: if method.is_empty() { "GET".to_string() } else { method },
                name: attr(&form, "name"),
                id: attr(&form, "id"),
                fields,
            }
        })
        .collect()
}

/// Extract absolute URLs of external scripts.
pub fn extract_scripts(document: &Html, base: Option<&Url>) -> Vec<String> {
    let selector = Selector::parse("script[src]").expect("Invalid selector");

    document
        .select(&selector)
        .filter_map(|s| s.value().attr("src").filter(|src| !src.is_empty()))
        .map(|src| resolve_url(base, src))
        .collect()
}

/// Extract absolute URLs of linked stylesheets.
pub fn extract_stylesheets(document: &Html, base: Option<&Url>) -> Vec<String> {
    let selector = Selector::parse(r#"link[rel="stylesheet"]"#).expect("Invalid selector");

    document
        .select(&selector)
        .filter_map(|l| l.value().attr("href").filter(|href| !href.is_empty()))
        .map(|href| resolve_url(base, href))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head>
                <title>Acme Corp</title>
                <meta name="description" content="Contact page">
                <meta property="og:title" content="Acme">
                <meta name="empty" content="">
                <link rel="stylesheet" href="/css/site.css">
                <script src="https://cdn.example.com/app.js"></script>
                <script>inline()</script>
            </head>
            <body>
                <h1>Contact us</h1>
                <p>Email sales@acme.test for pricing</p>
                <span>ok</span>
                <a href="/about" rel="nofollow">About</a>
                <a href="https://other.test/x" target="_blank">Other</a>
                <a href="">Empty</a>
                <img src="logo.png" alt="Logo" width="10">
                <form action="/subscribe" method="post" id="news">
                    <input name="email" type="email" placeholder="you@example.com" required>
                    <input name="nick">
                    <textarea name="message"></textarea>
                    <select name="topic"></select>
                </form>
                <form action="/search"><input name="q"></form>
            </body>
        </html>
    "#;

    fn doc() -> Html {
        Html::parse_document(PAGE)
    }

    fn base() -> Url {
        Url::parse("https://acme.test/contact/").unwrap()
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title(&doc()), "Acme Corp");
    }

    #[test]
    fn test_extract_text_skips_short_fragments() {
        let text = extract_text(&doc());
        assert!(text.contains("Contact us"));
        assert!(text.contains("Email sales@acme.test for pricing"));
        assert!(!text.split(' ').any(|w| w == "ok"));
    }

    #[test]
    fn test_extract_meta_tags() {
        let tags = extract_meta_tags(&doc());
        assert_eq!(tags.get("description").map(String::as_str), Some("Contact page"));
        assert_eq!(tags.get("og:title").map(String::as_str), Some("Acme"));
        assert!(!tags.contains_key("empty"));
    }

    #[test]
    fn test_extract_links_resolves_relative_urls() {
        let links = extract_links(&doc(), Some(&base()));
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://acme.test/about");
        assert_eq!(links[0].text, "About");
        assert_eq!(links[0].rel, "nofollow");
        assert_eq!(links[1].url, "https://other.test/x");
        assert_eq!(links[1].target, "_blank");
    }

    #[test]
    fn test_extract_images() {
        let images = extract_images(&doc(), Some(&base()));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].url, "https://acme.test/contact/logo.png");
        assert_eq!(images[0].alt, "Logo");
        assert_eq!(images[0].width, "10");
    }

    #[test]
    fn test_extract_forms() {
        let forms = extract_forms(&doc());
        assert_eq!(forms.len(), 2);

        let news = &forms[0];
        assert_eq!(news.method, "POST");
        assert_eq!(news.id, "news");
        let types: Vec<_> = news.fields.iter().map(|f| f.field_type.as_str()).collect();
        assert_eq!(types, vec!["email", "text", "textarea", "select"]);
        assert!(news.fields[0].required);
        assert!(!news.fields[1].required);

        assert_eq!(forms[1].method, "GET");
    }

    #[test]
    fn test_extract_scripts_and_stylesheets() {
        let scripts = extract_scripts(&doc(), Some(&base()));
        assert_eq!(scripts, vec!["https://cdn.example.com/app.js".to_string()]);

        let sheets = extract_stylesheets(&doc(), Some(&base()));
        assert_eq!(sheets, vec!["https://acme.test/css/site.css".to_string()]);
    }

    #[test]
    fn test_resolve_url_without_base() {
        assert_eq!(resolve_url(None, "/about"), "/about");
    }

    #[test]
    fn test_parse_page_honors_flags() {
        let options = ScrapingOptions {
            extract_html: false,
            extract_links: false,
            ..ScrapingOptions::default()
        };

        let page = parse_page("https://acme.test/contact/", PAGE, &options);
        assert_eq!(page.title, "Acme Corp");
        assert!(page.html_body.is_empty());
        assert!(page.links.is_empty());
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.forms.len(), 2);
    }
}
