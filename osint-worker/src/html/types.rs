//! Type definitions for page extraction results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything extracted from one fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// URL that was requested
    pub url: String,
    /// Contents of `<title>`
    #[serde(default)]
    pub title: String,
    /// Visible text, joined by spaces
    #[serde(default)]
    pub text: String,
    /// Raw response body
    #[serde(default)]
    pub html_body: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub forms: Vec<Form>,
    /// Absolute URLs of external scripts
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Absolute URLs of linked stylesheets
    #[serde(default)]
    pub stylesheets: Vec<String>,
    /// `name`/`property` → `content` of every `<meta>` tag
    #[serde(default)]
    pub meta_tags: BTreeMap<String, String>,
    /// First value of every response header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP status, 0 when the page could not be fetched
    #[serde(default)]
    pub status_code: u16,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedPage {
    /// Create an empty result for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            text: String::new(),
            html_body: String::new(),
            links: Vec::new(),
            images: Vec::new(),
            forms: Vec::new(),
            scripts: Vec::new(),
            stylesheets: Vec::new(),
            meta_tags: BTreeMap::new(),
            headers: BTreeMap::new(),
            status_code: 0,
            scraped_at: Utc::now(),
        }
    }
}

/// A hyperlink found on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Absolute target URL
    pub url: String,
    /// Anchor text
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub download: String,
}

/// An image found on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Absolute source URL
    pub url: String,
    pub alt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub width: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub height: String,
}

/// An HTML form and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub action: String,
    /// Upper-cased method, `GET` when unspecified
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub fields: Vec<FormField>,
}

/// One `input`, `textarea` or `select` of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    /// Declared type, or the element name for `textarea`/`select`, or `text`
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
    pub required: bool,
}
