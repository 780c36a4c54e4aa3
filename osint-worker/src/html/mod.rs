//! HTML extraction: turns a fetched document into a [`ScrapedPage`].

pub mod parser;
pub mod types;

pub use parser::{parse_page, resolve_url};
pub use types::{Form, FormField, Image, Link, ScrapedPage};
