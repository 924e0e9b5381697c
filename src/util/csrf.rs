//! Anti-forgery token sources.
//!
//! The backend embeds its CSRF token in the served page as
//! `<meta name="csrf-token" content="...">`. Sources are consulted on every
//! outgoing request and never cache the extracted value.

#[cfg(test)]
#[path = "csrf_test.rs"]
mod csrf_test;

use std::path::PathBuf;
use std::sync::{LazyLock, PoisonError, RwLock};

use regex::Regex;

/// `name` attribute value of the meta tag carrying the token.
pub const CSRF_META_NAME: &str = "csrf-token";

static META_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta tag regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute regex")
});

/// Something that can produce the current anti-forgery token.
pub trait CsrfSource: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
}

/// Extract the CSRF meta value from an HTML document.
#[must_use]
pub fn csrf_from_html(html: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut name = None;
        let mut content = None;
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)).map(|m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => name = value,
                "content" => content = value,
                _ => {}
            }
        }
        if name.is_some_and(|n| n.eq_ignore_ascii_case(CSRF_META_NAME)) {
            content.filter(|c| !c.is_empty()).map(ToOwned::to_owned)
        } else {
            None
        }
    })
}

/// In-memory page document, replaceable when a fresh page is loaded.
#[derive(Debug, Default)]
pub struct PageDocument {
    html: RwLock<String>,
}

impl PageDocument {
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: RwLock::new(html.into()) }
    }

    pub fn replace(&self, html: impl Into<String>) {
        *self.html.write().unwrap_or_else(PoisonError::into_inner) = html.into();
    }
}

impl CsrfSource for PageDocument {
    fn csrf_token(&self) -> Option<String> {
        let html = self.html.read().unwrap_or_else(PoisonError::into_inner);
        csrf_from_html(&html)
    }
}

/// HTML file on disk, re-read for every request.
#[derive(Debug, Clone)]
pub struct HtmlFile {
    path: PathBuf,
}

impl HtmlFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CsrfSource for HtmlFile {
    fn csrf_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(html) => csrf_from_html(&html),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "csrf page unreadable");
                None
            }
        }
    }
}
