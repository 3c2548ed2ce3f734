//! CSRF token discovery and injection.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::ScrapeError;

static NAME_SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"\[name="(.+?)"\]"#));

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Where an extracted token is sent back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenPlacement {
    /// As a form field on the next POST.
    #[default]
    FormParam,
    /// As a request header (`field` names the header).
    Header,
}

/// Describes how to find a CSRF token in a document and where to send it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfTokenFilter {
    selector: Option<String>,
    attribute: Option<String>,
    field: Option<String>,
    placement: TokenPlacement,
}

impl CsrfTokenFilter {
    /// Filter matching `selector`, returning the element itself.
    #[must_use]
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    /// Laravel's `<input name="_token" value="...">`.
    #[must_use]
    pub fn laravel() -> Self {
        Self::selector(r#"[name="_token"]"#).with_attribute("value")
    }

    /// Reads the token from `attribute` of the matched element.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Names the form field (or header) the token is sent as.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sends the token as the `header` request header.
    #[must_use]
    pub fn in_header(mut self, header: impl Into<String>) -> Self {
        self.field = Some(header.into());
        self.placement = TokenPlacement::Header;
        self
    }

    #[must_use]
    pub fn selector_str(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[must_use]
    pub fn placement(&self) -> TokenPlacement {
        self.placement
    }

    /// True when a selector is set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.selector.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Overlays the set fields of `other` on `self`.
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        if other.selector.is_some() {
            self.selector.clone_from(&other.selector);
        }
        if other.attribute.is_some() {
            self.attribute.clone_from(&other.attribute);
        }
        if other.field.is_some() {
            self.field.clone_from(&other.field);
        }
        if other.placement != TokenPlacement::default() {
            self.placement = other.placement;
        }
        self
    }

    /// Field name to submit the token under: the configured field, or the
    /// `name` captured from a `[name="..."]` selector.
    #[must_use]
    pub fn form_field_name(&self) -> Option<String> {
        if let Some(field) = self.field.as_deref().filter(|f| !f.is_empty()) {
            return Some(field.to_string());
        }
        let selector = self.selector.as_deref()?;
        NAME_SELECTOR_RE
            .captures(selector)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().to_string())
    }
}

/// A token found by [`extract_csrf_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfToken {
    /// The configured attribute's value.
    Value(String),
    /// The matched element when no attribute is configured.
    Element {
        /// Concatenated text content.
        text: String,
        /// Outer HTML.
        html: String,
    },
}

impl CsrfToken {
    /// The token value, if this is an attribute token.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => Some(value),
            Self::Element { .. } => None,
        }
    }
}

/// Finds the first element matching `filter` in `document`.
///
/// # Errors
///
/// Returns [`ScrapeError::MissingCsrfFilter`] when no selector is set and
/// [`ScrapeError::InvalidSelector`] when it does not parse.
pub fn extract_csrf_token(
    filter: &CsrfTokenFilter,
    document: &Html,
) -> Result<Option<CsrfToken>, ScrapeError> {
    let Some(selector_text) = filter.selector.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ScrapeError::MissingCsrfFilter);
    };
    let selector = parse_selector(selector_text)?;

    let Some(element) = document.select(&selector).next() else {
        return Ok(None);
    };
    Ok(Some(token_from_element(filter, element)))
}

fn token_from_element(filter: &CsrfTokenFilter, element: ElementRef<'_>) -> CsrfToken {
    match filter.attribute.as_deref() {
        Some(attribute) => CsrfToken::Value(
            element
                .value()
                .attr(attribute)
                .unwrap_or_default()
                .to_string(),
        ),
        None => CsrfToken::Element {
            text: element.text().collect(),
            html: element.html(),
        },
    }
}

/// Adds `token` to `form` under the filter's field name, replacing any
/// existing value. Empty tokens and underivable names leave the form as is.
pub fn add_csrf_token_to_form(
    form: &mut Vec<(String, String)>,
    filter: &CsrfTokenFilter,
    token: &str,
) {
    if token.is_empty() {
        return;
    }
    let Some(name) = filter.form_field_name() else {
        return;
    };
    match form.iter_mut().find(|(key, _)| *key == name) {
        Some(entry) => entry.1 = token.to_string(),
        None => form.push((name, token.to_string())),
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
          <form method="post">
            <input type="hidden" name="_token" value="abc123">
            <meta name="csrf" content="meta-token">
            <span class="token">inline <b>text</b></span>
          </form>
        </body></html>
    "#;

    #[test]
    fn test_laravel_filter_reads_value_attribute() {
        let document = Html::parse_document(LOGIN_PAGE);
        let token = extract_csrf_token(&CsrfTokenFilter::laravel(), &document).unwrap();
        assert_eq!(token, Some(CsrfToken::Value("abc123".to_string())));
    }

    #[test]
    fn test_filter_without_attribute_returns_element() {
        let document = Html::parse_document(LOGIN_PAGE);
        let token = extract_csrf_token(&CsrfTokenFilter::selector("span.token"), &document)
            .unwrap()
            .unwrap();
        match token {
            CsrfToken::Element { text, html } => {
                assert_eq!(text, "inline text");
                assert!(html.starts_with("<span"));
            }
            CsrfToken::Value(_) => panic!("expected element token"),
        }
    }

    #[test]
    fn test_no_match_is_none() {
        let document = Html::parse_document("<html></html>");
        let token = extract_csrf_token(&CsrfTokenFilter::laravel(), &document).unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn test_missing_selector_is_error() {
        let document = Html::parse_document(LOGIN_PAGE);
        let result = extract_csrf_token(&CsrfTokenFilter::default(), &document);
        assert!(matches!(result, Err(ScrapeError::MissingCsrfFilter)));
    }

    #[test]
    fn test_invalid_selector_is_error() {
        let document = Html::parse_document(LOGIN_PAGE);
        let result = extract_csrf_token(&CsrfTokenFilter::selector("[[["), &document);
        assert!(matches!(result, Err(ScrapeError::InvalidSelector { .. })));
    }

    #[test]
    fn test_field_name_derived_from_name_selector() {
        assert_eq!(
            CsrfTokenFilter::laravel().form_field_name().as_deref(),
            Some("_token")
        );
        assert_eq!(
            CsrfTokenFilter::selector("meta.csrf")
                .with_field("authenticity_token")
                .form_field_name()
                .as_deref(),
            Some("authenticity_token")
        );
        assert!(CsrfTokenFilter::selector("#token").form_field_name().is_none());
    }

    #[test]
    fn test_add_token_replaces_existing_field() {
        let mut form = vec![
            ("email".to_string(), "a@b.c".to_string()),
            ("_token".to_string(), "stale".to_string()),
        ];
        add_csrf_token_to_form(&mut form, &CsrfTokenFilter::laravel(), "fresh");
        assert_eq!(form[1], ("_token".to_string(), "fresh".to_string()));
        assert_eq!(form.len(), 2);
    }

    #[test]
    fn test_add_empty_token_is_noop() {
        let mut form = Vec::new();
        add_csrf_token_to_form(&mut form, &CsrfTokenFilter::laravel(), "");
        assert!(form.is_empty());
    }

    #[test]
    fn test_merge_overlays_set_fields() {
        let base = CsrfTokenFilter::laravel();
        let merged = base.merge(&CsrfTokenFilter::default().in_header("X-CSRF-TOKEN"));
        assert_eq!(merged.selector_str(), Some(r#"[name="_token"]"#));
        assert_eq!(merged.attribute(), Some("value"));
        assert_eq!(merged.field(), Some("X-CSRF-TOKEN"));
        assert_eq!(merged.placement(), TokenPlacement::Header);
    }
}
