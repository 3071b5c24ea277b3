//! Response body decoding.
//!
//! Bodies are parsed as JSON when the upstream says so (or says nothing), otherwise
//! kept as text. Challenge-solving browsers hand JSON APIs back wrapped in an HTML
//! page, so [`unwrap_json_from_html`] digs the payload out again.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;

static PRE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("pre").unwrap());
static JSON_SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/json"]"#).unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static EMBEDDED_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Vec<u8>),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserialize a JSON body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_json()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// JSON when the content type is absent or JSON, text otherwise or when parsing fails
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> ResponseBody {
    let wants_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(true);

    if wants_json {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return ResponseBody::Json(value);
        }
    }

    ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())
}

/// Lowercase header names, joining repeated headers with `, `
pub fn normalize_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut normalized: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        normalized
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    normalized
}

/// Lowercase the keys of an already collected header map
pub fn lowercase_keys(headers: HashMap<String, String>) -> HashMap<String, String> {
    headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect()
}

/// Whether `text` looks like an HTML page wrapping a JSON document
pub fn is_html_wrapped_json(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('<') || trimmed.contains("</"))
        && (trimmed.contains('{') || trimmed.contains('['))
        && (trimmed.contains("</pre>") || trimmed.contains("<pre>") || trimmed.contains("<script"))
}

/// Extract the JSON document from an HTML wrapper, returning the input unchanged
/// when it already is JSON or no JSON can be found
pub fn unwrap_json_from_html(html: &str) -> String {
    if is_json(html) {
        return html.to_string();
    }

    let document = Html::parse_document(html);

    for pre in document.select(&PRE_SELECTOR) {
        let text = pre.text().collect::<String>();
        let text = text.trim();
        if (text.starts_with('{') || text.starts_with('[')) && is_json(text) {
            tracing::debug!("Found JSON in <pre> tag");
            return text.to_string();
        }
    }

    for script in document.select(&JSON_SCRIPT_SELECTOR) {
        let text = script.text().collect::<String>();
        let text = text.trim();
        if !text.is_empty() && is_json(text) {
            tracing::debug!("Found JSON in script tag");
            return text.to_string();
        }
    }

    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        let text = body.text().collect::<String>();
        if let Some(found) = EMBEDDED_JSON.captures(text.trim()).and_then(|c| c.get(1)) {
            if is_json(found.as_str()) {
                tracing::debug!("Found JSON in body text");
                return found.as_str().to_string();
            }
        }
    }

    tracing::warn!("Could not extract JSON from HTML, returning original");
    html.to_string()
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_json_without_content_type() {
        assert_eq!(
            decode_body(None, br#"{"a":1}"#),
            ResponseBody::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_decode_invalid_json_falls_back_to_text() {
        assert_eq!(
            decode_body(Some("application/json; charset=utf-8"), b"not json"),
            ResponseBody::Text("not json".to_string())
        );
    }

    #[test]
    fn test_decode_html_stays_text() {
        assert_eq!(
            decode_body(Some("text/html"), br#"{"a":1}"#),
            ResponseBody::Text(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn test_typed_json_access() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Page {
            total: u32,
        }
        let body = decode_body(None, br#"{"total":3}"#);
        assert_eq!(body.json::<Page>(), Some(Page { total: 3 }));
        assert!(body.as_text().is_none());
    }

    #[test]
    fn test_detects_wrapped_json() {
        assert!(is_html_wrapped_json(
            r#"<html><body><pre>{"ok":true}</pre></body></html>"#
        ));
        assert!(!is_html_wrapped_json(r#"{"ok":true}"#));
        assert!(!is_html_wrapped_json("<html><body>hello</body></html>"));
    }

    #[test]
    fn test_unwrap_from_pre() {
        let html = r#"<html><head></head><body><pre>{"results":[1,2]}</pre></body></html>"#;
        assert_eq!(unwrap_json_from_html(html), r#"{"results":[1,2]}"#);
    }

    #[test]
    fn test_unwrap_from_json_script() {
        let html = r#"<html><body><div>x</div><script type="application/json">[{"id":7}]</script></body></html>"#;
        assert_eq!(unwrap_json_from_html(html), r#"[{"id":7}]"#);
    }

    #[test]
    fn test_unwrap_from_body_text() {
        let html = r#"<html><body><div>{"n": 2}</div></body></html>"#;
        assert_eq!(unwrap_json_from_html(html), r#"{"n": 2}"#);
    }

    #[test]
    fn test_unwrap_passthrough() {
        assert_eq!(unwrap_json_from_html(r#"{"a":1}"#), r#"{"a":1}"#);
        let page = "<html><body><p>blocked</p></body></html>";
        assert_eq!(unwrap_json_from_html(page), page);
    }

    #[test]
    fn test_normalize_headers_lowercases_and_joins() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", "text/plain".parse().unwrap());
        headers.append("X-Multi", "a".parse().unwrap());
        headers.append("X-Multi", "b".parse().unwrap());

        let normalized = normalize_headers(&headers);
        assert_eq!(normalized.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(normalized.get("x-multi").map(String::as_str), Some("a, b"));
    }
}
