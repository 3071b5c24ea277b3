//! Per-domain cookie store.
//!
//! Only name/value pairs are kept. Attributes such as `Expires` or `Path` are
//! ignored and entries live until cleared.

use serde::{Deserialize, Serialize};

use crate::services::keyed::KeyedStore;

/// Cookie as exchanged with the bypass backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct CookieJar {
    /// Cookies per domain in the order they were first set
    domains: KeyedStore<String, Vec<CookiePair>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Cookie` header value for `domain`, `None` when nothing is stored
    pub fn cookie_header(&self, domain: &str) -> Option<String> {
        let cookies = self.domains.get(&domain.to_string())?;
        let cookies = cookies.lock();
        if cookies.is_empty() {
            return None;
        }

        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Absorb `Set-Cookie` header values (or bare `name=value` strings)
    pub fn set_cookies<I, S>(&self, domain: &str, set_cookie_headers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Vec<CookiePair> = set_cookie_headers
            .into_iter()
            .filter_map(|header| parse_set_cookie(header.as_ref()))
            .collect();
        if parsed.is_empty() {
            return;
        }

        let entry = self.domains.get_or_insert_with(&domain.to_string(), Vec::new);
        let mut cookies = entry.lock();
        for cookie in parsed {
            match cookies.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => existing.value = cookie.value,
                None => cookies.push(cookie),
            }
        }
    }

    pub fn cookie_pairs(&self, domain: &str) -> Vec<CookiePair> {
        self.domains
            .get(&domain.to_string())
            .map(|cookies| cookies.lock().clone())
            .unwrap_or_default()
    }

    pub fn has_cookie(&self, domain: &str, name: &str) -> bool {
        self.domains
            .get(&domain.to_string())
            .is_some_and(|cookies| cookies.lock().iter().any(|c| c.name == name))
    }

    pub fn clear(&self, domain: &str) {
        self.domains.remove(&domain.to_string());
    }

    pub fn clear_all(&self) {
        self.domains.clear();
    }
}

/// `name=value` from the first segment of a Set-Cookie header
fn parse_set_cookie(header: &str) -> Option<CookiePair> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    Some(CookiePair {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}
