//! Cookie blob parsing and request-scoped cookie handling.

use cookie::Cookie;
use reqwest::header::{HeaderMap, SET_COOKIE};

use crate::types::CookieMap;

/// Upstream session cookies that make an authentication attempt worthwhile.
pub const RECOGNIZED_COOKIES: [&str; 6] = ["ssid", "sub", "csid", "clid", "tdid", "asid"];

/// Cookie whose value the userinfo endpoint accepts in place of an access token.
pub const SESSION_TOKEN_COOKIE: &str = "ssid";

/// Parse a loosely formatted cookie blob.
///
/// Pairs are split on `;`, or on `,` when no `;` is present. Each pair is
/// `name=value` or `name:value`; whitespace and surrounding quotes are
/// trimmed. Unparseable fragments are skipped. Later duplicates win.
#[must_use]
pub fn parse_cookie_text(raw: &str) -> CookieMap {
    let cleaned: String = raw.chars().filter(|c| *c != '\r' && *c != '\n').collect();

    let parts: Box<dyn Iterator<Item = &str>> = if cleaned.contains(';') {
        Box::new(cleaned.split(';'))
    } else if cleaned.contains(',') {
        Box::new(cleaned.split(','))
    } else {
        Box::new(std::iter::once(cleaned.as_str()))
    };

    let mut cookies = CookieMap::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, value)) = part.split_once('=').or_else(|| part.split_once(':')) else {
            continue;
        };
        let name = trim_quotes(name);
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_owned(), trim_quotes(value).to_owned());
    }
    cookies
}

fn trim_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

/// Whether any cookie in `cookies` is on the [`RECOGNIZED_COOKIES`] list.
#[must_use]
pub fn has_recognized(cookies: &CookieMap) -> bool {
    RECOGNIZED_COOKIES.iter().any(|name| cookies.contains_key(*name))
}

/// Render `cookies` as a `Cookie` request header value.
#[must_use]
pub fn cookie_header(cookies: &CookieMap) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Merge every `Set-Cookie` of a response into `into`.
///
/// Malformed headers are ignored. Cookies cleared by the server (empty
/// value) are removed.
pub fn absorb_set_cookies(headers: &HeaderMap, into: &mut CookieMap) {
    for value in headers.get_all(SET_COOKIE) {
        let Ok(text) = value.to_str() else { continue };
        let Ok(parsed) = Cookie::parse(text) else {
            tracing::debug!("Ignoring malformed Set-Cookie header");
            continue;
        };
        if parsed.value().is_empty() {
            into.remove(parsed.name());
        } else {
            into.insert(parsed.name().to_owned(), parsed.value().to_owned());
        }
    }
}
