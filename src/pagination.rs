//! Cursor extraction from `Link` response headers
//!
//! The log API advertises pagination through RFC 8288 style links:
//!
//! ```text
//! Link: <https://example.okta.com/api/v1/logs?limit=1000>; rel="self",
//!       <https://example.okta.com/api/v1/logs?limit=1000&after=1700000000_1>; rel="next"
//! ```
//!
//! Only the `after` query parameter of the `next` link matters. A `next` link
//! without that parameter marks the end of the data.

use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::Url;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Query parameter carrying the pagination cursor
pub const CURSOR_PARAM: &str = "after";

/// One link: the target inside `<...>` and its parameters up to the next `<`.
/// Targets may contain commas, so entries are not split on `,` first.
fn link_entry_regex() -> &'static Regex {
    static LINK_ENTRY: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    LINK_ENTRY.get_or_init(|| Regex::new(r"<([^>]*)>([^<]*)").expect("valid link regex"))
}

fn rel_param_regex() -> &'static Regex {
    static REL_PARAM: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    REL_PARAM.get_or_init(|| {
        Regex::new(r#"(?i);\s*rel\s*=\s*(?:"([^"]*)"|([^\s;,]+))"#).expect("valid rel regex")
    })
}

/// Extract the next-page cursor from the response headers.
///
/// Links may arrive in one comma-separated header or as repeated headers.
/// Returns `None` when there is no `next` link, when its URL cannot be parsed,
/// or when the URL carries no usable cursor.
pub fn next_cursor(headers: &HeaderMap) -> Option<String> {
    let next_url = headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| link_entry_regex().captures_iter(value))
        .find_map(|entry| {
            let target = entry.get(1)?.as_str();
            is_next(entry.get(2)?.as_str()).then_some(target)
        })?;

    cursor_from_url(next_url)
}

/// Whether a link's parameters carry `rel="next"`
fn is_next(params: &str) -> bool {
    rel_param_regex()
        .captures(params)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .is_some_and(|rel| {
            rel.as_str()
                .split_whitespace()
                .any(|r| r.eq_ignore_ascii_case("next"))
        })
}

fn cursor_from_url(raw: &str) -> Option<String> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            debug!(url = %raw, error = %e, "Unparsable next link, treating as last page");
            return None;
        }
    };
    trace!(next_url = %url, "Found next link");

    let cursor = url
        .query_pairs()
        .find(|(key, _)| key == CURSOR_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    if cursor.is_none() {
        debug!(next_url = %url, "Next link has no cursor, treating as last page");
    }
    cursor
}
