use std::collections::BTreeMap;

pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Host` value for an origin, omitting the scheme's default port.
pub(crate) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match (parsed.port(), parsed.scheme()) {
        (Some(80), "http") | (Some(443), "https") | (None, _) => Some(host.to_string()),
        (Some(port), _) => Some(format!("{host}:{port}")),
    }
}

/// Origin-form request target (`/path?query`).
pub(crate) fn request_target(parsed: &url::Url) -> String {
    match parsed.query() {
        Some(q) => format!("{}?{q}", parsed.path()),
        None => parsed.path().to_string(),
    }
}

/// Lowercases names and joins repeated headers with ", ".
pub(crate) fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}

pub(crate) fn wants_close(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(http::header::CONNECTION)
        .iter()
        .any(|v| v.as_bytes().eq_ignore_ascii_case(b"close"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).unwrap_or_else(|e| panic!("bad url {s}: {e}"))
    }

    #[test]
    fn host_header_skips_default_ports() {
        assert_eq!(
            host_header_value(&url("http://api.local/x")).as_deref(),
            Some("api.local")
        );
        assert_eq!(
            host_header_value(&url("https://api.local:8443/x")).as_deref(),
            Some("api.local:8443")
        );
        assert_eq!(
            host_header_value(&url("https://api.local:80/x")).as_deref(),
            Some("api.local:80")
        );
    }

    #[test]
    fn request_target_keeps_query() {
        assert_eq!(request_target(&url("http://h/v1/testes?a=1")), "/v1/testes?a=1");
        assert_eq!(request_target(&url("http://h")), "/");
    }

    #[test]
    fn merged_headers_are_lowercased_and_joined() {
        let mut map = http::HeaderMap::new();
        map.append("X-Tag", http::HeaderValue::from_static("a"));
        map.append("x-tag", http::HeaderValue::from_static("b"));
        map.append("Connection", http::HeaderValue::from_static("Close"));

        let merged = merge_headers(&map);
        assert!(merged.contains(&("x-tag".to_string(), "a, b".to_string())));
        assert!(wants_close(&map));
    }
}
