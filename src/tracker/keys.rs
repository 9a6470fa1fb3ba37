//! Key layout shared with any data already sitting in the store.
//!
//!   counter  api:calls:<endpoint>:<method>
//!   ledger   api:calls:timestamps:<endpoint>:<method>

use std::collections::BTreeSet;

pub const COUNTER_PREFIX: &str = "api:calls:";
pub const LEDGER_PREFIX: &str = "api:calls:timestamps:";

const DELIMITER: char = ':';

/// `api`, `calls`, at least one endpoint segment, method.
const MIN_SEGMENTS: usize = 4;

pub fn counter_key(endpoint: &str, method: &str) -> String {
    format!("{COUNTER_PREFIX}{endpoint}:{method}")
}

pub fn ledger_key(endpoint: &str, method: &str) -> String {
    format!("{LEDGER_PREFIX}{endpoint}:{method}")
}

/// Prefix under which every counter of `endpoint` lives.
pub fn endpoint_counter_prefix(endpoint: &str) -> String {
    format!("{COUNTER_PREFIX}{endpoint}:")
}

pub fn endpoint_ledger_prefix(endpoint: &str) -> String {
    format!("{LEDGER_PREFIX}{endpoint}:")
}

pub fn is_ledger_key(key: &str) -> bool {
    key.starts_with(LEDGER_PREFIX)
}

/// Splits a counter key into `(endpoint, method)`.
///
/// The method is the last segment; everything between `api:calls:` and the
/// method is the endpoint, so endpoints containing `:` survive. Returns
/// `None` for ledger keys and for keys with too few segments.
pub fn parse_counter_key(key: &str) -> Option<(String, String)> {
    if is_ledger_key(key) {
        return None;
    }
    let segments: Vec<&str> = key.split(DELIMITER).collect();
    if segments.len() < MIN_SEGMENTS || segments[0] != "api" || segments[1] != "calls" {
        return None;
    }
    let (method, endpoint) = segments[2..].split_last()?;
    if method.is_empty() {
        return None;
    }
    Some((endpoint.join(":"), (*method).to_owned()))
}

/// Methods recorded directly under `prefix`.
///
/// Keys whose remainder still contains the delimiter belong to a longer
/// endpoint that happens to share the prefix (`/a` vs `/a:b`).
pub fn methods_under<'a>(
    prefix: &str,
    keys: impl IntoIterator<Item = &'a String>,
) -> BTreeSet<String> {
    keys.into_iter()
        .filter_map(|k| k.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty() && !rest.contains(DELIMITER))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(counter_key("/users", "GET"), "api:calls:/users:GET");
        assert_eq!(
            ledger_key("/users", "GET"),
            "api:calls:timestamps:/users:GET"
        );
    }

    #[test]
    fn parses_counter_keys() {
        assert_eq!(
            parse_counter_key("api:calls:/users:POST"),
            Some(("/users".into(), "POST".into()))
        );
        assert_eq!(
            parse_counter_key("api:calls:/v1:items:GET"),
            Some(("/v1:items".into(), "GET".into()))
        );
    }

    #[test]
    fn skips_ledger_and_short_keys() {
        assert_eq!(parse_counter_key("api:calls:timestamps:/users:GET"), None);
        assert_eq!(parse_counter_key("api:calls:GET"), None);
        assert_eq!(parse_counter_key("api:calls:/x:"), None);
        assert_eq!(parse_counter_key("session:abc:def:ghi"), None);
    }

    #[test]
    fn methods_under_ignores_longer_endpoints() {
        let keys = vec![
            "api:calls:/a:GET".to_string(),
            "api:calls:/a:PATCH".to_string(),
            "api:calls:/a:b:GET".to_string(),
        ];
        let methods = methods_under(&endpoint_counter_prefix("/a"), &keys);
        assert_eq!(
            methods.into_iter().collect::<Vec<_>>(),
            vec!["GET".to_string(), "PATCH".to_string()]
        );
    }
}
