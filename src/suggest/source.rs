use crate::error::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Remote query-suggestion collaborator.
pub trait SuggestionSource {
    fn fetch(&self, query: &str) -> Result<Vec<String>>;
}

/// Suggestion endpoint speaking the common completion format: a 2-element
/// JSON array whose second element is the candidate list.
pub struct HttpSuggestionSource {
    endpoint: String,
    timeout: Duration,
}

impl HttpSuggestionSource {
    /// `endpoint` is a URL template; `{}` is replaced with the encoded query.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl SuggestionSource for HttpSuggestionSource {
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = self
            .endpoint
            .replace("{}", &urlencoding::encode(query));
        debug!("Fetching suggestions for '{}'", query);

        let response = ureq::get(&url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| Error::Network(e.to_string()))?;
        let payload: Value = response.into_json()?;

        Ok(parse_suggestion_payload(&payload))
    }
}

/// Extract candidates from `["query", ["suggestion1", ...], ...]`. Anything
/// that does not match that shape yields no candidates.
pub fn parse_suggestion_payload(value: &Value) -> Vec<String> {
    let Some(array) = value.as_array() else {
        return Vec::new();
    };

    if array.len() < 2 {
        return Vec::new();
    }

    let Some(candidates) = array[1].as_array() else {
        return Vec::new();
    };

    candidates
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_well_formed_payload() {
        let payload = json!(["rust", ["rust lang", "rust book", "rustup"]]);
        assert_eq!(
            parse_suggestion_payload(&payload),
            vec!["rust lang", "rust book", "rustup"]
        );
    }

    #[test]
    fn test_parse_ignores_extra_elements() {
        let payload = json!(["q", ["a"], [], {"meta": true}]);
        assert_eq!(parse_suggestion_payload(&payload), vec!["a"]);
    }

    #[test]
    fn test_parse_malformed_payloads() {
        assert!(parse_suggestion_payload(&json!({"not": "an array"})).is_empty());
        assert!(parse_suggestion_payload(&json!(["only one element"])).is_empty());
        assert!(parse_suggestion_payload(&json!(["q", "not a list"])).is_empty());
        assert!(parse_suggestion_payload(&json!(null)).is_empty());
    }

    #[test]
    fn test_parse_skips_non_string_candidates() {
        let payload = json!(["q", ["ok", 42, null, "also ok"]]);
        assert_eq!(parse_suggestion_payload(&payload), vec!["ok", "also ok"]);
    }
}
