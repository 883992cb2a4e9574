//! Remote state fetcher.
//!
//! `GET <url>/api/v1/chatflows` with a bearer token; the response must be a
//! JSON array of flow objects. Every request is bounded by the configured
//! timeout so one hung instance cannot stall a sweep indefinitely.

use std::io::Read;
use std::time::Duration;

use flowkeep_core::{Flow, InstanceConfig};

use crate::error::FetchError;

/// Collection endpoint, relative to the instance URL.
pub const CHATFLOWS_PATH: &str = "/api/v1/chatflows";

/// Longest response excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Source of the authoritative flow collection for an instance.
pub trait FlowSource {
    fn fetch(&self, instance: &InstanceConfig) -> Result<Vec<Flow>, FetchError>;
}

/// [`FlowSource`] talking HTTP to a live instance.
pub struct HttpFlowSource {
    agent: ureq::Agent,
}

impl HttpFlowSource {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("flowkeep/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

/// Full collection URL for an instance base URL.
pub fn chatflows_url(base: &str) -> String {
    format!("{}{CHATFLOWS_PATH}", base.trim_end_matches('/'))
}

impl FlowSource for HttpFlowSource {
    fn fetch(&self, instance: &InstanceConfig) -> Result<Vec<Flow>, FetchError> {
        let url = chatflows_url(&instance.url);
        tracing::debug!("fetching {} for instance {}", url, instance.name);

        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", instance.api_key))
            .set("Accept", "application/json")
            .call();

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(FetchError::Remote {
                    url,
                    status,
                    body: truncate_body(&body),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Transport {
                    url,
                    message: transport.to_string(),
                });
            }
        };

        // `into_string` caps bodies at 10 MB; large instances exceed that.
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|err| FetchError::Transport {
                url: url.clone(),
                message: err.to_string(),
            })?;

        decode_flows(&url, &body)
    }
}

/// Decode a collection body.
pub fn decode_flows(url: &str, body: &str) -> Result<Vec<Flow>, FetchError> {
    serde_json::from_str(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        body: truncate_body(body),
        source,
    })
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            chatflows_url("https://flowise.example.com/"),
            "https://flowise.example.com/api/v1/chatflows"
        );
        assert_eq!(
            chatflows_url("http://localhost:3000"),
            "http://localhost:3000/api/v1/chatflows"
        );
    }

    #[test]
    fn decode_rejects_non_array_bodies() {
        let err = decode_flows("u", r#"{"error":"nope"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "got: {err}");

        let err = decode_flows("u", "<html>502</html>").unwrap_err();
        assert!(err.to_string().contains("<html>"));
    }

    #[test]
    fn decode_accepts_empty_collection() {
        assert!(decode_flows("u", "[]").unwrap().is_empty());
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.len() <= MAX_ERROR_BODY + '…'.len_utf8());
        assert!(truncated.ends_with('…'));
    }
}
