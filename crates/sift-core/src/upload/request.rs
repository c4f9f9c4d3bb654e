//! Wire encoding of one batch for one destination.

use std::io::{self, Read, Write};

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sift_common::Event;
use sift_config::{validate_destination, Destination, ValidationError};
use thiserror::Error;

/// Errors from building a request. The batch is abandoned for that
/// destination; nothing is retried.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid destination: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress batch: {0}")]
    Compress(#[from] io::Error),
}

/// A fully built HTTP request, reused unchanged across retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Gzip-compressed JSON body.
    pub body: Vec<u8>,
    /// Account the request is addressed to; only used for logging.
    pub account_id: String,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    data: &'a [Event],
}

/// Build the delivery request for `batch` to `destination`.
///
/// The first `%s` in `url_format` is replaced by the account id.
pub fn build_request(
    batch: &[Event],
    destination: &Destination,
    url_format: &str,
) -> Result<UploadRequest, BuildError> {
    validate_destination(destination, url_format)?;

    let url = url_format.replacen("%s", &destination.account_id, 1);
    let json = serde_json::to_vec(&ListRequest { data: batch })?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let body = encoder.finish()?;

    let credentials =
        base64::engine::general_purpose::STANDARD.encode(destination.beacon_key.as_bytes());

    Ok(UploadRequest {
        method: "PUT",
        url,
        headers: vec![
            ("Authorization".to_string(), format!("Basic {}", credentials)),
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Encoding".to_string(), "gzip".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ],
        body,
        account_id: destination.account_id.clone(),
    })
}

impl UploadRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decompress and parse the body.
    pub fn decode_body(&self) -> io::Result<serde_json::Value> {
        let mut json = Vec::new();
        GzDecoder::new(self.body.as_slice()).read_to_end(&mut json)?;
        serde_json::from_slice(&json).map_err(io::Error::other)
    }

    /// Events carried by the body, in batch order.
    pub fn decode_events(&self) -> io::Result<Vec<Event>> {
        let body = self.decode_body()?;
        let data = body
            .get("data")
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        serde_json::from_value(data).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift_config::DEFAULT_SERVER_URL_FORMAT;

    fn batch() -> Vec<Event> {
        vec![
            Event::new(1, Default::default()).with_field("app_state", json!({"a": 1})),
            Event::new(2, Default::default())
                .with_user_id("u1")
                .with_field("app_state", json!({"a": 2})),
        ]
    }

    #[test]
    fn test_request_shape() {
        let request = build_request(
            &batch(),
            &Destination::new("acct", "key"),
            DEFAULT_SERVER_URL_FORMAT,
        )
        .unwrap();

        assert_eq!(request.method, "PUT");
        assert_eq!(
            request.url,
            "https://api3.siftscience.com/v3/accounts/acct/mobile_events"
        );
        // base64("key") == "a2V5"
        assert_eq!(request.header("authorization"), Some("Basic a2V5"));
        assert_eq!(request.header("Content-Encoding"), Some("gzip"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.account_id, "acct");
    }

    #[test]
    fn test_body_is_gzipped_list_request() {
        let request = build_request(&batch(), &Destination::new("a", "k"), "http://h/%s").unwrap();
        assert_eq!(&request.body[..2], &[0x1f, 0x8b]);

        let body = request.decode_body().unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][1]["user_id"], "u1");
        assert_eq!(request.decode_events().unwrap(), batch());
    }

    #[test]
    fn test_only_first_placeholder_replaced() {
        let request =
            build_request(&batch(), &Destination::new("a", "k"), "http://h/%s/x/%s").unwrap();
        assert_eq!(request.url, "http://h/a/x/%s");
    }

    #[test]
    fn test_blank_credentials_rejected() {
        let err = build_request(&batch(), &Destination::new(" ", "k"), "http://h/%s").unwrap_err();
        assert!(matches!(err, BuildError::Invalid(_)));

        let err = build_request(&batch(), &Destination::new("a", ""), "http://h/%s").unwrap_err();
        assert!(matches!(err, BuildError::Invalid(_)));

        let err = build_request(&batch(), &Destination::new("a", "k"), "").unwrap_err();
        assert!(matches!(err, BuildError::Invalid(_)));
    }
}
