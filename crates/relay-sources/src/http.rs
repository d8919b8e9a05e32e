use std::time::Duration;

use relay_core::{errors::Error, source::FetchError, Result};
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::de::DeserializeOwned;

const BODY_SNIPPET: usize = 200;

pub(crate) fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(concat!("content-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::External(format!("http client build failed: {e}")))
}

pub(crate) fn network(e: reqwest::Error) -> FetchError {
    FetchError::Network(e.to_string())
}

/// Check the status and decode the body as `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> std::result::Result<T, FetchError> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited { retry_after });
    }

    let body = resp.text().await.map_err(network)?;
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            body: snippet(&body),
        });
    }
    decode(&body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> std::result::Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug)]
    struct Ack {
        ok: bool,
    }

    fn response(status: u16, retry_after: Option<&str>, body: &'static str) -> Response {
        let mut builder = ::http::Response::builder().status(status);
        if let Some(v) = retry_after {
            builder = builder.header("Retry-After", v);
        }
        Response::from(builder.body(body).unwrap())
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let err = read_json::<Ack>(response(429, Some("7"), "")).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));

        let err = read_json::<Ack>(response(429, Some("soon"), "")).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { retry_after: None }));
    }

    #[tokio::test]
    async fn error_statuses_keep_a_body_snippet() {
        let err = read_json::<Ack>(response(500, None, "upstream exploded"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Status { status: 500, ref body } if body == "upstream exploded"
        ));
    }

    #[tokio::test]
    async fn success_decodes_body() {
        let ack = read_json::<Ack>(response(200, None, r#"{"ok":true}"#)).await.unwrap();
        assert!(ack.ok);
    }

    #[test]
    fn decode_failures_are_malformed() {
        let err = decode::<Ack>("<html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert!(decode::<Ack>(r#"{"ok":true}"#).unwrap().ok);
    }

    #[test]
    fn snippet_is_char_bounded() {
        let long = "é".repeat(500);
        assert_eq!(snippet(&long).chars().count(), 200);
    }
}
