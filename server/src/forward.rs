//! Hand-off of authorized requests to the data-access backend.

use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING},
    },
    response::{IntoResponse, Response},
};
use platform_authz::Role;
use thiserror::Error;

pub const RESOLVED_ROLE_HEADER: HeaderName = HeaderName::from_static("x-resolved-role");

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replay `request` against the backend. The caller's credential is
    /// dropped; the resolved role travels in [`RESOLVED_ROLE_HEADER`].
    pub async fn forward(
        &self,
        role: &Role,
        request: Request,
        body_limit: usize,
    ) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let payload = to_bytes(body, body_limit)
            .await
            .map_err(|_| ForwardError::BodyTooLarge { limit: body_limit })?;
        let target = format!(
            "{}{}",
            self.base_url,
            parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );

        let mut headers = strip_headers(parts.headers, &[AUTHORIZATION, HOST]);
        if let Ok(value) = HeaderValue::from_str(role.as_str()) {
            headers.insert(RESOLVED_ROLE_HEADER, value);
        }

        tracing::debug!(%role, method = %parts.method, %target, "forwarding to upstream");
        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(payload)
            .send()
            .await?;

        let status = upstream.status();
        let upstream_headers = strip_headers(upstream.headers().clone(), &[]);
        let bytes = upstream.bytes().await?;

        let mut response = (status, Body::from(bytes)).into_response();
        response.headers_mut().remove(CONTENT_TYPE);
        for (name, value) in upstream_headers.iter() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        Ok(response)
    }
}

/// Drop hop-by-hop headers plus any names in `extra`.
fn strip_headers(mut headers: HeaderMap, extra: &[HeaderName]) -> HeaderMap {
    for name in [CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING]
        .iter()
        .chain(extra)
    {
        headers.remove(name);
    }
    headers
}
