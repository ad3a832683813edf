// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! HTTP capability consumed by the BOSH transport.
//!
//! The transport only ever issues `POST`s to a single endpoint, so the trait
//! exposes exactly that. Implementations own TLS, pooling and DNS.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A minimal async HTTP client for POST requests.
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> impl Future<Output = Result<HttpResponse, Self::Error>> + Send;
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error type for the reqwest-based HTTP client.
#[derive(Debug, Error)]
#[error("HTTP request failed: {0}")]
pub struct ReqwestHttpError(#[from] reqwest::Error);

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with a connect timeout. Request deadlines are applied by the
    /// transport, which knows the negotiated long-poll wait.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, ReqwestHttpError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestHttpClient {
    type Error = ReqwestHttpError;

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, Self::Error> {
        let mut builder = self.inner.post(url);
        for &(name, value) in headers {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(HttpResponse::ok("").is_success());
        assert!(HttpResponse {
            status: 204,
            body: Vec::new()
        }
        .is_success());
        assert!(!HttpResponse {
            status: 404,
            body: Vec::new()
        }
        .is_success());
    }
}
