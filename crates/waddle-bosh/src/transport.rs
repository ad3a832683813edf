// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! BOSH transport session.
//!
//! Owns the request id counter, the server-assigned session id and the HTTP
//! handle. One request is outstanding at a time; every sending method takes
//! `&mut self`.

use std::time::Duration;

use minidom::Element;
use rand::Rng;
use tracing::{debug, warn};
use url::Url;

use crate::document;
use crate::envelope::{self, SessionPolicy};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::stanza::Attributes;

/// Headers sent with every request. The content type must match exactly;
/// some connection managers compare it byte for byte.
pub const REQUEST_HEADERS: [(&str, &str); 2] = [
    ("Content-Type", "text/xml; charset=utf-8"),
    ("Accept", "text/xml"),
];

/// Upper bound (exclusive) for the randomly chosen initial request id.
const INITIAL_RID_RANGE: u64 = 10_000_000;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Policy sent in the session creation request.
    pub policy: SessionPolicy,
    /// Added on top of the long-poll wait to obtain the per-request deadline.
    pub timeout_margin: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            timeout_margin: Duration::from_secs(10),
        }
    }
}

/// Session parameters recorded from the connection manager's reply.
#[derive(Debug, Clone, Default)]
struct SessionState {
    sid: Option<String>,
    wait: Option<u32>,
    auth_id: Option<String>,
    mechanisms: Option<Vec<String>>,
}

pub struct BoshTransport<C: HttpClient> {
    client: C,
    config: TransportConfig,
    endpoint: Option<Url>,
    rid: u64,
    session: SessionState,
}

impl<C: HttpClient> BoshTransport<C> {
    pub fn new(client: C, config: TransportConfig) -> Self {
        let rid = rand::rng().random_range(0..INITIAL_RID_RANGE);
        debug!(rid, "initial BOSH request id");
        Self::with_rid(client, config, rid)
    }

    /// Start the request counter at a known value.
    pub fn with_rid(client: C, config: TransportConfig, rid: u64) -> Self {
        Self {
            client,
            config,
            endpoint: None,
            rid,
            session: SessionState::default(),
        }
    }

    /// Resolve the connection manager endpoint and make the transport usable.
    pub fn open(&mut self, service_url: &str) -> Result<(), BoshError> {
        let url = Url::parse(service_url)
            .map_err(|e| BoshError::connection(format!("invalid BOSH service URL: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(BoshError::connection(format!(
                "unsupported scheme {:?} for BOSH service",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(BoshError::connection(
                "BOSH service URL has no host".to_string(),
            ));
        }

        debug!(endpoint = %url, "opening BOSH transport");
        self.endpoint = Some(url);
        Ok(())
    }

    /// Release the endpoint. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            debug!(%endpoint, "closed BOSH transport");
        }
    }

    pub fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Request id that the next envelope will carry.
    pub fn rid(&self) -> u64 {
        self.rid
    }

    pub fn sid(&self) -> Option<&str> {
        self.session.sid.as_deref()
    }

    pub fn wait(&self) -> Option<u32> {
        self.session.wait
    }

    pub fn auth_id(&self) -> Option<&str> {
        self.session.auth_id.as_deref()
    }

    /// Mechanisms recorded at session creation, `None` before negotiation.
    pub fn mechanisms(&self) -> Option<&[String]> {
        self.session.mechanisms.as_deref()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Deadline for a single request: the server may hold a request for up to
    /// `wait` seconds, so the deadline is always strictly longer than that.
    pub fn request_timeout(&self) -> Duration {
        let wait = self.session.wait.unwrap_or(self.config.policy.wait);
        Duration::from_secs(u64::from(wait)) + self.config.timeout_margin.max(Duration::from_secs(1))
    }

    /// Wrap `inner` with the current rid and sid.
    pub fn envelope(&self, inner: &str, extra: &Attributes) -> Result<String, BoshError> {
        let sid = self.session.sid.as_deref().ok_or(BoshError::NoSession)?;
        Ok(envelope::wrap(self.rid, Some(sid), inner, extra))
    }

    /// Wrap and send a stanza within the negotiated session.
    pub async fn send_stanza(
        &mut self,
        inner: &str,
        extra: &Attributes,
    ) -> Result<Element, BoshError> {
        let body = self.envelope(inner, extra)?;
        self.send(&body).await
    }

    /// Send a complete `<body>` and parse the reply.
    ///
    /// The request id advances by one whenever a request actually goes out,
    /// whether or not it succeeds.
    pub async fn send(&mut self, body: &str) -> Result<Element, BoshError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| BoshError::connection("BOSH transport is not open"))?;

        let deadline = self.request_timeout();
        debug!(rid = self.rid, bytes = body.len(), "sending BOSH request");

        let result = tokio::time::timeout(
            deadline,
            self.client
                .post(endpoint.as_str(), &REQUEST_HEADERS, body.to_string()),
        )
        .await;
        self.rid += 1;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(%error, "BOSH request failed");
                return Err(BoshError::connection(error.to_string()));
            }
            Err(_) => {
                warn!(timeout_secs = deadline.as_secs(), "BOSH request timed out");
                return Err(BoshError::connection(format!(
                    "no response within {}s",
                    deadline.as_secs()
                )));
            }
        };

        debug!(status = response.status, bytes = response.body.len(), "BOSH response");
        if !response.is_success() {
            return Err(BoshError::Protocol {
                status: Some(response.status),
                message: format!("connection manager returned HTTP {}", response.status),
            });
        }

        document::parse(&response.body)
    }

    /// Record the session parameters from the creation response.
    pub(crate) fn record_session(
        &mut self,
        sid: String,
        wait: Option<u32>,
        auth_id: Option<String>,
        mechanisms: Vec<String>,
    ) -> Result<(), BoshError> {
        if self.session.mechanisms.is_some() {
            return Err(BoshError::protocol(
                "a BOSH session is already established on this transport",
            ));
        }
        self.session = SessionState {
            sid: Some(sid),
            wait,
            auth_id,
            mechanisms: Some(mechanisms),
        };
        Ok(())
    }

    pub(crate) fn has_session(&self) -> bool {
        self.session.sid.is_some()
    }

    pub(crate) fn clear_session(&mut self) {
        self.session.sid = None;
    }
}

impl<C: HttpClient> Drop for BoshTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}
