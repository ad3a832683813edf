// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! BOSH session creation (XEP-0124 §7) and termination.
//!
//! ## Protocol Flow
//!
//! 1. Client sends the session creation request (no `sid` yet):
//!    ```xml
//!    <body rid='1573741820' xmlns='http://jabber.org/protocol/httpbind'
//!          to='example.com' wait='60' hold='1' window='5' ver='1.6'
//!          xmpp:version='1.0' xmlns:xmpp='urn:xmpp:xbosh'/>
//!    ```
//!
//! 2. Connection manager answers with the session id and stream features:
//!    ```xml
//!    <body sid='SomeSID' wait='60' authid='ServerStreamID'
//!          xmlns='http://jabber.org/protocol/httpbind'>
//!      <stream:features xmlns:stream='http://etherx.jabber.org/streams'>
//!        <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>
//!          <mechanism>DIGEST-MD5</mechanism>
//!        </mechanisms>
//!      </stream:features>
//!    </body>
//!    ```

use minidom::Element;
use tracing::{debug, info, warn};

use crate::document::find_descendant;
use crate::envelope::{self, terminate_attributes};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::jid::Identity;
use crate::stanza::{self, ns};
use crate::transport::BoshTransport;

/// Mechanism assumed when the server does not advertise any.
pub const FALLBACK_MECHANISM: &str = "DIGEST-MD5";

/// Where the recorded mechanism list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismSource {
    /// Listed by the server in its stream features.
    Advertised,
    /// No `<mechanisms>` element was present; [`FALLBACK_MECHANISM`] is
    /// assumed for compatibility with older connection managers.
    Fallback,
}

/// Parameters of a freshly created BOSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub wait_seconds: Option<u32>,
    pub auth_id: Option<String>,
    pub mechanisms: Vec<String>,
    pub mechanism_source: MechanismSource,
}

impl SessionInfo {
    /// Parse the connection manager's reply to a session creation request.
    pub fn from_response(body: &Element) -> Result<Self, BoshError> {
        if body.attr("type") == Some("terminate") {
            return Err(BoshError::SessionTerminated {
                condition: body.attr("condition").map(str::to_string),
            });
        }

        let session_id = body
            .attr("sid")
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| BoshError::malformed("session creation response has no sid"))?
            .to_string();

        let wait_seconds = body
            .attr("wait")
            .map(|wait| {
                wait.trim().parse::<u32>().map_err(|_| {
                    BoshError::malformed(format!("invalid wait attribute {wait:?}"))
                })
            })
            .transpose()?;

        let auth_id = body.attr("authid").map(str::to_string);

        let (mechanisms, mechanism_source) = match find_descendant(body, "mechanisms", ns::SASL) {
            Some(list) => (
                list.children()
                    .filter(|child| child.is("mechanism", ns::SASL))
                    .map(|child| child.text().trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect(),
                MechanismSource::Advertised,
            ),
            None => (
                vec![FALLBACK_MECHANISM.to_string()],
                MechanismSource::Fallback,
            ),
        };

        Ok(Self {
            session_id,
            wait_seconds,
            auth_id,
            mechanisms,
            mechanism_source,
        })
    }
}

/// Create a BOSH session for `identity`'s domain and record it on the
/// transport.
pub async fn request_session<C: HttpClient>(
    transport: &mut BoshTransport<C>,
    identity: &Identity,
) -> Result<SessionInfo, BoshError> {
    if transport.mechanisms().is_some() {
        return Err(BoshError::protocol(
            "a BOSH session is already established on this transport",
        ));
    }

    let policy = transport.config().policy;
    let body = envelope::session_request(transport.rid(), identity.domain(), &policy);
    debug!(to = identity.domain(), "requesting BOSH session");

    let response = transport.send(&body).await?;
    let info = SessionInfo::from_response(&response)?;

    if info.mechanism_source == MechanismSource::Fallback {
        warn!(
            mechanism = FALLBACK_MECHANISM,
            "server did not advertise SASL mechanisms, assuming fallback"
        );
    }

    transport.record_session(
        info.session_id.clone(),
        info.wait_seconds,
        info.auth_id.clone(),
        info.mechanisms.clone(),
    )?;

    info!(
        sid = %info.session_id,
        wait = ?info.wait_seconds,
        mechanisms = ?info.mechanisms,
        "BOSH session established"
    );
    Ok(info)
}

/// Gracefully end the session with an unavailable presence and
/// `type='terminate'`. The transport stays open; call `close` afterwards.
pub async fn terminate<C: HttpClient>(transport: &mut BoshTransport<C>) -> Result<(), BoshError> {
    if !transport.has_session() {
        return Ok(());
    }

    debug!(sid = ?transport.sid(), "terminating BOSH session");
    let result = transport
        .send_stanza(&stanza::presence_unavailable(), &terminate_attributes())
        .await;
    transport.clear_session();
    result.map(|_| ())
}
