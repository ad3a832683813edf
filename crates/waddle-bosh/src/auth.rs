// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! SASL authentication, stream restart, resource binding and session
//! establishment over a negotiated BOSH session.
//!
//! The handshake is an explicit state machine: [`Authenticator::step`] consumes
//! one [`AuthState`] and performs at most one request to produce the next.
//!
//! ```text
//! Start -> MechanismSelected -> AwaitingChallenge <-> Responding
//!       -> Authenticated | Failed
//!       -> StreamRestarted -> ResourceBound -> SessionEstablished
//! ```

use std::fmt;

use base64::prelude::*;
use minidom::Element;
use tracing::{debug, info, warn};

use crate::digest::{ChallengeRequest, ChallengeResponder};
use crate::document::{body_iq_error, find_descendant};
use crate::envelope::restart_attributes;
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::jid::Identity;
use crate::stanza::{self, ns, Attributes};
use crate::transport::BoshTransport;

/// Default cap on challenge/response rounds before the server is considered
/// misbehaving. DIGEST-MD5 needs two.
pub const DEFAULT_MAX_CHALLENGE_ROUNDS: u32 = 8;

/// Service type used in the DIGEST-MD5 digest-uri.
pub const SASL_SERVICE: &str = "xmpp";

const BIND_REQUEST_ID: &str = "bind_1";
const SESSION_REQUEST_ID: &str = "bind_2";

/// SASL mechanisms this client can drive to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    DigestMd5,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::DigestMd5 => "DIGEST-MD5",
        }
    }

    /// Pick a mechanism from the server's list.
    ///
    /// `PLAIN` is recognised but not implemented; offering only `PLAIN` fails
    /// instead of starting a handshake that cannot finish.
    pub fn select(advertised: &[String]) -> Result<Self, BoshError> {
        let offers = |name: &str| advertised.iter().any(|m| m.eq_ignore_ascii_case(name));

        if offers(Mechanism::DigestMd5.name()) {
            Ok(Mechanism::DigestMd5)
        } else if offers("PLAIN") {
            Err(BoshError::UnsupportedMechanism("PLAIN".to_string()))
        } else {
            Err(BoshError::NoSupportedMechanism(advertised.to_vec()))
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    Start,
    MechanismSelected(Mechanism),
    /// `response` is the server reply still to be inspected; `rounds` counts
    /// the responses already sent.
    AwaitingChallenge {
        response: Element,
        rounds: u32,
    },
    Responding {
        challenge: Vec<u8>,
        rounds: u32,
    },
    Authenticated,
    Failed {
        condition: String,
        text: Option<String>,
    },
    StreamRestarted,
    ResourceBound {
        resource: String,
    },
    SessionEstablished {
        resource: String,
    },
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthState::Failed { .. } | AuthState::SessionEstablished { .. }
        )
    }
}

/// Result of a complete authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Session established; `resource` is the one the server confirmed.
    Success { resource: String },
    Failure(BoshError),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    /// Whether the server rejected the credentials, as opposed to the
    /// handshake breaking down.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthOutcome::Failure(BoshError::AuthenticationFailed { .. })
        )
    }

    pub fn into_result(self) -> Result<String, BoshError> {
        match self {
            AuthOutcome::Success { resource } => Ok(resource),
            AuthOutcome::Failure(error) => Err(error),
        }
    }
}

/// Drives the handshake for one identity over one transport.
pub struct Authenticator<'a, C: HttpClient, R: ChallengeResponder> {
    transport: &'a mut BoshTransport<C>,
    identity: &'a Identity,
    password: &'a str,
    responder: &'a R,
    max_rounds: u32,
}

impl<'a, C: HttpClient, R: ChallengeResponder> Authenticator<'a, C, R> {
    pub fn new(
        transport: &'a mut BoshTransport<C>,
        identity: &'a Identity,
        password: &'a str,
        responder: &'a R,
    ) -> Self {
        Self {
            transport,
            identity,
            password,
            responder,
            max_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Run `Start -> SessionEstablished`.
    ///
    /// Credential rejection and mid-sequence transport or protocol errors both
    /// come back as [`AuthOutcome::Failure`]; the error kind tells them apart.
    pub async fn authenticate(mut self) -> AuthOutcome {
        let mut state = AuthState::Start;
        loop {
            state = match self.step(state).await {
                Ok(next) => next,
                Err(error) => {
                    warn!(%error, "authentication aborted");
                    return AuthOutcome::Failure(error);
                }
            };

            match state {
                AuthState::SessionEstablished { resource } => {
                    info!(jid = %self.identity, %resource, "XMPP session established");
                    return AuthOutcome::Success { resource };
                }
                AuthState::Failed { condition, text } => {
                    info!(jid = %self.identity, %condition, "authentication rejected");
                    return AuthOutcome::Failure(BoshError::AuthenticationFailed {
                        condition,
                        text,
                    });
                }
                _ => {}
            }
        }
    }

    /// Perform one transition. Terminal states are returned unchanged.
    pub async fn step(&mut self, state: AuthState) -> Result<AuthState, BoshError> {
        match state {
            AuthState::Start => {
                let advertised = self.transport.mechanisms().ok_or(BoshError::NoSession)?;
                let mechanism = Mechanism::select(advertised)?;
                debug!(%mechanism, "selected SASL mechanism");
                Ok(AuthState::MechanismSelected(mechanism))
            }

            AuthState::MechanismSelected(mechanism) => {
                let response = self
                    .send(&stanza::auth_request(mechanism.name()), &Attributes::new())
                    .await?;
                Ok(AuthState::AwaitingChallenge {
                    response,
                    rounds: 0,
                })
            }

            AuthState::AwaitingChallenge { response, rounds } => {
                inspect_sasl_reply(&response, rounds, self.max_rounds)
            }

            AuthState::Responding { challenge, rounds } => {
                let request = ChallengeRequest {
                    service: SASL_SERVICE,
                    host: self.identity.domain(),
                    realm: None,
                    username: self.identity.local(),
                    password: self.password,
                    challenge: &challenge,
                };
                let data = self.responder.compute(&request)?;
                let encoded = BASE64_STANDARD.encode(data);

                debug!(round = rounds + 1, "sending SASL response");
                let response = self
                    .send(&stanza::auth_response(&encoded), &Attributes::new())
                    .await?;
                Ok(AuthState::AwaitingChallenge {
                    response,
                    rounds: rounds + 1,
                })
            }

            AuthState::Authenticated => {
                debug!(to = self.identity.domain(), "restarting stream");
                self.send("", &restart_attributes(self.identity.domain()))
                    .await?;
                Ok(AuthState::StreamRestarted)
            }

            AuthState::StreamRestarted => {
                let requested = self.identity.resource();
                let reply = self
                    .send(
                        &stanza::bind_request(BIND_REQUEST_ID, requested),
                        &Attributes::new(),
                    )
                    .await?;
                if let Some(condition) = body_iq_error(&reply) {
                    return Err(BoshError::protocol(format!(
                        "resource binding failed: {condition}"
                    )));
                }

                let resource = bound_resource(&reply).unwrap_or_else(|| requested.to_string());
                if resource != requested {
                    debug!(%requested, bound = %resource, "server assigned a different resource");
                }
                Ok(AuthState::ResourceBound { resource })
            }

            AuthState::ResourceBound { resource } => {
                let reply = self
                    .send(
                        &stanza::session_request(SESSION_REQUEST_ID),
                        &Attributes::new(),
                    )
                    .await?;
                if let Some(condition) = body_iq_error(&reply) {
                    return Err(BoshError::protocol(format!(
                        "session establishment failed: {condition}"
                    )));
                }
                Ok(AuthState::SessionEstablished { resource })
            }

            terminal @ (AuthState::Failed { .. } | AuthState::SessionEstablished { .. }) => {
                Ok(terminal)
            }
        }
    }

    async fn send(&mut self, inner: &str, extra: &Attributes) -> Result<Element, BoshError> {
        self.transport.send_stanza(inner, extra).await
    }
}

/// Classify the reply to `<auth>` or to the `rounds`-th `<response>`.
///
/// `<success>` is only accepted after at least one challenge was answered.
fn inspect_sasl_reply(
    response: &Element,
    rounds: u32,
    max_rounds: u32,
) -> Result<AuthState, BoshError> {
    if let Some(challenge) = find_descendant(response, "challenge", ns::SASL) {
        if rounds >= max_rounds {
            return Err(BoshError::protocol(format!(
                "server sent more than {max_rounds} SASL challenges"
            )));
        }
        let text = challenge.text();
        let challenge = BASE64_STANDARD
            .decode(text.trim())
            .map_err(|e| BoshError::malformed(format!("challenge is not base64: {e}")))?;
        return Ok(AuthState::Responding { challenge, rounds });
    }

    if find_descendant(response, "success", ns::SASL).is_some() {
        if rounds == 0 {
            return Err(BoshError::malformed(
                "SASL success before any challenge was answered",
            ));
        }
        debug!(rounds, "SASL authentication succeeded");
        return Ok(AuthState::Authenticated);
    }

    if let Some(failure) = find_descendant(response, "failure", ns::SASL) {
        let condition = failure
            .children()
            .find(|c| c.name() != "text")
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "not-authorized".to_string());
        let text = failure
            .children()
            .find(|c| c.name() == "text")
            .map(Element::text)
            .filter(|t| !t.is_empty());
        return Ok(AuthState::Failed { condition, text });
    }

    Err(BoshError::protocol(
        "expected a SASL challenge, success or failure",
    ))
}

/// Resource part of the JID in a bind result, if the server returned one.
fn bound_resource(reply: &Element) -> Option<String> {
    let jid = find_descendant(reply, "bind", ns::BIND)?.get_child("jid", ns::BIND)?;
    jid.text()
        .split_once('/')
        .map(|(_, resource)| resource.to_string())
        .filter(|resource| !resource.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    fn parse(xml: &str) -> Element {
        document::parse(xml.as_bytes()).unwrap()
    }

    fn offers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn prefers_digest_md5() {
        assert_eq!(
            Mechanism::select(&offers(&["PLAIN", "DIGEST-MD5"])).unwrap(),
            Mechanism::DigestMd5
        );
    }

    #[test]
    fn plain_only_fails_fast() {
        assert!(matches!(
            Mechanism::select(&offers(&["PLAIN"])),
            Err(BoshError::UnsupportedMechanism(m)) if m == "PLAIN"
        ));
    }

    #[test]
    fn nothing_usable_is_no_supported_mechanism() {
        assert!(matches!(
            Mechanism::select(&offers(&["SCRAM-SHA-1", "EXTERNAL"])),
            Err(BoshError::NoSupportedMechanism(list)) if list.len() == 2
        ));
        assert!(matches!(
            Mechanism::select(&[]),
            Err(BoshError::NoSupportedMechanism(_))
        ));
    }

    #[test]
    fn mechanism_display() {
        assert_eq!(Mechanism::DigestMd5.to_string(), "DIGEST-MD5");
    }

    #[test]
    fn bound_resource_reads_server_jid() {
        let reply = parse(
            "<body xmlns='http://jabber.org/protocol/httpbind'>\
             <iq type='result' id='bind_1' xmlns='jabber:client'>\
             <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
             <jid>essai@debian/web-4f2a</jid></bind></iq></body>",
        );
        assert_eq!(bound_resource(&reply).as_deref(), Some("web-4f2a"));
    }

    #[test]
    fn bound_resource_absent_without_jid() {
        let reply = parse(
            "<body xmlns='http://jabber.org/protocol/httpbind'>\
             <iq type='result' id='bind_1' xmlns='jabber:client'/></body>",
        );
        assert_eq!(bound_resource(&reply), None);
    }

    const SASL_BODY: &str = "<body xmlns='http://jabber.org/protocol/httpbind'>";

    #[test]
    fn success_needs_an_answered_challenge() {
        let reply = parse(&format!(
            "{SASL_BODY}<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/></body>"
        ));
        assert!(matches!(
            inspect_sasl_reply(&reply, 0, 8),
            Err(BoshError::MalformedResponse(_))
        ));
        assert!(matches!(
            inspect_sasl_reply(&reply, 1, 8),
            Ok(AuthState::Authenticated)
        ));
    }

    #[test]
    fn reply_without_sasl_element_is_protocol_error() {
        let reply = parse(&format!("{SASL_BODY}</body>"));
        assert!(matches!(
            inspect_sasl_reply(&reply, 1, 8),
            Err(BoshError::Protocol { .. })
        ));
    }

    #[test]
    fn failure_reads_condition_and_text() {
        let reply = parse(&format!(
            "{SASL_BODY}<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
             <text>bad password</text><not-authorized/></failure></body>"
        ));
        match inspect_sasl_reply(&reply, 0, 8).unwrap() {
            AuthState::Failed { condition, text } => {
                assert_eq!(condition, "not-authorized");
                assert_eq!(text.as_deref(), Some("bad password"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn outcome_classification() {
        let rejected = AuthOutcome::Failure(BoshError::AuthenticationFailed {
            condition: "not-authorized".to_string(),
            text: None,
        });
        assert!(rejected.is_rejection());
        assert!(!rejected.is_success());

        let broken = AuthOutcome::Failure(BoshError::connection("reset"));
        assert!(!broken.is_rejection());

        let ok = AuthOutcome::Success {
            resource: "web".to_string(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.into_result().unwrap(), "web");
    }

    #[test]
    fn terminal_states() {
        assert!(AuthState::SessionEstablished {
            resource: "r".to_string()
        }
        .is_terminal());
        assert!(AuthState::Failed {
            condition: "not-authorized".to_string(),
            text: None
        }
        .is_terminal());
        assert!(!AuthState::Start.is_terminal());
        assert!(!AuthState::Authenticated.is_terminal());
    }
}
