// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! # waddle-bosh
//!
//! XMPP client over BOSH (XEP-0124/XEP-0206) for Waddle Social.
//!
//! The crate opens a BOSH session with a connection manager and carries the
//! XMPP handshake inside it:
//!
//! - **Transport**: rid/sid sequencing, `<body>` wrapping and one HTTP POST
//!   per request, behind the [`HttpClient`] trait
//! - **Session negotiation**: session creation and SASL mechanism discovery
//! - **Authentication**: DIGEST-MD5 state machine, stream restart, resource
//!   binding and session establishment
//! - **Flows**: in-band registration (XEP-0077), service administration
//!   commands (XEP-0050/XEP-0133) and `disco#info` (XEP-0030)
//!
//! Everything is strictly request/response. There is no background polling
//! and no retry; one request is outstanding per transport at a time.

pub mod admin;
pub mod auth;
pub mod client;
pub mod digest;
pub mod disco;
pub mod document;
pub mod envelope;
pub mod http;
pub mod jid;
pub mod register;
pub mod session;
pub mod stanza;
pub mod transport;

mod error;

pub use admin::AdminCommands;
pub use auth::{AuthOutcome, AuthState, Authenticator, Mechanism};
pub use client::{BoshClient, ClientConfig};
pub use digest::{ChallengeRequest, ChallengeResponder, DigestMd5};
pub use disco::{protocol_node, DiscoIdentity, DiscoInfo};
pub use envelope::SessionPolicy;
pub use error::BoshError;
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use jid::Identity;
pub use register::{RegistrationForm, RegistrationOutcome};
pub use session::{MechanismSource, SessionInfo};
pub use transport::{BoshTransport, TransportConfig};
