// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

use std::collections::HashMap;

use tracing::{info, instrument};

use crate::admin::AdminCommands;
use crate::auth::{AuthOutcome, Authenticator, DEFAULT_MAX_CHALLENGE_ROUNDS};
use crate::digest::ChallengeResponder;
use crate::disco::{self, DiscoInfo};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::jid::Identity;
use crate::register::{self, RegistrationForm, RegistrationOutcome};
use crate::session::{self, SessionInfo};
use crate::transport::{BoshTransport, TransportConfig};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub max_challenge_rounds: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            max_challenge_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }
}

/// One identity talking to one connection manager.
///
/// Wraps a [`BoshTransport`] and runs the flows in this crate against it.
/// Every operation borrows the client mutably, so at most one request is in
/// flight at a time.
pub struct BoshClient<C: HttpClient, R: ChallengeResponder> {
    transport: BoshTransport<C>,
    identity: Identity,
    password: String,
    responder: R,
    admin: AdminCommands,
    max_challenge_rounds: u32,
}

impl<C: HttpClient, R: ChallengeResponder> BoshClient<C, R> {
    pub fn new(
        http: C,
        responder: R,
        identity: Identity,
        password: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self::with_transport(
            BoshTransport::new(http, config.transport),
            responder,
            identity,
            password,
            config.max_challenge_rounds,
        )
    }

    /// Build around an existing transport, e.g. one with a fixed initial rid.
    pub fn with_transport(
        transport: BoshTransport<C>,
        responder: R,
        identity: Identity,
        password: impl Into<String>,
        max_challenge_rounds: u32,
    ) -> Self {
        Self {
            transport,
            identity,
            password: password.into(),
            responder,
            admin: AdminCommands::new(),
            max_challenge_rounds,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn transport(&self) -> &BoshTransport<C> {
        &self.transport
    }

    /// Open the endpoint and create a BOSH session.
    #[instrument(skip(self), fields(jid = %self.identity))]
    pub async fn connect(&mut self, service_url: &str) -> Result<SessionInfo, BoshError> {
        self.transport.open(service_url)?;
        session::request_session(&mut self.transport, &self.identity).await
    }

    /// SASL, stream restart, resource binding and session establishment.
    #[instrument(skip(self), fields(jid = %self.identity))]
    pub async fn authenticate(&mut self) -> AuthOutcome {
        Authenticator::new(
            &mut self.transport,
            &self.identity,
            &self.password,
            &self.responder,
        )
        .with_max_rounds(self.max_challenge_rounds)
        .authenticate()
        .await
    }

    pub async fn registration_form(&mut self) -> Result<RegistrationForm, BoshError> {
        register::discover_fields(&mut self.transport).await
    }

    /// Discover the registration fields and submit `values` for them.
    #[instrument(skip_all, fields(jid = %self.identity))]
    pub async fn register(
        &mut self,
        values: &HashMap<String, String>,
    ) -> Result<RegistrationOutcome, BoshError> {
        let form = register::discover_fields(&mut self.transport).await?;
        if form.registered {
            info!("server reports this entity as already registered");
        }
        register::submit_fields(&mut self.transport, &form, values).await
    }

    pub async fn disco_info(&mut self, node: Option<&str>) -> Result<DiscoInfo, BoshError> {
        disco::disco_info(&mut self.transport, &self.identity, node).await
    }

    pub async fn registered_users_count(&mut self) -> Result<u64, BoshError> {
        self.admin
            .registered_users_count(&mut self.transport, &self.identity)
            .await
    }

    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<(), BoshError> {
        self.admin
            .add_user(&mut self.transport, &self.identity, username, password)
            .await
    }

    /// Terminate the BOSH session. The endpoint stays open until
    /// [`close`](Self::close).
    pub async fn disconnect(&mut self) -> Result<(), BoshError> {
        session::terminate(&mut self.transport).await
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}
