// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Client identity: a `local@domain` account plus the resource it binds.

use std::fmt;

use ::jid::FullJid;

use crate::error::BoshError;

/// An XMPP account identifier split into its three parts.
///
/// Immutable once parsed; the resource requested at bind time may differ from
/// the one the server confirms, which is tracked by the authenticator instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    local: String,
    domain: String,
    resource: String,
}

impl Identity {
    /// Parse `raw` (which must be `local@domain`, without a resource) and
    /// attach `resource`.
    pub fn parse(raw: &str, resource: &str) -> Result<Self, BoshError> {
        let mut parts = raw.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(BoshError::MalformedIdentifier(format!(
                "expected exactly one '@' in {raw:?}"
            )));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(BoshError::MalformedIdentifier(format!(
                "empty local part or domain in {raw:?}"
            )));
        }
        if resource.is_empty() {
            return Err(BoshError::MalformedIdentifier(
                "resource cannot be empty".to_string(),
            ));
        }

        FullJid::new(&format!("{local}@{domain}/{resource}"))
            .map_err(|e| BoshError::MalformedIdentifier(format!("{raw:?}: {e}")))?;

        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
            resource: resource.to_string(),
        })
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `local@domain`
    pub fn bare(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }

    /// `local@domain/resource`
    pub fn full(&self) -> String {
        format!("{}@{}/{}", self.local, self.domain, self.resource)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}
