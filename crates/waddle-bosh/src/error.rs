// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

use thiserror::Error;

/// Errors raised by the BOSH transport and the flows layered on top of it.
#[derive(Debug, Error)]
pub enum BoshError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {message}")]
    Protocol {
        /// HTTP status code, when the error comes from a non-success reply.
        status: Option<u16>,
        message: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error(
        "session terminated by server ({})",
        .condition.as_deref().unwrap_or("no condition")
    )]
    SessionTerminated { condition: Option<String> },

    #[error("no BOSH session has been negotiated")]
    NoSession,

    #[error("no supported SASL mechanism; server offers: [{}]", .0.join(", "))]
    NoSupportedMechanism(Vec<String>),

    #[error("SASL mechanism {0} is not implemented")]
    UnsupportedMechanism(String),

    #[error("authentication failed: {condition}")]
    AuthenticationFailed {
        condition: String,
        text: Option<String>,
    },

    #[error("registration rejected: {condition}")]
    RegistrationRejected { condition: String },

    #[error("ad-hoc command {node} failed: {condition}")]
    CommandFailed { node: String, condition: String },
}

impl BoshError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            status: None,
            message: msg.into(),
        }
    }

    /// Whether a caller may reasonably retry the operation on a fresh session.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BoshError::Connection(_) | BoshError::SessionTerminated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_is_non_retryable() {
        let error = BoshError::AuthenticationFailed {
            condition: "not-authorized".to_string(),
            text: None,
        };
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "authentication failed: not-authorized");
    }

    #[test]
    fn connection_errors_are_retryable() {
        assert!(BoshError::connection("refused").is_retryable());
    }

    #[test]
    fn terminated_display_includes_condition() {
        let error = BoshError::SessionTerminated {
            condition: Some("host-unknown".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "session terminated by server (host-unknown)"
        );
        let error = BoshError::SessionTerminated { condition: None };
        assert_eq!(
            error.to_string(),
            "session terminated by server (no condition)"
        );
    }

    #[test]
    fn no_supported_mechanism_lists_offers() {
        let error =
            BoshError::NoSupportedMechanism(vec!["GSSAPI".to_string(), "EXTERNAL".to_string()]);
        assert_eq!(
            error.to_string(),
            "no supported SASL mechanism; server offers: [GSSAPI, EXTERNAL]"
        );
    }
}
