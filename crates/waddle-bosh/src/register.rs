// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! In-Band Registration (XEP-0077): field discovery followed by submission.

use std::collections::HashMap;

use minidom::Element;
use tracing::{debug, info, warn};

use crate::document::{body_iq_error, find_descendant};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::stanza::{self, ns, Attributes};
use crate::transport::BoshTransport;

const DISCOVER_ID: &str = "reg1";
const SUBMIT_ID: &str = "reg2";

/// Registration form advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Field names in the order the server listed them.
    pub fields: Vec<String>,
    pub instructions: Option<String>,
    /// The server flagged the requesting entity as already registered.
    pub registered: bool,
}

impl RegistrationForm {
    fn from_query(query: &Element) -> Self {
        let mut form = RegistrationForm::default();
        for child in query.children().filter(|c| c.ns() == ns::REGISTER) {
            match child.name() {
                "instructions" => {
                    let text = child.text();
                    form.instructions = Some(text.trim().to_string()).filter(|t| !t.is_empty());
                }
                "registered" => form.registered = true,
                name => {
                    if !form.fields.iter().any(|f| f == name) {
                        form.fields.push(name.to_string());
                    }
                }
            }
        }
        form
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Discovered fields for which no value was supplied; they were sent
    /// empty.
    pub defaulted: Vec<String>,
}

/// Ask the server which fields registration requires.
pub async fn discover_fields<C: HttpClient>(
    transport: &mut BoshTransport<C>,
) -> Result<RegistrationForm, BoshError> {
    let request = stanza::iq("get", DISCOVER_ID, None, None, &stanza::register_form_request());
    let reply = transport.send_stanza(&request, &Attributes::new()).await?;

    if let Some(condition) = body_iq_error(&reply) {
        return Err(BoshError::RegistrationRejected { condition });
    }

    let query = find_descendant(&reply, "query", ns::REGISTER)
        .ok_or_else(|| BoshError::malformed("registration reply has no jabber:iq:register query"))?;
    let form = RegistrationForm::from_query(query);
    debug!(fields = ?form.fields, registered = form.registered, "registration fields");
    Ok(form)
}

/// Submit one value per discovered field. Fields missing from `values` are
/// sent as empty elements.
pub async fn submit_fields<C: HttpClient>(
    transport: &mut BoshTransport<C>,
    form: &RegistrationForm,
    values: &HashMap<String, String>,
) -> Result<RegistrationOutcome, BoshError> {
    let mut defaulted = Vec::new();
    let submitted: Vec<(&str, &str)> = form
        .fields
        .iter()
        .map(|field| match values.get(field) {
            Some(value) => (field.as_str(), value.as_str()),
            None => {
                defaulted.push(field.clone());
                (field.as_str(), "")
            }
        })
        .collect();

    if !defaulted.is_empty() {
        warn!(fields = ?defaulted, "no value supplied for registration fields, sending empty");
    }

    let request = stanza::iq("set", SUBMIT_ID, None, None, &stanza::register_query(submitted));
    let reply = transport.send_stanza(&request, &Attributes::new()).await?;

    if let Some(condition) = body_iq_error(&reply) {
        warn!(%condition, "registration rejected");
        return Err(BoshError::RegistrationRejected { condition });
    }

    info!(fields = form.fields.len(), "registration submitted");
    Ok(RegistrationOutcome { defaulted })
}
