// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Service Administration (XEP-0133) over Ad-Hoc Commands (XEP-0050).
//!
//! Commands are data: an ordered attribute set for the `<iq>` and one for
//! the `<command>`. Adding a command means adding a node constant and a
//! result parser, not a new stanza builder.

use std::collections::HashMap;

use minidom::Element;
use tracing::{debug, info};

use crate::document::{body_iq_error, find_descendant};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::jid::Identity;
use crate::stanza::{self, ns, Attributes};
use crate::transport::BoshTransport;

pub const NODE_GET_REGISTERED_USERS_NUM: &str =
    "http://jabber.org/protocol/admin#get-registered-users-num";
pub const NODE_ADD_USER: &str = "http://jabber.org/protocol/admin#add-user";

const FIELD_REGISTERED_USERS_NUM: &str = "registeredusersnum";

/// Short command name used in request ids, e.g. `add-user-1`.
fn command_name(node: &str) -> &str {
    node.rsplit_once('#').map_or(node, |(_, name)| name)
}

/// Issues administrative commands and owns the per-command request counters.
#[derive(Debug, Default)]
pub struct AdminCommands {
    counters: HashMap<String, u64>,
}

impl AdminCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next request id for `name`: `"<name>-<n>"`, with `n` starting at 1.
    pub fn next_id(&mut self, name: &str) -> String {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        format!("{name}-{counter}")
    }

    /// `<iq>` attributes for a command addressed to the identity's domain.
    pub fn iq_attributes(&mut self, identity: &Identity, node: &str) -> Attributes {
        Attributes::new()
            .with("from", identity.full())
            .with("id", self.next_id(command_name(node)))
            .with("to", identity.domain())
            .with("type", "set")
            .with("xml:lang", "en")
    }

    /// XEP-0133 §4.19: number of registered users on the domain.
    pub async fn registered_users_count<C: HttpClient>(
        &mut self,
        transport: &mut BoshTransport<C>,
        identity: &Identity,
    ) -> Result<u64, BoshError> {
        let node = NODE_GET_REGISTERED_USERS_NUM;
        let command = self.execute(transport, identity, node).await?;

        let raw = form_field_value(&command, FIELD_REGISTERED_USERS_NUM).ok_or_else(|| {
            BoshError::malformed(format!("{node} result has no {FIELD_REGISTERED_USERS_NUM} field"))
        })?;
        let count = raw.trim().parse::<u64>().map_err(|_| {
            BoshError::malformed(format!("{FIELD_REGISTERED_USERS_NUM} is not a number: {raw:?}"))
        })?;

        info!(domain = identity.domain(), count, "registered users");
        Ok(count)
    }

    /// XEP-0133 §4.1: create an account on the identity's domain.
    ///
    /// Executes the command, then submits the returned form with the new
    /// account's JID and password.
    pub async fn add_user<C: HttpClient>(
        &mut self,
        transport: &mut BoshTransport<C>,
        identity: &Identity,
        username: &str,
        password: &str,
    ) -> Result<(), BoshError> {
        let node = NODE_ADD_USER;
        let command = self.execute(transport, identity, node).await?;
        let session_id = command
            .attr("sessionid")
            .ok_or_else(|| BoshError::malformed(format!("{node} reply has no sessionid")))?
            .to_string();

        let account = format!("{username}@{}", identity.domain());
        let form = stanza::data_form_submit(
            ns::ADMIN,
            [
                ("accountjid", account.as_str()),
                ("password", password),
                ("password-verify", password),
            ],
        );
        let attrs = self.iq_attributes(identity, node);
        let command_attrs = Attributes::new()
            .with("xmlns", ns::COMMANDS)
            .with("action", "complete")
            .with("node", node)
            .with("sessionid", session_id);

        debug!(%account, "submitting add-user form");
        let reply = transport
            .send_stanza(
                &stanza::ad_hoc_command_with_payload(&attrs, &command_attrs, &form),
                &Attributes::new(),
            )
            .await?;
        let command = command_result(&reply, node)?;

        match command.attr("status") {
            Some("completed") => {
                info!(%account, "account created");
                Ok(())
            }
            status => Err(BoshError::malformed(format!(
                "{node} ended with status {status:?}"
            ))),
        }
    }

    /// Send `action='execute'` for `node` and return the `<command>` reply.
    async fn execute<C: HttpClient>(
        &mut self,
        transport: &mut BoshTransport<C>,
        identity: &Identity,
        node: &str,
    ) -> Result<Element, BoshError> {
        let attrs = self.iq_attributes(identity, node);
        let command_attrs = Attributes::new()
            .with("xmlns", ns::COMMANDS)
            .with("action", "execute")
            .with("node", node);

        debug!(node, id = attrs.get("id"), "executing ad-hoc command");
        let reply = transport
            .send_stanza(
                &stanza::ad_hoc_command(&attrs, &command_attrs),
                &Attributes::new(),
            )
            .await?;
        command_result(&reply, node).cloned()
    }
}

fn command_result<'a>(reply: &'a Element, node: &str) -> Result<&'a Element, BoshError> {
    if let Some(condition) = body_iq_error(reply) {
        return Err(BoshError::CommandFailed {
            node: node.to_string(),
            condition,
        });
    }
    find_descendant(reply, "command", ns::COMMANDS)
        .ok_or_else(|| BoshError::malformed(format!("reply to {node} has no <command>")))
}

/// First `<value>` of the data form field `var` inside `command`.
fn form_field_value(command: &Element, var: &str) -> Option<String> {
    let form = command.get_child("x", ns::DATA_FORMS)?;
    form.children()
        .filter(|f| f.is("field", ns::DATA_FORMS))
        .find(|f| f.attr("var") == Some(var))?
        .get_child("value", ns::DATA_FORMS)
        .map(Element::text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn ids_count_per_command_name() {
        let mut admin = AdminCommands::new();
        assert_eq!(admin.next_id("add-user"), "add-user-1");
        assert_eq!(admin.next_id("add-user"), "add-user-2");
        assert_eq!(
            admin.next_id("get-registered-users-num"),
            "get-registered-users-num-1"
        );
        assert_eq!(admin.next_id("add-user"), "add-user-3");
    }

    #[test]
    fn counters_are_per_instance() {
        let mut first = AdminCommands::new();
        let mut second = AdminCommands::new();
        first.next_id("add-user");
        assert_eq!(second.next_id("add-user"), "add-user-1");
    }

    #[test]
    fn iq_attributes_are_ordered() {
        let identity = Identity::parse("admin@debian", "web").unwrap();
        let mut admin = AdminCommands::new();
        let attrs = admin.iq_attributes(&identity, NODE_GET_REGISTERED_USERS_NUM);
        assert_eq!(
            attrs.iter().collect::<Vec<_>>(),
            vec![
                ("from", "admin@debian/web"),
                ("id", "get-registered-users-num-1"),
                ("to", "debian"),
                ("type", "set"),
                ("xml:lang", "en"),
            ]
        );
    }

    #[test]
    fn reads_form_field_value() {
        let command = document::parse(
            b"<command xmlns='http://jabber.org/protocol/commands' status='completed' \
              node='http://jabber.org/protocol/admin#get-registered-users-num'>\
              <x xmlns='jabber:x:data' type='result'>\
              <field type='hidden' var='FORM_TYPE'><value>http://jabber.org/protocol/admin</value></field>\
              <field var='registeredusersnum'><value>42</value></field></x></command>",
        )
        .unwrap();
        assert_eq!(
            form_field_value(&command, "registeredusersnum").as_deref(),
            Some("42")
        );
        assert_eq!(form_field_value(&command, "missing"), None);
    }

    #[test]
    fn command_error_maps_to_command_failed() {
        let reply = document::parse(
            b"<body xmlns='http://jabber.org/protocol/httpbind'>\
              <iq type='error' id='add-user-1' xmlns='jabber:client'>\
              <error type='auth'><forbidden xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>\
              </iq></body>",
        )
        .unwrap();
        match command_result(&reply, NODE_ADD_USER) {
            Err(BoshError::CommandFailed { node, condition }) => {
                assert_eq!(node, NODE_ADD_USER);
                assert_eq!(condition, "forbidden");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }
}
