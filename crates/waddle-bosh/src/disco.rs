// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Service Discovery info queries (XEP-0030) against the user's domain.

use std::borrow::Cow;

use minidom::Element;
use tracing::debug;

use crate::document::{body_iq_error, find_descendant};
use crate::error::BoshError;
use crate::http::HttpClient;
use crate::jid::Identity;
use crate::stanza::{self, ns, Attributes};
use crate::transport::BoshTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoIdentity {
    pub category: String,
    /// The identity's `type` attribute.
    pub kind: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoInfo {
    pub identities: Vec<DiscoIdentity>,
    pub features: Vec<String>,
}

impl DiscoInfo {
    pub fn from_query(query: &Element) -> Self {
        let identities = query
            .children()
            .filter(|c| c.is("identity", ns::DISCO_INFO))
            .map(|c| DiscoIdentity {
                category: c.attr("category").unwrap_or_default().to_string(),
                kind: c.attr("type").unwrap_or_default().to_string(),
                name: c.attr("name").map(str::to_string),
            })
            .collect();
        let features = query
            .children()
            .filter(|c| c.is("feature", ns::DISCO_INFO))
            .filter_map(|c| c.attr("var"))
            .map(str::to_string)
            .collect();
        Self {
            identities,
            features,
        }
    }

    pub fn supports(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

const PROTOCOL_NODE_PREFIX: &str = "http://jabber.org/protocol/";

/// Expand a short protocol name such as `admin` to
/// `http://jabber.org/protocol/admin`. Anything containing `:` is taken as a
/// full node URI.
pub fn protocol_node(node: &str) -> Cow<'_, str> {
    if node.contains(':') {
        Cow::Borrowed(node)
    } else {
        Cow::Owned(format!("{PROTOCOL_NODE_PREFIX}{node}"))
    }
}

/// Query `disco#info` on the identity's domain, or on `node` of it.
pub async fn disco_info<C: HttpClient>(
    transport: &mut BoshTransport<C>,
    identity: &Identity,
    node: Option<&str>,
) -> Result<DiscoInfo, BoshError> {
    let id = if node.is_some() { "info2" } else { "info1" };
    let from = identity.full();
    let request = stanza::iq(
        "get",
        id,
        Some(&from),
        Some(identity.domain()),
        &stanza::disco_info_query(node),
    );

    let reply = transport.send_stanza(&request, &Attributes::new()).await?;
    if let Some(condition) = body_iq_error(&reply) {
        return Err(BoshError::protocol(format!(
            "disco#info on {} failed: {condition}",
            node.unwrap_or(identity.domain())
        )));
    }

    let query = find_descendant(&reply, "query", ns::DISCO_INFO)
        .ok_or_else(|| BoshError::malformed("disco#info reply has no query"))?;
    let info = DiscoInfo::from_query(query);
    debug!(
        node,
        identities = info.identities.len(),
        features = info.features.len(),
        "disco#info"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn short_node_names_expand_to_protocol_uris() {
        assert_eq!(protocol_node("admin"), ns::ADMIN);
        assert_eq!(protocol_node("commands"), ns::COMMANDS);
        assert_eq!(
            protocol_node("urn:xmpp:ping"),
            Cow::<str>::Borrowed("urn:xmpp:ping")
        );
        assert_eq!(protocol_node(ns::ADMIN), ns::ADMIN);
    }

    #[test]
    fn parses_identities_and_features() {
        let query = document::parse(
            b"<query xmlns='http://jabber.org/protocol/disco#info'>\
              <identity category='server' type='im' name='ejabberd'/>\
              <identity category='pubsub' type='pep'/>\
              <feature var='http://jabber.org/protocol/commands'/>\
              <feature var='jabber:iq:register'/></query>",
        )
        .unwrap();
        let info = DiscoInfo::from_query(&query);
        assert_eq!(
            info.identities,
            vec![
                DiscoIdentity {
                    category: "server".to_string(),
                    kind: "im".to_string(),
                    name: Some("ejabberd".to_string()),
                },
                DiscoIdentity {
                    category: "pubsub".to_string(),
                    kind: "pep".to_string(),
                    name: None,
                },
            ]
        );
        assert!(info.supports(ns::COMMANDS));
        assert!(info.supports(ns::REGISTER));
        assert!(!info.supports(ns::DISCO_INFO));
    }
}
