// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! The XEP-0124 `<body>` wrapper.
//!
//! Builders here never touch the request id counter; the transport increments
//! it once per network send.

use crate::stanza::{escape_xml, ns, write_attributes, Attributes};

/// Connection manager policy requested in the session creation request.
///
/// The server may answer with different values; the client records what it
/// receives and does not renegotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub wait: u32,
    pub hold: u32,
    pub window: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            wait: 60,
            hold: 1,
            window: 5,
        }
    }
}

/// BOSH protocol version advertised in the session creation request.
pub const BOSH_VERSION: &str = "1.6";

/// Wrap `inner` in a `<body>` carrying `rid`, `sid` (once negotiated) and
/// `extra` attributes. An empty `inner` yields a self-closing body.
pub fn wrap(rid: u64, sid: Option<&str>, inner: &str, extra: &Attributes) -> String {
    let mut attrs = Attributes::new().with("rid", rid.to_string());
    if let Some(sid) = sid {
        attrs.push("sid", sid);
    }
    for (name, value) in extra.iter() {
        attrs.push(name, value);
    }
    attrs.push("xmlns", ns::HTTPBIND);

    let mut out = String::with_capacity(inner.len() + 128);
    out.push_str("<body");
    write_attributes(&mut out, &attrs);
    if inner.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(inner);
        out.push_str("</body>");
    }
    out
}

/// Session creation request: the only body sent without a `sid`.
pub fn session_request(rid: u64, to: &str, policy: &SessionPolicy) -> String {
    format!(
        "<body rid='{rid}' xmlns='{httpbind}' to='{to}' xml:lang='en' wait='{wait}' hold='{hold}' \
         window='{window}' content='text/xml; charset=utf-8' ver='{ver}' xmpp:version='1.0' \
         xmlns:xmpp='{xbosh}'/>",
        httpbind = ns::HTTPBIND,
        to = escape_xml(to),
        wait = policy.wait,
        hold = policy.hold,
        window = policy.window,
        ver = BOSH_VERSION,
        xbosh = ns::XBOSH,
    )
}

/// Attributes for a XEP-0206 stream restart after SASL success.
pub fn restart_attributes(domain: &str) -> Attributes {
    Attributes::new()
        .with("to", domain)
        .with("xml:lang", "en")
        .with("xmpp:restart", "true")
        .with("xmlns:xmpp", ns::XBOSH)
}

/// Attributes marking the final request of a session.
pub fn terminate_attributes() -> Attributes {
    Attributes::new().with("type", "terminate")
}

#[cfg(test)]
mod tests {
    use minidom::Element;

    use super::*;

    #[test]
    fn wraps_stanza_verbatim() {
        let stanza = "<iq type='get' id='reg1'><query xmlns='jabber:iq:register'/></iq>";
        let body = wrap(42, Some("abc"), stanza, &Attributes::new());
        assert_eq!(
            body,
            "<body rid='42' sid='abc' xmlns='http://jabber.org/protocol/httpbind'>\
             <iq type='get' id='reg1'><query xmlns='jabber:iq:register'/></iq></body>"
        );
        assert!(!body.ends_with("/>"));
    }

    #[test]
    fn empty_stanza_self_closes() {
        let body = wrap(7, Some("abc"), "", &Attributes::new());
        assert_eq!(
            body,
            "<body rid='7' sid='abc' xmlns='http://jabber.org/protocol/httpbind'/>"
        );
    }

    #[test]
    fn extra_attributes_precede_namespace() {
        let body = wrap(7, Some("abc"), "", &restart_attributes("debian"));
        assert_eq!(
            body,
            "<body rid='7' sid='abc' to='debian' xml:lang='en' xmpp:restart='true' \
             xmlns:xmpp='urn:xmpp:xbosh' xmlns='http://jabber.org/protocol/httpbind'/>"
        );
    }

    #[test]
    fn sid_is_omitted_until_negotiated() {
        let body = wrap(1, None, "", &terminate_attributes());
        assert_eq!(
            body,
            "<body rid='1' type='terminate' xmlns='http://jabber.org/protocol/httpbind'/>"
        );
    }

    #[test]
    fn session_request_matches_wire_format() {
        let body = session_request(1000, "debian", &SessionPolicy::default());
        assert_eq!(
            body,
            "<body rid='1000' xmlns='http://jabber.org/protocol/httpbind' to='debian' xml:lang='en' \
             wait='60' hold='1' window='5' content='text/xml; charset=utf-8' ver='1.6' \
             xmpp:version='1.0' xmlns:xmpp='urn:xmpp:xbosh'/>"
        );
        assert!(!body.contains("sid="));
    }

    #[test]
    fn wrapped_stanza_parses_back() {
        let stanza = "<iq type='set' id='x' to='a&apos;b&amp;c'/>";
        let body = wrap(3, Some("s"), stanza, &Attributes::new());
        let root: Element = body.parse().unwrap();
        assert_eq!(root.attr("rid"), Some("3"));
        let iq = root.children().next().unwrap();
        assert_eq!(iq.attr("to"), Some("a'b&c"));
    }
}
