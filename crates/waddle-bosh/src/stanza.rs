// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Stanza builders.
//!
//! Every function here is pure and returns a serialized XML fragment. Values
//! are escaped exactly once on the way in, so callers always pass raw text.
//! Attributes are written in insertion order and quoted with `'`.

/// XML namespaces used on the wire.
pub mod ns {
    /// BOSH `<body>` wrapper
    pub const HTTPBIND: &str = "http://jabber.org/protocol/httpbind";
    /// XEP-0206 `xmpp:` attribute prefix
    pub const XBOSH: &str = "urn:xmpp:xbosh";
    /// XMPP client namespace
    pub const JABBER_CLIENT: &str = "jabber:client";
    /// XMPP streams namespace
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// SASL namespace
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Resource binding namespace
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
    /// Session namespace
    pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
    /// Stanza error namespace
    pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
    /// XEP-0077 In-Band Registration
    pub const REGISTER: &str = "jabber:iq:register";
    /// XEP-0050 Ad-Hoc Commands
    pub const COMMANDS: &str = "http://jabber.org/protocol/commands";
    /// XEP-0030 Service Discovery (info)
    pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
    /// XEP-0004 Data Forms
    pub const DATA_FORMS: &str = "jabber:x:data";
    /// XEP-0133 Service Administration
    pub const ADMIN: &str = "http://jabber.org/protocol/admin";
}

/// Ordered attribute list.
///
/// Output order follows insertion order so generated stanzas are
/// deterministic; servers must not rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Append an attribute, replacing the value in place if `name` is
    /// already present.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in iter {
            attrs.push(name, value);
        }
        attrs
    }
}

/// Escape text for use in XML attribute values and character data.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn write_attributes(out: &mut String, attrs: &Attributes) {
    for (name, value) in attrs.iter() {
        out.push(' ');
        out.push_str(name);
        out.push_str("='");
        out.push_str(&escape_xml(value));
        out.push('\'');
    }
}

/// Generic element builder. `payload` is an already-built fragment inserted
/// verbatim; an empty payload produces a self-closing tag.
pub fn element(name: &str, attrs: &Attributes, payload: &str) -> String {
    let mut out = String::with_capacity(name.len() * 2 + payload.len() + 32);
    out.push('<');
    out.push_str(name);
    write_attributes(&mut out, attrs);
    if payload.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(payload);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}

/// Element whose content is escaped text rather than markup.
pub fn text_element(name: &str, attrs: &Attributes, text: &str) -> String {
    element(name, attrs, &escape_xml(text))
}

/// `<iq>` with `type`, `id` and optional `from`/`to`, wrapping `payload`.
pub fn iq(iq_type: &str, id: &str, from: Option<&str>, to: Option<&str>, payload: &str) -> String {
    let mut attrs = Attributes::new().with("type", iq_type).with("id", id);
    if let Some(from) = from {
        attrs.push("from", from);
    }
    if let Some(to) = to {
        attrs.push("to", to);
    }
    element("iq", &attrs, payload)
}

/// `<auth mechanism='…'/>` opening a SASL exchange.
pub fn auth_request(mechanism: &str) -> String {
    element(
        "auth",
        &Attributes::new()
            .with("xmlns", ns::SASL)
            .with("mechanism", mechanism),
        "",
    )
}

/// `<response>` carrying base64 data; self-closes when the data is empty.
pub fn auth_response(base64_payload: &str) -> String {
    text_element(
        "response",
        &Attributes::new().with("xmlns", ns::SASL),
        base64_payload,
    )
}

pub fn presence_unavailable() -> String {
    element(
        "presence",
        &Attributes::new()
            .with("type", "unavailable")
            .with("xmlns", ns::JABBER_CLIENT),
        "",
    )
}

/// Resource binding request sent after the stream restart.
pub fn bind_request(id: &str, resource: &str) -> String {
    let resource = text_element("resource", &Attributes::new(), resource);
    let bind = element("bind", &Attributes::new().with("xmlns", ns::BIND), &resource);
    element(
        "iq",
        &Attributes::new()
            .with("id", id)
            .with("type", "set")
            .with("xmlns", ns::JABBER_CLIENT),
        &bind,
    )
}

/// Legacy RFC 3921 session establishment request.
pub fn session_request(id: &str) -> String {
    let session = element(
        "session",
        &Attributes::new().with("xmlns", ns::SESSION),
        "",
    );
    iq("set", id, None, None, &session)
}

/// Empty `jabber:iq:register` query, used to discover registration fields.
pub fn register_form_request() -> String {
    element("query", &Attributes::new().with("xmlns", ns::REGISTER), "")
}

/// `jabber:iq:register` query with one child element per field.
///
/// Fields with an empty value are written as `<name></name>` so that the
/// server sees them as present.
pub fn register_query<I, K, V>(fields: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut payload = String::new();
    for (name, value) in fields {
        let name = name.as_ref();
        payload.push('<');
        payload.push_str(name);
        payload.push('>');
        payload.push_str(&escape_xml(value.as_ref()));
        payload.push_str("</");
        payload.push_str(name);
        payload.push('>');
    }
    element(
        "query",
        &Attributes::new().with("xmlns", ns::REGISTER),
        &payload,
    )
}

/// `disco#info` query, optionally addressed to a node.
pub fn disco_info_query(node: Option<&str>) -> String {
    let mut attrs = Attributes::new().with("xmlns", ns::DISCO_INFO);
    if let Some(node) = node {
        attrs.push("node", node);
    }
    element("query", &attrs, "")
}

/// Ad-hoc command iq: `attributes` go on the `<iq>`, `command_attributes` on
/// the self-closing `<command>`. New commands are new attribute sets.
pub fn ad_hoc_command(attributes: &Attributes, command_attributes: &Attributes) -> String {
    ad_hoc_command_with_payload(attributes, command_attributes, "")
}

/// Ad-hoc command iq whose `<command>` carries a payload (a submitted form).
pub fn ad_hoc_command_with_payload(
    attributes: &Attributes,
    command_attributes: &Attributes,
    payload: &str,
) -> String {
    let command = element("command", command_attributes, payload);
    element("iq", attributes, &command)
}

/// XEP-0004 `submit` form with a hidden `FORM_TYPE` and single-valued fields.
pub fn data_form_submit<I, K, V>(form_type: &str, fields: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let value = |v: &str| text_element("value", &Attributes::new(), v);

    let mut payload = element(
        "field",
        &Attributes::new()
            .with("type", "hidden")
            .with("var", "FORM_TYPE"),
        &value(form_type),
    );
    for (var, v) in fields {
        payload.push_str(&element(
            "field",
            &Attributes::new().with("var", var.as_ref()),
            &value(v.as_ref()),
        ));
    }

    element(
        "x",
        &Attributes::new()
            .with("xmlns", ns::DATA_FORMS)
            .with("type", "submit"),
        &payload,
    )
}
