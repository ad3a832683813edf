// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Navigation helpers over parsed `<body>` response documents.

use minidom::Element;

use crate::error::BoshError;
use crate::stanza::ns;

/// Parse a raw response body into its root element.
pub fn parse(raw: &[u8]) -> Result<Element, BoshError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| BoshError::malformed(format!("response is not UTF-8: {e}")))?;
    text.trim()
        .parse::<Element>()
        .map_err(|e| BoshError::malformed(format!("response is not well-formed XML: {e}")))
}

/// Depth-first search for the first element named `name` in namespace `ns`,
/// starting with `root` itself.
pub fn find_descendant<'a>(root: &'a Element, name: &str, ns: &str) -> Option<&'a Element> {
    if root.is(name, ns) {
        return Some(root);
    }
    root.children()
        .find_map(|child| find_descendant(child, name, ns))
}

/// First `<iq>` payload of a `<body>`, whatever namespace the server used.
pub fn find_iq(body: &Element) -> Option<&Element> {
    body.children().find(|child| child.name() == "iq")
}

/// Defined condition of an `iq type='error'`, or `None` for any other iq.
pub fn iq_error_condition(iq: &Element) -> Option<String> {
    if iq.attr("type") != Some("error") {
        return None;
    }
    let condition = iq
        .children()
        .find(|child| child.name() == "error")
        .and_then(|error| {
            error
                .children()
                .find(|c| c.ns() == ns::STANZAS && c.name() != "text")
        })
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "undefined-condition".to_string());
    Some(condition)
}

/// Defined condition of the first error iq in `body`, if any.
pub fn body_iq_error(body: &Element) -> Option<String> {
    find_iq(body).and_then(iq_error_condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse(b"<body xmlns='http://jabber.org/protocol/httpbind'>"),
            Err(BoshError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse(&[0xff, 0xfe]),
            Err(BoshError::MalformedResponse(_))
        ));
    }

    #[test]
    fn finds_nested_elements_by_namespace() {
        let body = parse(
            b"<body xmlns='http://jabber.org/protocol/httpbind'>\
              <stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
              <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
              <mechanism>DIGEST-MD5</mechanism></mechanisms></stream:features></body>",
        )
        .unwrap();
        let mechanisms = find_descendant(&body, "mechanisms", ns::SASL).unwrap();
        assert_eq!(mechanisms.children().count(), 1);
        assert!(find_descendant(&body, "mechanisms", ns::BIND).is_none());
        assert!(find_descendant(&body, "features", ns::STREAM).is_some());
    }

    #[test]
    fn extracts_iq_error_condition() {
        let body = parse(
            b"<body xmlns='http://jabber.org/protocol/httpbind'>\
              <iq type='error' id='reg2' xmlns='jabber:client'>\
              <error type='cancel'><conflict xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>\
              <text xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'>taken</text></error></iq></body>",
        )
        .unwrap();
        assert_eq!(body_iq_error(&body).as_deref(), Some("conflict"));
    }

    #[test]
    fn result_iq_has_no_error_condition() {
        let body = parse(
            b"<body xmlns='http://jabber.org/protocol/httpbind'>\
              <iq type='result' id='reg2' xmlns='jabber:client'/></body>",
        )
        .unwrap();
        assert_eq!(body_iq_error(&body), None);
    }
}
