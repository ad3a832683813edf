// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Scripted connection manager for driving full BOSH flows in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::prelude::*;
use waddle_bosh::stanza::ns;
use waddle_bosh::{
    BoshClient, BoshTransport, ChallengeResponder, HttpClient, HttpResponse, Identity,
    TransportConfig,
};

pub const SERVICE_URL: &str = "http://debian:5280/http-bind/";
pub const INITIAL_RID: u64 = 1000;

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, thiserror::Error)]
#[error("scripted connection manager has no reply left")]
pub struct Exhausted;

/// Replies to each POST with the next scripted response and records every
/// request body it was sent.
#[derive(Clone, Default)]
pub struct ScriptedServer {
    replies: Arc<Mutex<VecDeque<HttpResponse>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(
                replies
                    .into_iter()
                    .map(|r| HttpResponse::ok(Into::<String>::into(r)))
                    .collect(),
            )),
            sent: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl HttpClient for ScriptedServer {
    type Error = Exhausted;

    async fn post(
        &self,
        _url: &str,
        _headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, Exhausted> {
        self.sent.lock().unwrap().push(body);
        self.replies.lock().unwrap().pop_front().ok_or(Exhausted)
    }
}

pub fn identity() -> Identity {
    Identity::parse("essai@debian", "web").unwrap()
}

/// Client over `server` with a fixed initial rid.
pub fn client<R: ChallengeResponder>(
    server: &ScriptedServer,
    responder: R,
    max_rounds: u32,
) -> BoshClient<ScriptedServer, R> {
    let transport = BoshTransport::with_rid(server.clone(), TransportConfig::default(), INITIAL_RID);
    BoshClient::with_transport(transport, responder, identity(), "secret", max_rounds)
}

pub fn body(inner: &str) -> String {
    format!("<body xmlns='{}'>{inner}</body>", ns::HTTPBIND)
}

pub fn session_created(mechanisms: &[&str]) -> String {
    let list: String = mechanisms
        .iter()
        .map(|m| format!("<mechanism>{m}</mechanism>"))
        .collect();
    format!(
        "<body xmlns='{}' sid='abc' wait='60' authid='stream-1'>\
         <stream:features xmlns:stream='{}'><mechanisms xmlns='{}'>{list}</mechanisms>\
         </stream:features></body>",
        ns::HTTPBIND,
        ns::STREAM,
        ns::SASL
    )
}

pub fn session_created_without_features() -> String {
    format!("<body xmlns='{}' sid='abc' wait='60'/>", ns::HTTPBIND)
}

pub fn challenge(text: &str) -> String {
    body(&format!(
        "<challenge xmlns='{}'>{}</challenge>",
        ns::SASL,
        BASE64_STANDARD.encode(text)
    ))
}

pub fn success() -> String {
    body(&format!("<success xmlns='{}'/>", ns::SASL))
}

pub fn failure(condition: &str) -> String {
    body(&format!("<failure xmlns='{}'><{condition}/></failure>", ns::SASL))
}

pub fn restarted() -> String {
    body(&format!(
        "<stream:features xmlns:stream='{}'><bind xmlns='{}'/></stream:features>",
        ns::STREAM,
        ns::BIND
    ))
}

pub fn bound(jid: &str) -> String {
    body(&format!(
        "<iq type='result' id='bind_1' xmlns='jabber:client'>\
         <bind xmlns='{}'><jid>{jid}</jid></bind></iq>",
        ns::BIND
    ))
}

pub fn iq_result(id: &str) -> String {
    body(&format!("<iq type='result' id='{id}' xmlns='jabber:client'/>"))
}

pub fn iq_error(id: &str, condition: &str) -> String {
    body(&format!(
        "<iq type='error' id='{id}' xmlns='jabber:client'>\
         <error type='cancel'><{condition} xmlns='{}'/></error></iq>",
        ns::STANZAS
    ))
}

/// Value of attribute `name` in the opening tag of `xml`.
pub fn attr<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}='");
    let start = xml.find(&needle)? + needle.len();
    let len = xml[start..].find('\'')?;
    Some(&xml[start..start + len])
}
