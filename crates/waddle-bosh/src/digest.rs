// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! SASL DIGEST-MD5 (RFC 2831) response computation.
//!
//! The authenticator only depends on [`ChallengeResponder`]; [`DigestMd5`] is
//! the implementation used outside of tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use md5::{Digest, Md5};
use rand::Rng;

use crate::error::BoshError;

/// Inputs to a single challenge-response computation.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeRequest<'a> {
    /// Service type for the digest-uri, `xmpp` for client streams.
    pub service: &'a str,
    pub host: &'a str,
    /// Realm override; the challenge's realm (or `host`) is used otherwise.
    pub realm: Option<&'a str>,
    pub username: &'a str,
    pub password: &'a str,
    /// Base64-decoded server challenge.
    pub challenge: &'a [u8],
}

/// Computes the raw (not yet base64-encoded) response to a SASL challenge.
///
/// Called once per challenge, in order. Must be deterministic for fixed
/// inputs and the same earlier challenges.
pub trait ChallengeResponder: Send + Sync {
    fn compute(&self, request: &ChallengeRequest<'_>) -> Result<Vec<u8>, BoshError>;
}

impl<F> ChallengeResponder for F
where
    F: Fn(&ChallengeRequest<'_>) -> Result<Vec<u8>, BoshError> + Send + Sync,
{
    fn compute(&self, request: &ChallengeRequest<'_>) -> Result<Vec<u8>, BoshError> {
        self(request)
    }
}

/// RFC 2831 DIGEST-MD5 client with `qop=auth`.
///
/// Remembers the `rspauth` the server must send back after the last digest
/// response, and rejects the server when the values differ.
#[derive(Debug, Default)]
pub struct DigestMd5 {
    cnonce: Option<String>,
    expected_rspauth: Mutex<Option<String>>,
}

impl DigestMd5 {
    /// Responder that draws a fresh client nonce for every computation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Responder with a fixed client nonce.
    pub fn with_cnonce(cnonce: impl Into<String>) -> Self {
        Self {
            cnonce: Some(cnonce.into()),
            expected_rspauth: Mutex::default(),
        }
    }

    fn expected_rspauth(&self) -> MutexGuard<'_, Option<String>> {
        self.expected_rspauth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cnonce(&self) -> String {
        match &self.cnonce {
            Some(cnonce) => cnonce.clone(),
            None => {
                let mut bytes = [0u8; 16];
                rand::rng().fill(&mut bytes);
                hex::encode(bytes)
            }
        }
    }
}

impl ChallengeResponder for DigestMd5 {
    fn compute(&self, request: &ChallengeRequest<'_>) -> Result<Vec<u8>, BoshError> {
        let challenge = std::str::from_utf8(request.challenge)
            .map_err(|_| BoshError::malformed("DIGEST-MD5 challenge is not UTF-8"))?;
        let directives = parse_directives(challenge)?;
        let get = |key: &str| {
            directives
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        };

        // Second challenge: server proves knowledge of the password. Nothing
        // left to send once it checks out.
        if let Some(rspauth) = get("rspauth") {
            let expected = self.expected_rspauth().take().ok_or_else(|| {
                BoshError::malformed("DIGEST-MD5 rspauth before any digest response")
            })?;
            if !rspauth.eq_ignore_ascii_case(&expected) {
                return Err(BoshError::protocol(
                    "DIGEST-MD5 rspauth does not match, server not authenticated",
                ));
            }
            return Ok(Vec::new());
        }

        let nonce = get("nonce")
            .ok_or_else(|| BoshError::malformed("DIGEST-MD5 challenge has no nonce"))?;
        if let Some(qop) = get("qop") {
            if !qop.split(',').any(|q| q.trim() == "auth") {
                return Err(BoshError::UnsupportedMechanism(format!(
                    "DIGEST-MD5 with qop={qop}"
                )));
            }
        }

        let realm = request
            .realm
            .or_else(|| get("realm"))
            .unwrap_or(request.host);
        let cnonce = self.cnonce();
        let nc = "00000001";
        let digest_uri = format!("{}/{}", request.service, request.host);

        let ha1 = session_key(request.username, realm, request.password, nonce, &cnonce);
        let response = response_value(&ha1, nonce, &cnonce, nc, "AUTHENTICATE", &digest_uri);
        *self.expected_rspauth() =
            Some(response_value(&ha1, nonce, &cnonce, nc, "", &digest_uri));

        let mut out = format!(
            "username=\"{}\",realm=\"{}\",nonce=\"{}\",cnonce=\"{}\",nc={nc},qop=auth,\
             digest-uri=\"{}\",response={response}",
            quote(request.username),
            quote(realm),
            quote(nonce),
            quote(&cnonce),
            quote(&digest_uri),
        );
        if get("charset").is_some_and(|c| c.eq_ignore_ascii_case("utf-8")) {
            out.push_str(",charset=utf-8");
        }
        Ok(out.into_bytes())
    }
}

/// Hex-encoded H(A1) for `md5-sess`.
fn session_key(username: &str, realm: &str, password: &str, nonce: &str, cnonce: &str) -> String {
    let secret = Md5::digest(format!("{username}:{realm}:{password}").as_bytes());

    let mut a1 = secret.to_vec();
    a1.extend_from_slice(format!(":{nonce}:{cnonce}").as_bytes());
    hex::encode(Md5::digest(&a1))
}

/// Client response for `method = "AUTHENTICATE"`, server rspauth for an
/// empty method.
fn response_value(
    ha1: &str,
    nonce: &str,
    cnonce: &str,
    nc: &str,
    method: &str,
    digest_uri: &str,
) -> String {
    let ha2 = hex::encode(Md5::digest(format!("{method}:{digest_uri}").as_bytes()));

    hex::encode(Md5::digest(
        format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}").as_bytes(),
    ))
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split a `key=value,key="quoted value"` directive list.
fn parse_directives(input: &str) -> Result<Vec<(String, String)>, BoshError> {
    let mut directives = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(BoshError::malformed(format!(
                "DIGEST-MD5 directive {key:?} has no value"
            )));
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err(BoshError::malformed(
                    "unterminated quoted DIGEST-MD5 directive",
                ));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        directives.push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(directives)
}
