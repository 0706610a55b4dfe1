//! Message format and digest computation shared by both sides of DIGEST-MD5 (RFC 2831).

use crate::common::digest::legacy_digest;
use log::warn;
use md5::{Digest, Md5};
use std::collections::BTreeMap;

/// The attributes of a DIGEST-MD5 message, sorted by name.
pub type Message = BTreeMap<String, Vec<u8>>;

const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";

fn find(haystack: &[u8], from: usize, needle: u8) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|pos| pos + from)
}

/// Parses a comma separated list of `key=value` or `key="quoted value"` attributes.
///
/// Parsing stops at the first malformed attribute, keeping what was read so far.
pub fn parse_message(message: &[u8]) -> Message {
    let mut map = Message::new();
    let mut start = 0;
    while let Some(eq) = find(message, start, b'=') {
        let key = String::from_utf8_lossy(&message[start..eq]).trim().to_owned();
        let pos = eq + 1;
        if message.get(pos) == Some(&b'"') {
            let mut value = Vec::new();
            let mut idx = pos + 1;
            let mut closed = false;
            while let Some(&b) = message.get(idx) {
                match b {
                    b'\\' => {
                        if let Some(&escaped) = message.get(idx + 1) {
                            value.push(escaped);
                        }
                        idx += 2;
                    }
                    b'"' => {
                        closed = true;
                        break;
                    }
                    _ => {
                        value.push(b);
                        idx += 1;
                    }
                }
            }
            if !closed {
                warn!("Unfinished quoted string in DIGEST-MD5 message");
                return map;
            }
            map.insert(key, value);
            // Skip the closing quote and the following comma.
            start = idx + 2;
        } else {
            let end = find(message, pos, b',').unwrap_or(message.len());
            map.insert(key, message[pos..end].to_vec());
            start = end + 1;
        }
    }
    map
}

/// Serialises attributes in key order, quoting values containing separators.
pub fn serialize_message(message: &Message) -> Vec<u8> {
    let mut ret = Vec::new();
    for (key, value) in message {
        if !ret.is_empty() {
            ret.push(b',');
        }
        ret.extend(key.bytes());
        ret.push(b'=');
        if value.iter().any(|b| SEPARATORS.contains(b)) {
            ret.push(b'"');
            for &b in value {
                if b == b'\\' || b == b'"' {
                    ret.push(b'\\');
                }
                ret.push(b);
            }
            ret.push(b'"');
        } else {
            ret.extend(value);
        }
    }
    ret
}

/// Computes `H(username:realm:password)`, the secret DIGEST-MD5 servers may store instead of the
/// password.
pub fn secret(username: &str, realm: &[u8], password: &str) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(username.bytes());
    data.push(b':');
    data.extend(realm);
    data.push(b':');
    data.extend(password.bytes());
    Md5::digest(&data).to_vec()
}

/// Computes the `response` (with `method` set to `AUTHENTICATE`) or `rspauth` (with an empty
/// `method`) value for `qop=auth`.
///
/// `authzid` must be given whenever the response carries one, it goes at the end of A1.
pub fn digest_md5_response(
    secret: &[u8],
    authzid: Option<&[u8]>,
    method: &[u8],
    digest_uri: &[u8],
    nonce: &[u8],
    cnonce: &[u8],
    nc: &[u8],
) -> String {
    let mut a1 = secret.to_vec();
    a1.push(b':');
    a1.extend(nonce);
    a1.push(b':');
    a1.extend(cnonce);
    if let Some(authzid) = authzid {
        a1.push(b':');
        a1.extend(authzid);
    }

    let mut a2 = method.to_vec();
    a2.push(b':');
    a2.extend(digest_uri);

    legacy_digest(&a1, &a2, nonce, cnonce, nc, b"auth")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Source: RFC 2831, section 4.
    #[test]
    fn rfc2831_example() {
        let secret = secret("chris", b"elwood.innosoft.com", "secret");
        let response = digest_md5_response(
            &secret,
            None,
            b"AUTHENTICATE",
            b"imap/elwood.innosoft.com",
            b"OA6MG9tEQGm2hh",
            b"OA6MHXh6VqTrRk",
            b"00000001",
        );
        assert_eq!(response, "d388dad90d4bbd760a152321f2143af7");
        let rspauth = digest_md5_response(
            &secret,
            None,
            b"",
            b"imap/elwood.innosoft.com",
            b"OA6MG9tEQGm2hh",
            b"OA6MHXh6VqTrRk",
            b"00000001",
        );
        assert_eq!(rspauth, "ea40f60335c427b5527b84dbabcdfffd");
    }

    #[test]
    fn authzid_goes_into_a1() {
        let secret = secret("chris", b"elwood.innosoft.com", "secret");
        let response = digest_md5_response(
            &secret,
            Some(&b"admin"[..]),
            b"AUTHENTICATE",
            b"imap/elwood.innosoft.com",
            b"OA6MG9tEQGm2hh",
            b"OA6MHXh6VqTrRk",
            b"00000001",
        );
        assert_eq!(response, "23e90c577367d8f917efa6ba0cb7eebc");
    }

    #[test]
    fn parse_challenge() {
        let message = parse_message(
            b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",algorithm=md5-sess,charset=utf-8",
        );
        assert_eq!(message.len(), 5);
        assert_eq!(message["realm"], b"elwood.innosoft.com");
        assert_eq!(message["nonce"], b"OA6MG9tEQGm2hh");
        assert_eq!(message["qop"], b"auth");
        assert_eq!(message["algorithm"], b"md5-sess");
        assert_eq!(message["charset"], b"utf-8");
    }

    #[test]
    fn parse_escapes_and_unfinished_quotes() {
        let message = parse_message(b"a=\"x\\\"y\",b=plain");
        assert_eq!(message["a"], b"x\"y");
        assert_eq!(message["b"], b"plain");

        let message = parse_message(b"a=1,b=\"never closed");
        assert_eq!(message.len(), 1);
        assert_eq!(message["a"], b"1");
    }

    #[test]
    fn serialize_quotes_when_needed() {
        let mut message = Message::new();
        message.insert(String::from("qop"), b"auth".to_vec());
        message.insert(String::from("digest-uri"), b"xmpp/example.org".to_vec());
        message.insert(String::from("username"), b"a\"b".to_vec());
        assert_eq!(
            serialize_message(&message),
            b"digest-uri=\"xmpp/example.org\",qop=auth,username=\"a\\\"b\""
        );
        assert_eq!(parse_message(&serialize_message(&message)), message);
    }
}
