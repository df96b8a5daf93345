//! Builders and parsers for the platform objects the relay exchanges.
//!
//! Conventions on the bridge wire:
//! - 64-bit integers (`long`) are sent as decimal strings and accepted back as
//!   either strings or numbers.
//! - byte strings are hex-encoded; arrays of numbers are accepted back as well.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    auth::{
        srp::{PasswordAlgo, PasswordKdf, PasswordParams, SrpProof, PLATFORM_KDF},
        Credentials,
    },
    domain::{MessageId, PeerId, PeerKind, PeerRef, SourceMessage},
    errors::Error,
    Result,
};

pub mod method {
    pub const SEND_CODE: &str = "auth.sendCode";
    pub const SIGN_IN: &str = "auth.signIn";
    pub const CHECK_PASSWORD: &str = "auth.checkPassword";
    pub const GET_PASSWORD: &str = "account.getPassword";
    pub const GET_STATE: &str = "updates.getState";
    pub const GET_DIALOGS: &str = "messages.getDialogs";
    pub const GET_HISTORY: &str = "messages.getHistory";
    pub const FORWARD_MESSAGES: &str = "messages.forwardMessages";
    pub const GET_CHANNELS: &str = "channels.getChannels";
}

// ============== Requests ==============

pub fn input_peer(peer: &PeerRef) -> Value {
    if peer.kind.uses_channel_addressing() {
        json!({
            "_": "inputPeerChannel",
            "channel_id": peer.id.0,
            "access_hash": peer.access_hash.to_string(),
        })
    } else {
        json!({
            "_": "inputPeerChat",
            "chat_id": peer.id.0,
        })
    }
}

pub fn send_code(phone: &str, credentials: &Credentials) -> Value {
    json!({
        "phone_number": phone,
        "api_id": credentials.api_id,
        "api_hash": credentials.api_hash,
        "settings": {
            "_": "codeSettings",
            "allow_flashcall": false,
            "current_number": true,
            "allow_app_hash": true,
            "allow_missed_call": false,
        }
    })
}

pub fn sign_in(phone: &str, phone_code_hash: &str, code: &str) -> Value {
    json!({
        "phone_number": phone,
        "phone_code_hash": phone_code_hash,
        "phone_code": code,
    })
}

pub fn check_password(proof: &SrpProof) -> Value {
    json!({
        "password": {
            "_": "inputCheckPasswordSRP",
            "srp_id": proof.srp_id.to_string(),
            "A": hex::encode(&proof.a),
            "M1": hex::encode(&proof.m1),
        }
    })
}

pub fn get_dialogs(limit: u32) -> Value {
    json!({
        "offset_date": 0,
        "offset_id": 0,
        "offset_peer": { "_": "inputPeerEmpty" },
        "limit": limit,
        "hash": 0,
    })
}

/// Newest-first history page. `min_id` excludes everything at or below it.
pub fn get_history(peer: &PeerRef, limit: u32, min_id: MessageId) -> Value {
    json!({
        "peer": input_peer(peer),
        "offset_id": 0,
        "offset_date": 0,
        "add_offset": 0,
        "limit": limit,
        "max_id": 0,
        "min_id": min_id.0,
        "hash": 0,
    })
}

/// The oldest `limit` messages above `after`. The platform still returns them
/// newest first.
pub fn get_history_after(peer: &PeerRef, limit: u32, after: MessageId) -> Value {
    let limit = i64::from(limit);
    json!({
        "peer": input_peer(peer),
        "offset_id": i64::from(after.0) + 1,
        "offset_date": 0,
        "add_offset": -limit,
        "limit": limit,
        "max_id": 0,
        "min_id": after.0,
        "hash": 0,
    })
}

pub fn forward_message(from: &PeerRef, to: &PeerRef, id: MessageId, random_id: i64) -> Value {
    json!({
        "from_peer": input_peer(from),
        "to_peer": input_peer(to),
        "id": [id.0],
        "random_id": [random_id.to_string()],
    })
}

pub fn get_channels(id: PeerId) -> Value {
    json!({
        "id": [{
            "_": "inputChannel",
            "channel_id": id.0,
            "access_hash": "0",
        }]
    })
}

// ============== Results ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    SignedIn,
    SignUpRequired,
}

pub fn parse_sent_code(v: &Value) -> Result<String> {
    v.get("phone_code_hash")
        .and_then(|h| h.as_str())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol("auth.sentCode without phone_code_hash".to_string()))
}

pub fn parse_authorization(v: &Value) -> Authorization {
    match constructor(v) {
        Some("auth.authorizationSignUpRequired") => Authorization::SignUpRequired,
        _ => Authorization::SignedIn,
    }
}

pub fn parse_password(v: &Value) -> Result<PasswordParams> {
    let algo = v
        .get("current_algo")
        .filter(|a| !a.is_null())
        .ok_or_else(|| Error::Protocol("account has no cloud password configured".to_string()))?;

    let kdf = match constructor(algo) {
        Some(PLATFORM_KDF) => PasswordKdf::PlatformModPow,
        other => {
            let iterations = algo
                .get("iterations")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    Error::Protocol(format!(
                        "unsupported password algorithm: {}",
                        other.unwrap_or("<missing>")
                    ))
                })?;
            PasswordKdf::Pbkdf2Chain { iterations }
        }
    };

    let g = algo
        .get("g")
        .and_then(Value::as_u64)
        .and_then(|g| u32::try_from(g).ok())
        .ok_or_else(|| Error::Protocol("password algorithm without g".to_string()))?;

    Ok(PasswordParams {
        srp_id: field_i64(v, "srp_id")?,
        srp_b: field_bytes(v, "srp_B")?,
        algo: PasswordAlgo {
            kdf,
            salt1: field_bytes(algo, "salt1")?,
            salt2: field_bytes(algo, "salt2")?,
            g,
            p: field_bytes(algo, "p")?,
        },
    })
}

/// Groups and channels among the dialog chats. Other chat kinds are dropped.
pub fn parse_dialog_chats(v: &Value) -> Vec<PeerRef> {
    let Some(chats) = v.get("chats").and_then(Value::as_array) else {
        return Vec::new();
    };

    chats
        .iter()
        .filter_map(|chat| {
            let kind = match constructor(chat)? {
                "channel" => {
                    if chat.get("megagroup").and_then(Value::as_bool).unwrap_or(false) {
                        PeerKind::Supergroup
                    } else {
                        PeerKind::Channel
                    }
                }
                "chat" => PeerKind::BasicGroup,
                _ => return None,
            };
            Some(PeerRef {
                id: PeerId(chat.get("id").and_then(as_i64)?),
                access_hash: chat.get("access_hash").and_then(as_i64).unwrap_or(0),
                title: chat
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
            })
        })
        .collect()
}

/// Messages of a history page, in the order the platform returned them.
pub fn parse_messages(v: &Value) -> Result<Vec<SourceMessage>> {
    let items = v
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Protocol("history result without messages".to_string()))?;

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if constructor(item) == Some("messageEmpty") {
            continue;
        }
        let Some(id) = item
            .get("id")
            .and_then(as_i64)
            .and_then(|id| i32::try_from(id).ok())
        else {
            continue;
        };

        let date = item
            .get("date")
            .and_then(as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        let text = item
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let media_type = item
            .get("media")
            .and_then(constructor)
            .map(str::to_string);

        out.push(SourceMessage {
            id: MessageId(id),
            date,
            text,
            media_type,
        });
    }
    Ok(out)
}

pub fn parse_channel_access_hash(v: &Value) -> Result<i64> {
    v.get("chats")
        .and_then(Value::as_array)
        .and_then(|chats| chats.first())
        .and_then(|chat| chat.get("access_hash"))
        .and_then(as_i64)
        .ok_or_else(|| Error::Protocol("channel not found".to_string()))
}

// ============== Helpers ==============

fn constructor(v: &Value) -> Option<&str> {
    v.get("_").and_then(Value::as_str)
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str()?.trim().parse().ok())
}

fn field_i64(v: &Value, key: &str) -> Result<i64> {
    v.get(key)
        .and_then(as_i64)
        .ok_or_else(|| Error::Protocol(format!("missing integer field {key}")))
}

fn field_bytes(v: &Value, key: &str) -> Result<Vec<u8>> {
    let raw = v
        .get(key)
        .ok_or_else(|| Error::Protocol(format!("missing bytes field {key}")))?;

    if let Some(s) = raw.as_str() {
        return hex::decode(s).map_err(|e| Error::Protocol(format!("field {key}: {e}")));
    }
    if let Some(arr) = raw.as_array() {
        return arr
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| Error::Protocol(format!("field {key}: not a byte array")));
    }
    Err(Error::Protocol(format!("field {key}: unsupported encoding")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: i64, hash: i64) -> PeerRef {
        PeerRef {
            id: PeerId(id),
            access_hash: hash,
            title: "news".to_string(),
            kind: PeerKind::Channel,
        }
    }

    #[test]
    fn input_peer_depends_on_kind() {
        let p = input_peer(&channel(10, -77));
        assert_eq!(p["_"], "inputPeerChannel");
        assert_eq!(p["access_hash"], "-77");

        let chat = PeerRef {
            kind: PeerKind::BasicGroup,
            ..channel(11, 0)
        };
        let p = input_peer(&chat);
        assert_eq!(p["_"], "inputPeerChat");
        assert_eq!(p["chat_id"], 11);
        assert!(p.get("access_hash").is_none());
    }

    #[test]
    fn history_after_pages_upwards_from_the_watermark() {
        let v = get_history_after(&channel(10, 1), 50, MessageId(100));
        assert_eq!(v["offset_id"], 101);
        assert_eq!(v["add_offset"], -50);
        assert_eq!(v["limit"], 50);
        assert_eq!(v["min_id"], 100);

        let newest = get_history(&channel(10, 1), 50, MessageId(0));
        assert_eq!(newest["offset_id"], 0);
        assert_eq!(newest["add_offset"], 0);
    }

    #[test]
    fn dialog_chats_keep_groups_and_channels_only() {
        let v = json!({
            "chats": [
                { "_": "channel", "id": 1, "access_hash": "123", "title": "A", "megagroup": true },
                { "_": "channel", "id": 2, "access_hash": 456, "title": "B" },
                { "_": "chat", "id": 3, "title": "C" },
                { "_": "chatForbidden", "id": 4, "title": "D" },
                { "_": "user", "id": 5 }
            ]
        });
        let peers = parse_dialog_chats(&v);
        assert_eq!(peers.len(), 3);
        assert_eq!(peers[0].kind, PeerKind::Supergroup);
        assert_eq!(peers[0].access_hash, 123);
        assert_eq!(peers[1].kind, PeerKind::Channel);
        assert_eq!(peers[1].access_hash, 456);
        assert_eq!(peers[2].kind, PeerKind::BasicGroup);
        assert_eq!(peers[2].access_hash, 0);
    }

    #[test]
    fn messages_parse_text_media_and_skip_empty() {
        let v = json!({
            "messages": [
                { "_": "message", "id": 12, "date": 1_700_000_000, "message": "hi" },
                { "_": "messageEmpty", "id": 11 },
                { "_": "message", "id": 10, "date": 1_700_000_000, "message": "",
                  "media": { "_": "messageMediaPhoto" } }
            ]
        });
        let msgs = parse_messages(&v).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].id, MessageId(12));
        assert_eq!(msgs[0].text.as_deref(), Some("hi"));
        assert_eq!(msgs[0].date.timestamp(), 1_700_000_000);
        assert_eq!(msgs[1].text, None);
        assert_eq!(msgs[1].media_type.as_deref(), Some("messageMediaPhoto"));
    }

    #[test]
    fn password_params_accept_hex_and_byte_arrays() {
        let v = json!({
            "srp_id": "987654321",
            "srp_B": "0a0b",
            "current_algo": {
                "_": PLATFORM_KDF,
                "salt1": [1, 2, 3],
                "salt2": "0405",
                "g": 3,
                "p": "ff"
            }
        });
        let params = parse_password(&v).unwrap();
        assert_eq!(params.srp_id, 987_654_321);
        assert_eq!(params.srp_b, vec![0x0a, 0x0b]);
        assert_eq!(params.algo.kdf, PasswordKdf::PlatformModPow);
        assert_eq!(params.algo.salt1, vec![1, 2, 3]);
        assert_eq!(params.algo.salt2, vec![4, 5]);
        assert_eq!(params.algo.g, 3);
    }

    #[test]
    fn password_params_without_algo_fail() {
        let err = parse_password(&json!({ "has_password": false })).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn unknown_algo_with_iterations_uses_chain() {
        let v = json!({
            "srp_id": 1,
            "srp_B": "02",
            "current_algo": { "_": "custom", "salt1": "", "salt2": "", "g": 2, "p": "05",
                              "iterations": 1000 }
        });
        let params = parse_password(&v).unwrap();
        assert_eq!(
            params.algo.kdf,
            PasswordKdf::Pbkdf2Chain { iterations: 1000 }
        );
    }

    #[test]
    fn sign_up_required_is_detected() {
        assert_eq!(
            parse_authorization(&json!({ "_": "auth.authorizationSignUpRequired" })),
            Authorization::SignUpRequired
        );
        assert_eq!(
            parse_authorization(&json!({ "_": "auth.authorization", "user": {} })),
            Authorization::SignedIn
        );
    }
}
