//! Fakes for the core ports, shared by the unit tests of this crate.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    auth::srp::{self, PasswordAlgo, PasswordKdf},
    domain::{DeadLetter, PeerId, PeerKind, PeerRef, RelayRecord},
    errors::Error,
    operator::Operator,
    rpc::{tl, RpcClient, RpcError},
    store::{MessageStore, StoreError},
    Result,
};

type Reply = std::result::Result<Value, RpcError>;

/// Scripted `RpcClient`.
///
/// Queued replies are consumed first; once a method's queue is empty the
/// `always` reply (if any) is returned. Anything unscripted fails with
/// `400 METHOD_NOT_SCRIPTED`.
#[derive(Default)]
pub struct FakeRpc {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Value)>>,
    dc: Mutex<Option<u32>>,
    channel: Mutex<Option<Vec<i32>>>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: &str, reply: Reply) {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn always(&self, method: &str, reply: Reply) {
        self.fallback
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
    }

    /// Answer unscripted `messages.getHistory` calls from `ids`, honouring
    /// `offset_id`, `add_offset`, `min_id` and `limit` the way the platform does.
    pub fn serve_history(&self, ids: &[i32]) {
        *self.channel.lock().unwrap() = Some(ids.to_vec());
    }

    fn history_page(&self, params: &Value) -> Option<Reply> {
        let mut ids = self.channel.lock().unwrap().clone()?;
        let field = |key: &str| params.get(key).and_then(Value::as_i64).unwrap_or(0);
        let (offset_id, add_offset, min_id) =
            (field("offset_id"), field("add_offset"), field("min_id"));
        let limit = usize::try_from(field("limit")).unwrap_or(0);

        ids.retain(|id| i64::from(*id) > min_id);
        ids.sort_unstable();
        let page: Vec<i32> = if add_offset < 0 {
            ids.into_iter()
                .filter(|id| i64::from(*id) >= offset_id)
                .take(limit)
                .collect()
        } else {
            if offset_id > 0 {
                ids.retain(|id| i64::from(*id) < offset_id);
            }
            let skip = ids.len().saturating_sub(limit);
            ids.into_iter().skip(skip).collect()
        };
        Some(Ok(history(&page)))
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls(method).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `account.getPassword` result whose SRP exchange accepts `password`.
    pub fn password_params(password: &str) -> Value {
        let algo = PasswordAlgo {
            kdf: PasswordKdf::Pbkdf2Chain { iterations: 1 },
            salt1: b"salt-one".to_vec(),
            salt2: b"salt-two".to_vec(),
            g: 3,
            p: srp::test_modulus(),
        };
        let params = srp::params_with_server_secret(algo, password, &[0x42; 32]);
        json!({
            "_": "account.password",
            "has_password": true,
            "srp_id": params.srp_id.to_string(),
            "srp_B": hex::encode(&params.srp_b),
            "current_algo": {
                "_": "passwordKdfAlgoPBKDF2HMACSHA512Chain",
                "salt1": hex::encode(&params.algo.salt1),
                "salt2": hex::encode(&params.algo.salt2),
                "g": params.algo.g,
                "p": hex::encode(&params.algo.p),
                "iterations": 1,
            }
        })
    }
}

#[async_trait]
impl RpcClient for FakeRpc {
    async fn call(&self, method: &str, params: Value) -> Reply {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        if method == tl::method::GET_HISTORY {
            if let Some(reply) = self.history_page(&params) {
                return reply;
            }
        }
        if let Some(reply) = self.fallback.lock().unwrap().get(method) {
            return reply.clone();
        }
        Err(RpcError::new(400, "METHOD_NOT_SCRIPTED"))
    }

    fn set_default_dc(&self, dc_id: u32) {
        *self.dc.lock().unwrap() = Some(dc_id);
    }

    fn default_dc(&self) -> Option<u32> {
        *self.dc.lock().unwrap()
    }
}

/// In-memory `MessageStore` enforcing the natural-key uniqueness.
#[derive(Default)]
pub struct FakeStore {
    records: Mutex<Vec<RelayRecord>>,
    parked: Mutex<Vec<DeadLetter>>,
    failure: Mutex<Option<StoreError>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append` fail with `err`.
    pub fn fail_with(&self, err: StoreError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn records(&self) -> Vec<RelayRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn ids(&self) -> Vec<i32> {
        self.records().iter().map(|r| r.message_id.0).collect()
    }

    pub fn parked(&self) -> Vec<DeadLetter> {
        self.parked.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for FakeStore {
    async fn append(&self, record: &RelayRecord) -> std::result::Result<(), StoreError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut records = self.records.lock().unwrap();
        let exists = records.iter().any(|r| {
            r.message_id == record.message_id
                && r.source_group_id == record.source_group_id
                && r.target_group_id == record.target_group_id
        });
        if exists {
            return Err(StoreError::Conflict);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn park(&self, letter: &DeadLetter) -> std::result::Result<(), StoreError> {
        self.parked.lock().unwrap().push(letter.clone());
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}

/// Operator that replays scripted answers and records everything it is told.
pub struct FakeOperator {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
    told: Mutex<Vec<String>>,
}

impl FakeOperator {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
            told: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn told(&self) -> Vec<String> {
        self.told.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for FakeOperator {
    async fn ask(&self, question: &str) -> Result<String> {
        self.asked.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::OperatorClosed)
    }

    async fn tell(&self, line: &str) -> Result<()> {
        self.told.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

pub fn group(id: i64, title: &str) -> PeerRef {
    PeerRef {
        id: PeerId(id),
        access_hash: id * 1000,
        title: title.to_string(),
        kind: PeerKind::Supergroup,
    }
}

/// `messages.getHistory` result holding `ids`, newest first as the platform sends them.
pub fn history(ids: &[i32]) -> Value {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let messages: Vec<Value> = sorted
        .iter()
        .map(|id| {
            json!({
                "_": "message",
                "id": id,
                "date": 1_700_000_000 + i64::from(*id),
                "message": format!("msg {id}"),
            })
        })
        .collect();
    json!({ "_": "messages.channelMessages", "messages": messages })
}

/// `messages.getDialogs` result listing `titles` as supergroups with ids 1..=n.
pub fn dialogs(titles: &[&str]) -> Value {
    let chats: Vec<Value> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            json!({
                "_": "channel",
                "id": i as i64 + 1,
                "access_hash": ((i as i64 + 1) * 1000).to_string(),
                "title": title,
                "megagroup": true,
            })
        })
        .collect();
    json!({ "_": "messages.dialogs", "dialogs": [], "chats": chats })
}

