//! MTProto bridge adapter.
//!
//! The wire protocol lives in a sidecar process. This crate forwards each RPC
//! as one JSON `POST {url}/call` and maps the reply back onto [`RpcError`].

use std::{path::PathBuf, sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tgrelay_core::{
    config::Config,
    errors::Error,
    rpc::{RpcClient, RpcError},
    Result,
};

/// Connection identity sent with every call (`initConnection` on the platform side).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub lang_code: String,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub url: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,
    pub client: ClientInfo,
    /// HTTP-level timeout; kept above the per-call guard timeout.
    pub http_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            url: cfg.rpc_bridge_url.trim_end_matches('/').to_string(),
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            session_file: cfg.session_file.clone(),
            client: ClientInfo {
                device_model: cfg.device_model.clone(),
                system_version: cfg.system_version.clone(),
                app_version: cfg.app_version.clone(),
                lang_code: cfg.lang_code.clone(),
            },
            http_timeout: cfg.rpc_timeout + Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    api_id: i32,
    api_hash: &'a str,
    session_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dc: Option<u32>,
    client: &'a ClientInfo,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct BridgeClient {
    cfg: BridgeConfig,
    http: reqwest::Client,
    dc: Mutex<Option<u32>>,
}

impl BridgeClient {
    pub fn new(cfg: BridgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::External(format!("bridge http client error: {e}")))?;
        Ok(Self {
            cfg,
            http,
            dc: Mutex::new(None),
        })
    }

    fn envelope<'a>(&'a self, method: &'a str, params: Value) -> Envelope<'a> {
        Envelope {
            api_id: self.cfg.api_id,
            api_hash: &self.cfg.api_hash,
            session_file: self.cfg.session_file.display().to_string(),
            dc: self.default_dc(),
            client: &self.cfg.client,
            method,
            params,
        }
    }
}

#[async_trait]
impl RpcClient for BridgeClient {
    async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        debug!(method, "bridge call");
        let resp = self
            .http
            .post(format!("{}/call", self.cfg.url))
            .json(&self.envelope(method, params))
            .send()
            .await
            .map_err(RpcError::network)?;

        let status = resp.status();
        let body = resp.text().await.map_err(RpcError::network)?;
        match serde_json::from_str::<Reply>(&body) {
            Ok(reply) => decode_reply(reply),
            Err(_) if status.is_server_error() => Err(RpcError::new(
                i32::from(status.as_u16()),
                format!("BRIDGE_HTTP_{}", status.as_u16()),
            )),
            Err(e) => Err(RpcError::network(format!(
                "bridge returned {status}: {e}: {}",
                body.chars().take(200).collect::<String>()
            ))),
        }
    }

    fn set_default_dc(&self, dc_id: u32) {
        if let Ok(mut dc) = self.dc.lock() {
            *dc = Some(dc_id);
        }
    }

    fn default_dc(&self) -> Option<u32> {
        self.dc.lock().ok().and_then(|dc| *dc)
    }
}

fn decode_reply(reply: Reply) -> std::result::Result<Value, RpcError> {
    if reply.ok {
        return Ok(reply.result);
    }
    Err(RpcError::new(
        reply.error_code.unwrap_or(500),
        reply
            .error_message
            .unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
    ))
}
