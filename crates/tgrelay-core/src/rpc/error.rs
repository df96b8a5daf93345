use std::sync::OnceLock;

use regex::Regex;

use crate::rate_limit::FloodWait;

pub const SEE_OTHER: i32 = 303;
pub const UNAUTHORIZED: i32 = 401;
pub const FLOOD: i32 = 420;

/// Local pseudo-codes for failures that never reached the platform.
pub const NETWORK_FAILURE: i32 = -500;
pub const CALL_TIMEOUT: i32 = -503;

static MIGRATE_RE: OnceLock<Regex> = OnceLock::new();

/// Error returned by the platform (or by the transport on its behalf).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(CALL_TIMEOUT, "RPC_CALL_TIMEOUT")
    }

    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::new(NETWORK_FAILURE, format!("NETWORK_ERROR: {detail}"))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == FLOOD
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == UNAUTHORIZED
    }

    pub fn is_password_needed(&self) -> bool {
        self.message == "SESSION_PASSWORD_NEEDED"
    }

    /// Platform-issued wait of a 420 error, if it carries one.
    pub fn flood_wait(&self) -> Option<FloodWait> {
        if !self.is_rate_limited() {
            return None;
        }
        FloodWait::from_error(self)
    }

    /// Network hiccups, timeouts and server-side failures.
    pub fn is_transient(&self) -> bool {
        self.code < 0 || self.code >= 500
    }

    /// Target datacenter of a `*_MIGRATE_<n>` redirect.
    pub fn migrate_dc(&self) -> Option<u32> {
        if self.code != SEE_OTHER {
            return None;
        }
        let re = MIGRATE_RE.get_or_init(|| {
            Regex::new(r"^(?:PHONE|NETWORK|USER|FILE|STATS)_MIGRATE_(\d+)$").expect("valid regex")
        });
        re.captures(&self.message)?.get(1)?.as_str().parse().ok()
    }
}
