//! Flood-wait interpretation.
//!
//! The platform answers over-eager clients with `420 FLOOD_WAIT_<seconds>`.
//! The wait is reported to the operator in whole minutes; the relay itself
//! suspends for the exact number of seconds plus a small safety margin.

use std::{sync::OnceLock, time::Duration};

use regex::Regex;

use crate::rpc::RpcError;

/// Extra seconds added on top of the platform-issued wait.
pub const SAFETY_MARGIN_SECS: u64 = 5;

static FLOOD_WAIT_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FloodWait {
    pub seconds: u64,
}

impl FloodWait {
    /// `None` when the reason does not encode a flood wait.
    pub fn parse(reason: &str) -> Option<Self> {
        let re = FLOOD_WAIT_RE.get_or_init(|| {
            Regex::new(r"^FLOOD_(?:PREMIUM_)?WAIT_(\d+)$").expect("valid regex")
        });
        let seconds = re.captures(reason)?.get(1)?.as_str().parse().ok()?;
        Some(Self { seconds })
    }

    pub fn from_error(err: &RpcError) -> Option<Self> {
        Self::parse(&err.message)
    }

    /// Wait rounded up to whole minutes, never less than one.
    pub fn operator_minutes(&self) -> u64 {
        self.seconds.div_ceil(60).max(1)
    }

    /// How long the relay actually sleeps before retrying.
    pub fn suspend(&self) -> Duration {
        Duration::from_secs(self.seconds.saturating_add(SAFETY_MARGIN_SECS))
    }

    pub fn operator_notice(&self) -> String {
        let minutes = self.operator_minutes();
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        format!(
            "Telegram is rate limiting requests; waiting {minutes} {unit} before retrying. \
             This protects against spam. Press Ctrl+C to exit."
        )
    }
}
