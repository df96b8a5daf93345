use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::warn;

use crate::rpc::{RpcClient, RpcError};

#[derive(Clone, Copy, Debug)]
pub struct GuardConfig {
    /// Minimum spacing between any two calls (client-side flood control).
    pub min_interval: Duration,
    /// Upper bound for a single call.
    pub call_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(0),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// RpcClient decorator that spaces calls and bounds each one with a timeout.
///
/// An elapsed timeout surfaces as the transient `RPC_CALL_TIMEOUT` error so the
/// recovery policy treats it like any other network failure.
pub struct GuardedRpc {
    inner: Arc<dyn RpcClient>,
    cfg: GuardConfig,
    limiter: Mutex<IntervalLimiter>,
}

impl GuardedRpc {
    pub fn new(inner: Arc<dyn RpcClient>, cfg: GuardConfig) -> Self {
        Self {
            inner,
            cfg,
            limiter: Mutex::new(IntervalLimiter::new(cfg.min_interval)),
        }
    }
}

#[async_trait]
impl RpcClient for GuardedRpc {
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, RpcError> {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }

        match timeout(self.cfg.call_timeout, self.inner.call(method, params)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(
                    method,
                    timeout_ms = self.cfg.call_timeout.as_millis() as u64,
                    "rpc call timed out"
                );
                Err(RpcError::timeout())
            }
        }
    }

    fn set_default_dc(&self, dc_id: u32) {
        self.inner.set_default_dc(dc_id);
    }

    fn default_dc(&self) -> Option<u32> {
        self.inner.default_dc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRpc;
    use serde_json::json;

    struct HangingRpc;

    #[async_trait]
    impl RpcClient for HangingRpc {
        async fn call(
            &self,
            _method: &str,
            _params: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, RpcError> {
            std::future::pending().await
        }

        fn set_default_dc(&self, _dc_id: u32) {}

        fn default_dc(&self) -> Option<u32> {
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_becomes_transient_timeout() {
        let rpc = GuardedRpc::new(
            Arc::new(HangingRpc),
            GuardConfig {
                min_interval: Duration::from_millis(0),
                call_timeout: Duration::from_secs(2),
            },
        );

        let err = rpc.call("updates.getState", json!({})).await.unwrap_err();
        assert_eq!(err, RpcError::timeout());
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_consecutive_calls() {
        let fake = Arc::new(FakeRpc::new());
        fake.always("updates.getState", Ok(json!({})));
        let rpc = GuardedRpc::new(
            fake.clone(),
            GuardConfig {
                min_interval: Duration::from_millis(500),
                call_timeout: Duration::from_secs(5),
            },
        );

        let start = Instant::now();
        for _ in 0..3 {
            rpc.call("updates.getState", json!({})).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(fake.call_count("updates.getState"), 3);
    }

    #[tokio::test]
    async fn forwards_datacenter_changes() {
        let fake = Arc::new(FakeRpc::new());
        let rpc = GuardedRpc::new(fake.clone(), GuardConfig::default());
        rpc.set_default_dc(4);
        assert_eq!(fake.default_dc(), Some(4));
        assert_eq!(rpc.default_dc(), Some(4));
    }
}
