//! Steady-state relay: poll the source, forward what is new, record it.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{DeadLetter, MessageId, PeerRef, RelayRecord, SourceMessage},
    recovery::Recovery,
    rpc::{
        tl::{self, method},
        RpcClient,
    },
    store::{self, MessageStore, Persisted},
    watermark::ForwardWatermark,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    /// Upper bound of messages fetched per poll.
    pub page_size: u32,
    /// Failed forwards of one message before it is dead-lettered.
    pub max_forward_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            page_size: 100,
            max_forward_attempts: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub forwarded: u64,
    pub dead_lettered: u64,
    pub persist_failures: u64,
}

/// What one poll did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub forwarded: usize,
    pub dead_lettered: usize,
}

pub struct RelayLoop {
    rpc: Arc<dyn RpcClient>,
    store: Arc<dyn MessageStore>,
    source: PeerRef,
    target: PeerRef,
    watermark: ForwardWatermark,
    cfg: RelayConfig,
    stats: RelayStats,
    pending: Option<PendingForward>,
}

/// Forward that has not gone through yet. Retries reuse its `random_id` so
/// the platform drops a repeat of a forward that did land.
#[derive(Clone, Copy, Debug)]
struct PendingForward {
    id: MessageId,
    random_id: i64,
    failures: u32,
}

impl RelayLoop {
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        store: Arc<dyn MessageStore>,
        source: PeerRef,
        target: PeerRef,
        watermark: ForwardWatermark,
        cfg: RelayConfig,
    ) -> Self {
        Self {
            rpc,
            store,
            source,
            target,
            watermark,
            cfg,
            stats: RelayStats::default(),
            pending: None,
        }
    }

    pub fn watermark(&self) -> MessageId {
        self.watermark.get(self.source.id)
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Poll forever. Only returns once recovery gives up.
    pub async fn run(&mut self, recovery: &mut Recovery) -> Result<()> {
        info!(
            source = %self.source.title,
            target = %self.target.title,
            watermark = self.watermark().0,
            "relay started"
        );
        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    recovery.reset();
                    if report.forwarded > 0 || report.dead_lettered > 0 {
                        info!(
                            forwarded = report.forwarded,
                            dead_lettered = report.dead_lettered,
                            watermark = self.watermark().0,
                            total_forwarded = self.stats.forwarded,
                            "relay cycle"
                        );
                    }
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => recovery.recover("relay", &e).await?,
            }
            sleep(self.cfg.poll_interval).await;
        }
    }

    /// Forward every message newer than the watermark, oldest first.
    ///
    /// A failed forward stops the cycle so ordering is kept; the message is
    /// retried next cycle with the same `random_id`. Rate limits and transient
    /// failures are left to recovery; any other error counts towards
    /// `max_forward_attempts`, after which the message is dead-lettered.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let batch = self.fetch_new().await?;
        report.fetched = batch.len();

        for msg in batch {
            let random_id = self.random_id_for(msg.id);
            let params = tl::forward_message(&self.source, &self.target, msg.id, random_id);
            match self.rpc.call(method::FORWARD_MESSAGES, params).await {
                Ok(_) => {
                    self.pending = None;
                    debug!(message_id = msg.id.0, "forwarded");
                    let record = RelayRecord::new(&msg, &self.source, &self.target);
                    if store::persist(self.store.as_ref(), &record).await == Persisted::Failed {
                        self.stats.persist_failures += 1;
                    }
                    self.watermark.advance(self.source.id, msg.id);
                    self.stats.forwarded += 1;
                    report.forwarded += 1;
                }
                Err(e) if e.is_rate_limited() || e.is_transient() => {
                    debug!(message_id = msg.id.0, error = %e, "forward interrupted");
                    return Err(e.into());
                }
                Err(e) => {
                    let attempts = self.record_failure(msg.id);
                    if attempts < self.cfg.max_forward_attempts {
                        warn!(message_id = msg.id.0, attempts, error = %e, "forward failed");
                        return Err(e.into());
                    }
                    self.dead_letter(&msg, attempts, e.to_string()).await;
                    report.dead_lettered += 1;
                }
            }
        }
        Ok(report)
    }

    /// The oldest `page_size` messages above the watermark, oldest first.
    async fn fetch_new(&self) -> Result<Vec<SourceMessage>> {
        let after = self.watermark();
        let params = tl::get_history_after(&self.source, self.cfg.page_size, after);
        let v = self.rpc.call(method::GET_HISTORY, params).await?;
        let mut messages: Vec<SourceMessage> = tl::parse_messages(&v)?
            .into_iter()
            .filter(|m| m.id > after)
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    fn random_id_for(&mut self, id: MessageId) -> i64 {
        match self.pending {
            Some(pending) if pending.id == id => pending.random_id,
            _ => {
                let random_id = rand::random();
                self.pending = Some(PendingForward {
                    id,
                    random_id,
                    failures: 0,
                });
                random_id
            }
        }
    }

    fn record_failure(&mut self, id: MessageId) -> u32 {
        match self.pending.as_mut() {
            Some(pending) if pending.id == id => {
                pending.failures += 1;
                pending.failures
            }
            _ => 1,
        }
    }

    async fn dead_letter(&mut self, msg: &SourceMessage, attempts: u32, last_error: String) {
        error!(message_id = msg.id.0, attempts, error = %last_error, "giving up on message");
        let letter = DeadLetter {
            record: RelayRecord::new(msg, &self.source, &self.target),
            attempts,
            last_error,
        };
        if let Err(e) = self.store.park(&letter).await {
            warn!(message_id = msg.id.0, error = %e, "failed to park message");
        }
        self.pending = None;
        self.watermark.advance(self.source.id, msg.id);
        self.stats.dead_lettered += 1;
    }
}
