use std::collections::HashMap;

use tracing::{info, warn};

use crate::{
    domain::{MessageId, PeerId, PeerRef, RelayRecord},
    rpc::{
        tl::{self, method},
        RpcClient,
    },
    store::{self, MessageStore},
    Result,
};

/// Highest message id already handled, per source peer.
#[derive(Clone, Debug, Default)]
pub struct ForwardWatermark {
    last: HashMap<PeerId, MessageId>,
}

impl ForwardWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// `MessageId(0)` for a peer that has not been seen yet.
    pub fn get(&self, peer: PeerId) -> MessageId {
        self.last.get(&peer).copied().unwrap_or_default()
    }

    /// Move the watermark forward. Returns `false` (and changes nothing) when
    /// `id` is not greater than the current value.
    pub fn advance(&mut self, peer: PeerId, id: MessageId) -> bool {
        let current = self.last.entry(peer).or_default();
        if id > *current {
            *current = id;
            true
        } else {
            false
        }
    }

    /// Seed the watermark from the newest history page of `source`.
    ///
    /// Every message of the page is recorded (oldest first) as already relayed
    /// to `target`. Failures are logged and leave the watermark unchanged.
    /// Returns the watermark afterwards.
    pub async fn initialize(
        &mut self,
        rpc: &dyn RpcClient,
        store: &dyn MessageStore,
        source: &PeerRef,
        target: &PeerRef,
        page_size: u32,
    ) -> MessageId {
        match load_history(rpc, store, source, target, page_size).await {
            Ok(newest) => {
                self.advance(source.id, newest);
                info!(
                    peer_id = source.id.0,
                    newest = newest.0,
                    watermark = self.get(source.id).0,
                    "history loaded"
                );
            }
            Err(e) => {
                warn!(
                    peer_id = source.id.0,
                    error = %e,
                    "failed to load history; keeping current watermark"
                );
            }
        }
        self.get(source.id)
    }
}

async fn load_history(
    rpc: &dyn RpcClient,
    store: &dyn MessageStore,
    source: &PeerRef,
    target: &PeerRef,
    page_size: u32,
) -> Result<MessageId> {
    let v = rpc
        .call(
            method::GET_HISTORY,
            tl::get_history(source, page_size, MessageId::default()),
        )
        .await?;
    let mut messages = tl::parse_messages(&v)?;
    messages.sort_by_key(|m| m.id);

    for msg in &messages {
        store::persist(store, &RelayRecord::new(msg, source, target)).await;
    }
    Ok(messages.last().map(|m| m.id).unwrap_or_default())
}
