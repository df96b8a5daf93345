use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    domain::{PeerKind, PeerRef},
    errors::Error,
    operator::Operator,
    rpc::{
        tl::{self, method},
        RpcClient,
    },
    Result,
};

/// Lists the account's groups and channels and lets the operator pick one.
pub struct GroupSelector {
    rpc: Arc<dyn RpcClient>,
    dialog_limit: u32,
    /// `None` keeps asking forever.
    max_attempts: Option<u32>,
}

impl GroupSelector {
    pub fn new(rpc: Arc<dyn RpcClient>, dialog_limit: u32, max_attempts: Option<u32>) -> Self {
        Self {
            rpc,
            dialog_limit,
            max_attempts,
        }
    }

    pub async fn list(&self) -> Result<Vec<PeerRef>> {
        let v = self
            .rpc
            .call(method::GET_DIALOGS, tl::get_dialogs(self.dialog_limit))
            .await?;
        let peers = tl::parse_dialog_chats(&v);
        debug!(count = peers.len(), "listed groups");
        if peers.is_empty() {
            return Err(Error::NoGroupsFound);
        }
        Ok(peers)
    }

    /// Show the numbered list and read a 1-based choice until one is valid.
    pub async fn select(&self, prompt: &str, operator: &dyn Operator) -> Result<PeerRef> {
        let peers = self.list().await?;

        operator.tell("").await?;
        operator.tell(prompt).await?;
        for (i, peer) in peers.iter().enumerate() {
            operator
                .tell(&format!("{}. {} ({})", i + 1, peer.title, peer.kind.label()))
                .await?;
        }

        let mut invalid = 0u32;
        loop {
            let answer = operator
                .ask(&format!("Enter a number (1-{}): ", peers.len()))
                .await?;
            if let Some(idx) = parse_selection(&answer, peers.len()) {
                let peer = self.resolve_access_hash(peers[idx].clone()).await?;
                info!(peer_id = peer.id.0, title = %peer.title, "group selected");
                return Ok(peer);
            }

            invalid += 1;
            if self.max_attempts.is_some_and(|max| invalid >= max) {
                return Err(Error::SelectionInvalid { attempts: invalid });
            }
            operator.tell("Invalid selection. Try again.").await?;
        }
    }

    /// Fill in a channel access hash that the dialog list left out.
    pub async fn resolve_access_hash(&self, mut peer: PeerRef) -> Result<PeerRef> {
        if peer.kind == PeerKind::BasicGroup || peer.access_hash != 0 {
            return Ok(peer);
        }
        let v = self
            .rpc
            .call(method::GET_CHANNELS, tl::get_channels(peer.id))
            .await?;
        peer.access_hash = tl::parse_channel_access_hash(&v)?;
        Ok(peer)
    }
}

/// Parse a 1-based choice into an index below `len`.
pub fn parse_selection(input: &str, len: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}
