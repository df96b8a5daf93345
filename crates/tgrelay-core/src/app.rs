//! Application wiring: login, pick the two groups, seed the watermark, relay.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::AuthSession,
    config::Config,
    domain::PeerRef,
    operator::Operator,
    recovery::{Recovery, RecoveryPolicy},
    relay::RelayLoop,
    rpc::RpcClient,
    selector::GroupSelector,
    store::MessageStore,
    watermark::ForwardWatermark,
    Result,
};

pub struct App {
    cfg: Arc<Config>,
    rpc: Arc<dyn RpcClient>,
    store: Arc<dyn MessageStore>,
    operator: Arc<dyn Operator>,
}

impl App {
    pub fn new(
        cfg: Arc<Config>,
        rpc: Arc<dyn RpcClient>,
        store: Arc<dyn MessageStore>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            cfg,
            rpc,
            store,
            operator,
        }
    }

    /// Runs until recovery gives up or operator input closes.
    pub async fn run(&self) -> Result<()> {
        let mut recovery = Recovery::new(RecoveryPolicy::new(self.cfg.recovery()));

        let mut auth = AuthSession::new(self.rpc.clone(), self.cfg.credentials());
        auth.login(self.operator.as_ref(), &mut recovery).await?;
        recovery.reset();

        let selector = GroupSelector::new(
            self.rpc.clone(),
            self.cfg.dialog_limit,
            self.cfg.selection_max_attempts,
        );
        let source = self
            .select(
                &selector,
                "Select the SOURCE group (copy from):",
                &mut recovery,
            )
            .await?;
        let target = self
            .select(
                &selector,
                "Select the TARGET group (send to):",
                &mut recovery,
            )
            .await?;
        if source.id == target.id {
            warn!(peer_id = source.id.0, "source and target are the same group");
        }

        let mut watermark = ForwardWatermark::new();
        let last = watermark
            .initialize(
                self.rpc.as_ref(),
                self.store.as_ref(),
                &source,
                &target,
                self.cfg.history_page_size,
            )
            .await;

        self.operator
            .tell(&format!(
                "Relaying new messages from \"{}\" to \"{}\" (after message {}).",
                source.title, target.title, last.0
            ))
            .await?;
        info!(
            source_id = source.id.0,
            target_id = target.id.0,
            last_id = last.0,
            "starting relay"
        );

        let mut relay = RelayLoop::new(
            self.rpc.clone(),
            self.store.clone(),
            source,
            target,
            watermark,
            self.cfg.relay(),
        );
        relay.run(&mut recovery).await
    }

    async fn select(
        &self,
        selector: &GroupSelector,
        prompt: &str,
        recovery: &mut Recovery,
    ) -> Result<PeerRef> {
        loop {
            match selector.select(prompt, self.operator.as_ref()).await {
                Ok(peer) => {
                    recovery.reset();
                    return Ok(peer);
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    self.operator
                        .tell(&format!("Could not select a group: {e}"))
                        .await?;
                    recovery.recover("select", &e).await?;
                }
            }
        }
    }
}
