//! Port for the MTProto transport.
//!
//! The relay never speaks the wire protocol itself: it hands a method name and
//! a JSON parameter object to an [`RpcClient`] and gets a JSON result or a
//! platform error back.

use async_trait::async_trait;

pub mod error;
pub mod guard;
pub mod tl;

pub use error::RpcError;
pub use guard::{GuardConfig, GuardedRpc};

/// Hexagonal port for platform RPC.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, RpcError>;

    /// Rebind subsequent calls to another datacenter.
    fn set_default_dc(&self, dc_id: u32);

    fn default_dc(&self) -> Option<u32>;
}
