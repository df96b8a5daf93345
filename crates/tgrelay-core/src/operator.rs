use async_trait::async_trait;

use crate::Result;

/// Port for the human at the terminal.
///
/// `ask` returns one line of input (without the trailing newline) and fails
/// with [`crate::Error::OperatorClosed`] once input is exhausted.
#[async_trait]
pub trait Operator: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
    async fn tell(&self, line: &str) -> Result<()>;
}
