use async_trait::async_trait;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout},
    sync::Mutex,
};

use tgrelay_core::{errors::Error, operator::Operator, Result};

/// Line-based operator on the process's stdin/stdout.
pub struct StdinOperator {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    out: Mutex<Stdout>,
}

impl StdinOperator {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(io::stdin()).lines()),
            out: Mutex::new(io::stdout()),
        }
    }

    async fn write(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

impl Default for StdinOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for StdinOperator {
    async fn ask(&self, question: &str) -> Result<String> {
        self.write(question).await?;
        match self.lines.lock().await.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(Error::OperatorClosed),
        }
    }

    async fn tell(&self, line: &str) -> Result<()> {
        self.write(&format!("{line}\n")).await
    }
}
