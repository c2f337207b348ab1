//! Ingestion and retrieval orchestration
//!
//! Both flows are a sequential chain of awaits. Every I/O step runs through a
//! [`StepGuard`], which bounds it with a timeout and aborts it when the
//! caller's cancellation token fires.

mod ingest;
mod retrieve;

pub use ingest::*;
pub use retrieve::*;

use crate::config::Config;
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-step timeout plus cooperative cancellation
#[derive(Debug, Clone)]
pub struct StepGuard {
    timeout: Duration,
    token: CancellationToken,
}

impl StepGuard {
    pub fn new(timeout: Duration, token: CancellationToken) -> Self {
        Self { timeout, token }
    }

    /// Guard using the configured step timeout
    pub fn from_config(config: &Config, token: CancellationToken) -> Self {
        Self::new(config.timeouts.step(), token)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast if the operation was cancelled between steps
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Run one step, racing it against the timeout and the token
    pub async fn run<T, F>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        debug!(step, "Starting step");

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!(step, "Step cancelled");
                Err(Error::Cancelled)
            }
            outcome = tokio::time::timeout(self.timeout, fut) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(step, timeout_secs = self.timeout.as_secs_f64(), "Step timed out");
                    Err(Error::Timeout(step.to_string()))
                }
            },
        }
    }
}
