//! Time ceilings for external processes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A cancellation token that fires once a fixed ceiling has elapsed.
///
/// The timer starts on construction. Dropping the deadline stops the timer
/// without cancelling the token.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    ceiling: Duration,
    timer: JoinHandle<()>,
}

impl Deadline {
    /// Starts a deadline that expires after `ceiling`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn after(ceiling: Duration) -> Self {
        let token = CancellationToken::new();
        let timer_token = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            timer_token.cancel();
        });

        Self {
            token,
            ceiling,
            timer,
        }
    }

    /// The configured ceiling.
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Resolves when the ceiling is reached.
    pub async fn expired(&self) {
        self.token.cancelled().await
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
