//! Interval worker running automation passes in the background

use super::runner::{AutomationRunner, RunRequest};
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{error, info};

/// Automation worker
pub struct AutomationWorker {
    runner: Arc<AutomationRunner>,
    /// Interval between passes (seconds)
    poll_interval_secs: u64,
    test_mode: bool,
}

impl AutomationWorker {
    pub fn new(runner: Arc<AutomationRunner>) -> Self {
        Self {
            runner,
            poll_interval_secs: 300,
            test_mode: false,
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Run passes forever; a failed pass is logged and the next tick retried
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Automation worker started (interval: {}s, test mode: {})",
            self.poll_interval_secs, self.test_mode
        );

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let request = RunRequest {
            campaign_id: None,
            test_mode: self.test_mode,
        };
        if let Err(e) = self.runner.run(request).await {
            error!("Error running automation pass: {}", e);
        }
    }
}
