use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::SyncResult;
use crate::pipeline::SyncPipeline;
use crate::types::{ChangeEvent, LoopExit};

/// Idle interval after which a pass runs even without a change event.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(10);

/// Runs synchronization passes in response to change events and an idle timer.
///
/// Events that pile up while a pass is running collapse into one follow-up
/// pass. Passes never overlap and are never interrupted; cancellation is
/// observed between passes.
pub struct SyncLoop {
    pipeline: SyncPipeline,
    idle_interval: Duration,
}

impl SyncLoop {
    pub fn new(pipeline: SyncPipeline) -> Self {
        Self {
            pipeline,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    pub fn pipeline(&self) -> &SyncPipeline {
        &self.pipeline
    }

    /// Drive passes until `cancel` fires or a pass fails.
    ///
    /// A closed `changes` channel is not an exit condition; the loop keeps
    /// resyncing on the idle timer.
    pub async fn run(
        &self,
        mut changes: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
    ) -> SyncResult<LoopExit> {
        let mut ticker = time::interval_at(Instant::now() + self.idle_interval, self.idle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut changes_open = true;
        let mut passes = 0u64;

        info!(
            source = %self.pipeline.source().display(),
            idle_secs = self.idle_interval.as_secs_f64(),
            "sync loop started"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(passes, "sync loop cancelled");
                    return Ok(LoopExit::Cancelled { passes });
                }
                event = changes.recv(), if changes_open => match event {
                    Some(ChangeEvent) => {
                        let mut coalesced = 0usize;
                        while changes.try_recv().is_ok() {
                            coalesced += 1;
                        }
                        debug!(coalesced, "change detected");
                        "change"
                    }
                    None => {
                        debug!("change channel closed, continuing on idle timer");
                        changes_open = false;
                        continue;
                    }
                },
                _ = ticker.tick() => "idle",
            };

            match self.pipeline.run_pass().await {
                Ok(report) => {
                    passes += 1;
                    debug!(trigger, passes, uploaded = report.uploaded.len(), "pass finished");
                }
                Err(e) => {
                    error!(trigger, error = %e, "sync pass failed, stopping loop");
                    return Err(e);
                }
            }
            ticker.reset();
        }
    }
}
