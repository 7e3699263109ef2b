use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::journal::{follow_journal, spawn_journal};
use crate::tail::FileTailer;

/// Where log lines are currently coming from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceState {
    /// No source could be acquired; retrying on a timer.
    Disabled,
    /// Following the journald unit.
    UsingProcess,
    /// Polling the log file.
    UsingFile,
}

/// Tuning knobs for the source reader.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// Log file used when journald is unavailable.
    pub log_path: PathBuf,

    /// systemd unit whose journal is the preferred line source.
    pub journal_unit: String,

    /// Delay between losing the process source and activating the
    /// fallback.
    pub fallback_delay: Duration,

    /// How often the file tailer checks for new bytes.
    pub poll_interval: Duration,

    /// How often a degraded reader re-attempts the preferred source.
    pub retry_interval: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/relay-server.log"),
            journal_unit: "relay-server".to_string(),
            fallback_delay: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            retry_interval: Duration::from_secs(60),
        }
    }
}

/// Produces an ordered stream of raw log lines from whichever source is
/// available, preferring the journald unit and falling back to the log
/// file. Exactly one source is active at any time; losing every source
/// degrades to a timed retry loop, never a crash.
pub struct SourceReader {
    settings: SourceSettings,

    /// Kept across state transitions so the file offset survives a
    /// temporary switch back to the process source.
    tailer: FileTailer,
}

impl SourceReader {
    pub fn new(settings: SourceSettings) -> Self {
        let tailer = FileTailer::new(&settings.log_path);
        Self { settings, tailer }
    }

    /// Run until cancelled, sending lines through `tx`. Source failures
    /// are logged and recovered; they never propagate.
    pub async fn run(mut self, tx: UnboundedSender<String>, cancel: CancellationToken) {
        let mut state = SourceState::UsingProcess;

        while !cancel.is_cancelled() {
            state = match state {
                SourceState::UsingProcess => self.run_process(&tx, &cancel).await,
                SourceState::UsingFile => self.run_file(&tx, &cancel).await,
                SourceState::Disabled => self.run_disabled(&cancel).await,
            };
        }

        debug!("source reader stopped");
    }

    /// Follow the journald unit; on spawn failure or process exit, wait
    /// out the fallback delay and hand over to the file source.
    async fn run_process(
        &mut self,
        tx: &UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> SourceState {
        match spawn_journal(&self.settings.journal_unit) {
            Ok(child) => {
                info!(unit = %self.settings.journal_unit, "following journald unit");
                follow_journal(child, tx, cancel).await;
                if cancel.is_cancelled() {
                    return SourceState::UsingProcess;
                }
                warn!(unit = %self.settings.journal_unit, "journald source ended, falling back");
            }
            Err(e) => {
                warn!(error = %e, "journalctl unavailable, falling back");
            }
        }

        sleep_unless_cancelled(self.settings.fallback_delay, cancel).await;
        self.fallback_state()
    }

    /// Poll the file tailer, periodically returning to re-attempt the
    /// journald source. The tailer keeps its offset across the attempt.
    async fn run_file(
        &mut self,
        tx: &UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> SourceState {
        info!(path = %self.settings.log_path.display(), "tailing log file");

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry = tokio::time::interval_at(
            Instant::now() + self.settings.retry_interval,
            self.settings.retry_interval,
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SourceState::UsingFile,
                _ = retry.tick() => {
                    debug!("re-attempting journald source");
                    return SourceState::UsingProcess;
                }
                _ = poll.tick() => {
                    match self.tailer.poll().await {
                        Ok(lines) => {
                            for line in lines {
                                if tx.send(line).is_err() {
                                    return SourceState::Disabled;
                                }
                            }
                        }
                        Err(e) => {
                            // Transient read failure; the next poll retries.
                            debug!(error = %e, "log file poll failed");
                        }
                    }
                }
            }
        }
    }

    /// Nothing to read from. Sleep, then try the preferred source again.
    async fn run_disabled(&mut self, cancel: &CancellationToken) -> SourceState {
        sleep_unless_cancelled(self.settings.retry_interval, cancel).await;
        SourceState::UsingProcess
    }

    fn fallback_state(&self) -> SourceState {
        if self.settings.log_path.exists() {
            SourceState::UsingFile
        } else {
            warn!(
                path = %self.settings.log_path.display(),
                "log file missing, monitoring disabled until a source appears"
            );
            SourceState::Disabled
        }
    }
}

async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
