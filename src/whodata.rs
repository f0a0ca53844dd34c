//! Whodata healthcheck handshake. Grounded in `audit_health_check`/
//! `audit_healthcheck_thread`: before trusting the whodata source, create a
//! sentinel file repeatedly under a dedicated directory for up to N
//! seconds and declare the source live iff the corresponding event is
//! observed by the real audit reader before the timer expires. The audit
//! socket itself is an external collaborator; this module only implements
//! the handshake's pass/fail state machine and timing so the embedding
//! process can drive it with a real event source.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum HealthcheckError {
    #[error("IO error writing sentinel file {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthcheckOutcome {
    /// The audit event for the sentinel file was observed before timeout.
    Live,
    /// The timer expired with no observed event; fall back to
    /// scheduled-only monitoring for this root.
    TimedOut,
}

/// A handle the caller signals once it observes an audit event
/// corresponding to a path this handshake created.
pub struct HealthcheckSignal {
    sender: mpsc::Sender<PathBuf>,
}

impl HealthcheckSignal {
    pub fn notify_observed(&self, path: PathBuf) {
        let _ = self.sender.send(path);
    }
}

/// Runs the handshake: writes `sentinel_file` repeatedly (once per second,
/// matching the source's `sleep(1)` cadence) for up to `timeout`, waiting
/// for the caller to report that the corresponding audit event arrived.
/// Returns a [`HealthcheckSignal`] via `make_signal` so callers can wire it
/// to a real audit reader before calling this function, since the
/// handshake and the reader run concurrently in the original design.
pub fn run_handshake<F>(
    sentinel_file: &Path,
    timeout: Duration,
    signal: mpsc::Receiver<PathBuf>,
    mut write_sentinel: F,
) -> Result<HealthcheckOutcome, HealthcheckError>
where
    F: FnMut() -> std::io::Result<()>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Err(e) = write_sentinel() {
            return Err(HealthcheckError::Io(sentinel_file.to_path_buf(), e));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(HealthcheckOutcome::TimedOut);
        }

        match signal.recv_timeout(Duration::from_secs(1).min(remaining)) {
            Ok(observed) if observed == sentinel_file => {
                let _ = std::fs::remove_file(sentinel_file);
                return Ok(HealthcheckOutcome::Live);
            }
            Ok(_other) => continue,
            Err(RecvTimeoutError::Timeout) => {
                if Instant::now() >= deadline {
                    let _ = std::fs::remove_file(sentinel_file);
                    return Ok(HealthcheckOutcome::TimedOut);
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = std::fs::remove_file(sentinel_file);
                return Ok(HealthcheckOutcome::TimedOut);
            }
        }
    }
}

/// Convenience constructor for the channel half handed to the audit
/// reader thread/task.
pub fn make_signal_channel() -> (HealthcheckSignal, mpsc::Receiver<PathBuf>) {
    let (tx, rx) = mpsc::channel();
    (HealthcheckSignal { sender: tx }, rx)
}
