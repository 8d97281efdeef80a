//! Bounded polling with cooperative cancellation.
//!
//! Every wait in a mission is a probe repeated at a fixed interval until it
//! yields a value, the deadline passes, or the operator cancels. Cancellation
//! is observed between probes, never in the middle of one.

use std::future::Future;
use std::time::Duration;
use survey_core::MissionError;
use survey_vehicle::VehicleError;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    #[error("{what} not satisfied within {timeout:?}")]
    TimedOut {
        what: &'static str,
        timeout: Duration,
    },
    #[error("cancelled while waiting for {what}")]
    Cancelled { what: &'static str },
    /// The operator asked for the vehicle to come home.
    #[error("return requested while waiting for {what}")]
    ReturnRequested { what: &'static str },
    #[error("{0}")]
    Fault(String),
    #[error(transparent)]
    Vehicle(#[from] VehicleError),
}

impl From<PollError> for MissionError {
    fn from(err: PollError) -> Self {
        let message = err.to_string();
        match err {
            PollError::TimedOut { .. } => MissionError::precondition_timeout(message),
            PollError::Cancelled { .. } | PollError::ReturnRequested { .. } => {
                MissionError::cancelled(message)
            }
            PollError::Fault(_) | PollError::Vehicle(_) => {
                MissionError::collaborator_fault(message)
            }
        }
    }
}

/// Receiving side of a cancellation request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl From<watch::Receiver<bool>> for CancelToken {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken::from(rx))
}

/// Runs `probe` every `policy.interval` until it returns `Some`.
///
/// The probe runs at least once, and once more at the deadline, so a
/// condition that becomes true exactly at the timeout still counts.
pub async fn poll_until<T, F, Fut>(
    what: &'static str,
    policy: PollPolicy,
    cancel: &CancelToken,
    mut probe: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, PollError>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled { what });
        }
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut {
                what,
                timeout: policy.timeout,
            });
        }
        sleep(policy.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(interval_ms: u64, timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_satisfied_probe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = poll_until("third call", policy(1_000, 10_000), &CancelToken::never(), || {
            let counter = Arc::clone(&counter);
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, PollError>((call == 3).then_some(call))
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_probing_at_the_deadline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();
        let err = poll_until("never", policy(1_000, 5_000), &CancelToken::never(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<Option<()>, PollError>(None)
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { what: "never", .. }));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_next_probe() {
        let (handle, token) = cancellation();
        handle.cancel();
        let err = poll_until("anything", policy(1_000, 5_000), &token, || async {
            Ok::<Option<()>, PollError>(Some(()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, PollError::Cancelled { what: "anything" });
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_propagate() {
        let err = poll_until("link", policy(1_000, 5_000), &CancelToken::never(), || async {
            Err::<Option<()>, PollError>(VehicleError::ConnectionLost.into())
        })
        .await
        .unwrap_err();
        assert_eq!(err, PollError::Vehicle(VehicleError::ConnectionLost));
    }

    #[test]
    fn poll_errors_map_to_mission_codes() {
        use survey_core::ErrorCode;
        let timeout: MissionError = PollError::TimedOut {
            what: "health",
            timeout: Duration::from_secs(5),
        }
        .into();
        assert_eq!(timeout.code, ErrorCode::PreconditionTimeout);
        let cancelled: MissionError = PollError::Cancelled { what: "arming" }.into();
        assert_eq!(cancelled.code, ErrorCode::Cancelled);
        let recalled: MissionError = PollError::ReturnRequested { what: "hold" }.into();
        assert_eq!(recalled.code, ErrorCode::Cancelled);
        assert!(recalled.message.starts_with("return requested"));
        let fault: MissionError = PollError::Vehicle(VehicleError::ConnectionLost).into();
        assert_eq!(fault.code, ErrorCode::CollaboratorFault);
        assert!(fault.message.contains("link lost"));
    }
}
