//! Wall-clock driver for a session.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::clock::Phase;
use crate::error::SessionError;
use crate::session::ExamSession;

/// Tick `session` once per `period` until it reaches a terminal phase.
///
/// Returns the terminal phase. A persistence failure raised by an automatic
/// submission ends the loop with that error; a retryable one is left for the
/// examinee to resolve and the countdown keeps running.
pub async fn run_clock(session: Arc<ExamSession>, period: Duration) -> Result<Phase, SessionError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    loop {
        let phase = session.phase();
        if phase.is_terminal() {
            debug!(%phase, "clock stopped");
            return Ok(phase);
        }

        ticker.tick().await;
        match session.tick().await {
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                debug!("automatic submission will be retried: {e}");
            }
            Err(e) => return Err(e),
        }
    }
}
