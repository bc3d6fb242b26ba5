//! Single-flight interval scheduler.

use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

/// Run `pass` once immediately and then once per `period` until `shutdown`
/// resolves. Returns the number of passes that completed.
///
/// Each pass is awaited before the next tick is taken, and ticks missed while
/// a pass was running are skipped, so passes never overlap. When `shutdown`
/// fires mid-pass the pass future is dropped.
pub async fn run_scheduled<F, Fut, S>(period: Duration, mut pass: F, shutdown: S) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut completed = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut shutdown => {
                log::warn!("Shutdown requested, abandoning the running pass");
                break;
            }
            _ = pass() => completed += 1,
        }
    }
    completed
}
