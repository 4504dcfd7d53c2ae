//! Environmental monitors (C8): independent producers, each on its own
//! cadence, writing into a shared process-local snapshot read by the
//! trigger evaluator. A monitor never causes a state transition; it only
//! feeds evaluation, and a crash in one monitor must not affect the
//! others or the scheduler loop — it simply leaves its last known value
//! in place and restarts.

mod satellite;
mod terminal;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use leoscope_core::model::Coords;
use leoscope_core::trigger::Snapshot;

pub type SharedSnapshot = Arc<RwLock<Snapshot>>;

pub async fn read_snapshot(shared: &SharedSnapshot) -> Snapshot {
    shared.read().await.clone()
}

/// Starts all three monitors as crash-isolated background tasks and
/// returns their join handles (owned by the caller so a clean shutdown
/// can await them).
pub fn spawn_all(
    coords: Coords,
    shared: SharedSnapshot,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        spawn_isolated(
            "monitor.satellite",
            Duration::from_secs(2),
            shutdown.clone(),
            move |snap| satellite::sample(coords, snap),
            shared.clone(),
        ),
        spawn_isolated(
            "monitor.weather",
            Duration::from_secs(60),
            shutdown.clone(),
            weather::sample,
            shared.clone(),
        ),
        spawn_isolated(
            "monitor.terminal",
            Duration::from_secs(1),
            shutdown,
            terminal::sample,
            shared,
        ),
    ]
}

/// Runs `sample_once` on a fixed tick forever. If it panics, the task
/// logs the panic and keeps ticking on the last known snapshot value
/// rather than propagating the failure — per the crash-isolation
/// requirement on environmental monitors.
fn spawn_isolated<F>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    sample_once: F,
    shared: SharedSnapshot,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(Snapshot) -> Snapshot + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(monitor = name, "stopping");
                    return;
                }
                _ = interval.tick() => {}
            }

            let current = shared.read().await.clone();
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sample_once(current))) {
                Ok(next) => {
                    *shared.write().await = next;
                }
                Err(_) => {
                    tracing::warn!(monitor = name, "sampler panicked; keeping last known value");
                }
            }
        }
    })
}
