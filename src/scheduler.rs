use futures_util::future::BoxFuture;
use std::sync::Mutex;
use std::time::Duration;

/// Run an action once a delay has passed. Scheduled actions cannot be cancelled.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, action: BoxFuture<'static, ()>);
}

/// Production scheduler on tokio's timer.
#[derive(Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
    }
}

/// Holds scheduled actions until the caller runs them, so tests decide when time passes.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of everything scheduled and not yet run.
    pub fn pending_delays(&self) -> Vec<Duration> {
        match self.pending.lock() {
            Ok(pending) => pending.iter().map(|(delay, _)| *delay).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(d, _)| *d).collect(),
        }
    }

    /// Run every pending action, shortest delay first.
    pub async fn run_all(&self) {
        let mut due = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        due.sort_by_key(|(delay, _)| *delay);
        for (_, action) in due {
            action.await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: BoxFuture<'static, ()>) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push((delay, action)),
            Err(poisoned) => poisoned.into_inner().push((delay, action)),
        }
    }
}
