use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

struct Pending {
    ticket: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct DebounceState {
    last_ticket: u64,
    pending: Option<Pending>,
}

/// Trailing-edge debouncer: only the last `schedule` inside the window runs.
///
/// A job that has already started is never aborted by a newer `schedule`;
/// only jobs still waiting out their delay are replaced.
pub struct DebouncedTask {
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DebouncedTask {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `job` after the delay unless another `schedule` or `cancel` comes first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        state.last_ticket += 1;
        let ticket = state.last_ticket;
        if let Some(previous) = state.pending.take() {
            previous.handle.abort();
        }

        let shared = Arc::clone(&self.state);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = lock(&shared);
                let still_current = state
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.ticket == ticket);
                if !still_current {
                    return;
                }
                state.pending = None;
            }
            job().await;
        });

        state.pending = Some(Pending {
            ticket,
            handle: handle.abort_handle(),
        });
    }

    /// Drop the waiting job, if any.
    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.state).pending.take() {
            pending.handle.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }
}

impl Drop for DebouncedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
