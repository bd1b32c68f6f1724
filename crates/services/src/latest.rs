use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct LatestState {
    ticket: u64,
    token: CancellationToken,
}

/// "Last selection wins" guard for lookups the user can supersede.
///
/// Starting a new lookup cancels the previous one before its request resolves,
/// and a result is only applied if its lookup is still the newest.
#[derive(Default)]
pub struct LatestOnly {
    state: Mutex<LatestState>,
}

impl LatestOnly {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LatestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut state = self.lock();
        state.token.cancel();
        state.ticket += 1;
        state.token = CancellationToken::new();
        (state.ticket, state.token.clone())
    }

    /// Drive `lookup`, then hand its output to `apply` if nothing newer started.
    ///
    /// Returns `None` when the lookup was superseded or cancelled.
    pub async fn run<T, R>(
        &self,
        lookup: impl Future<Output = T>,
        apply: impl FnOnce(T) -> R,
    ) -> Option<R> {
        let (ticket, token) = self.begin();
        let output = tokio::select! {
            biased;
            () = token.cancelled() => return None,
            output = lookup => output,
        };

        let state = self.lock();
        if state.ticket != ticket || token.is_cancelled() {
            return None;
        }
        Some(apply(output))
    }

    /// Cancel whatever lookup is outstanding.
    pub fn cancel(&self) {
        self.lock().token.cancel();
    }
}
