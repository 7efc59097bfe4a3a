use std::{pin::pin, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::{Error, Result};

/// Outcome of a unit of work, shared between the executor and every joiner
pub(crate) type Outcome<V, E> = std::result::Result<Arc<V>, Arc<E>>;

enum State<V, E> {
    Pending,
    Completed(Outcome<V, E>),
    Abandoned,
}

impl<V, E> State<V, E> {
    /// What a caller sees once the call has settled
    fn observe(&self) -> Option<Result<Arc<V>, E>> {
        match self {
            State::Pending => None,
            State::Completed(Ok(value)) => Some(Ok(value.clone())),
            State::Completed(Err(error)) => Some(Err(Error::Failed(error.clone()))),
            State::Abandoned => Some(Err(Error::Abandoned)),
        }
    }
}

/// Record of a single in-flight call.
///
/// Written once by its executor, read by any number of joiners. Blocking
/// joiners park on the condition variable, async joiners on the notifier;
/// both are signalled from [`Call::settle`].
pub(crate) struct Call<V, E> {
    state: Mutex<State<V, E>>,
    condvar: Condvar,
    notify: Notify,
}

impl<V, E> Call<V, E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Record the outcome of the unit of work and wake every joiner
    pub fn complete(&self, outcome: Outcome<V, E>) {
        let settled = self.settle(State::Completed(outcome));
        assert!(settled, "in-flight call completed more than once");
    }

    /// Mark the call as finished without an outcome, if it is still pending
    pub fn abandon(&self) -> bool {
        self.settle(State::Abandoned)
    }

    fn settle(&self, next: State<V, E>) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Pending) {
                return false;
            }

            *state = next;
        }

        self.condvar.notify_all();
        self.notify.notify_waiters();
        true
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), State::Pending)
    }

    /// Block the current thread until the call settles
    pub fn wait(&self) -> Result<Arc<V>, E> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.observe() {
                return outcome;
            }

            self.condvar.wait(&mut state);
        }
    }

    /// Wait for the call to settle without blocking the thread
    pub async fn wait_async(&self) -> Result<Arc<V>, E> {
        loop {
            // Register interest before looking at the state so a settle in
            // between cannot be missed.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            let outcome = self.state.lock().observe();
            if let Some(outcome) = outcome {
                return outcome;
            }

            notified.await;
        }
    }
}
