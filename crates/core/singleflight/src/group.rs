use std::{borrow::Borrow, fmt, future::Future, hash::Hash, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio_util::sync::CancellationToken;

use crate::{
    call::{Call, Outcome},
    Error, GroupConfig, Result,
};

/// Registry of in-flight calls, one per key.
///
/// Callers asking for a key that already has a call running wait on that
/// call instead of starting their own.
///
/// Cloning a group is cheap and every clone shares the same registry of
/// in-flight calls.
pub struct Group<K: Hash + Eq, V, E> {
    config: Arc<GroupConfig>,
    calls: Arc<DashMap<K, Arc<Call<V, E>>>>,
}

/// Whether the caller claimed the key or joined an existing call
enum Admission<'a, K: Hash + Eq, V, E> {
    Executor(Flight<'a, K, V, E>),
    Joiner(Arc<Call<V, E>>),
}

/// Claim held by the executor of a call.
///
/// Dropping it releases the registry entry, and abandons the call first if
/// no outcome was recorded.
struct Flight<'a, K: Hash + Eq, V, E> {
    group: &'a Group<K, V, E>,
    key: K,
    call: Arc<Call<V, E>>,
}

impl<K: Hash + Eq, V, E> Flight<'_, K, V, E> {
    fn run<F>(self, work: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        let outcome = work().map(Arc::new).map_err(Arc::new);
        self.finish(outcome)
    }

    async fn run_async<F, Fut>(self, work: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let outcome = work().await.map(Arc::new).map_err(Arc::new);
        self.finish(outcome)
    }

    fn finish(self, outcome: Outcome<V, E>) -> Result<Arc<V>, E> {
        if outcome.is_err() {
            debug!("[{}] in-flight call failed", self.group.name());
        }

        self.call.complete(outcome.clone());
        outcome.map_err(Error::Failed)
    }
}

impl<K: Hash + Eq, V, E> Drop for Flight<'_, K, V, E> {
    fn drop(&mut self) {
        if self.call.abandon() {
            warn!(
                "[{}] executor went away before the call finished, releasing joiners",
                self.group.name()
            );
        }

        self.group.release(&self.key, &self.call);
    }
}

impl<K: Hash + Eq, V, E> Group<K, V, E> {
    pub fn from_config(config: GroupConfig) -> Self {
        let calls = match config.shards() {
            Some(shards) => DashMap::with_capacity_and_shard_amount(config.capacity, shards),
            None => DashMap::with_capacity(config.capacity),
        };

        Self {
            config: Arc::new(config),
            calls: Arc::new(calls),
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("singleflight")
    }

    /// Forget a key, so the next caller executes a new unit of work.
    ///
    /// Callers already waiting on the forgotten call still receive its outcome.
    pub fn forget<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.calls.remove(key).is_some() {
            debug!("[{}] forgot in-flight call", self.name());
        }
    }

    /// Number of calls currently in flight
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.calls.contains_key(key)
    }

    /// Remove the entry for `key` only if it still points at `call`
    fn release(&self, key: &K, call: &Arc<Call<V, E>>) {
        let removed = self
            .calls
            .remove_if(key, |_, current| Arc::ptr_eq(current, call));

        if removed.is_none() {
            trace!("[{}] entry no longer points at this call, leaving it", self.name());
        }
    }

    async fn join(&self, call: &Call<V, E>, token: &CancellationToken) -> Result<Arc<V>, E> {
        tokio::select! {
            biased;
            outcome = call.wait_async() => outcome,
            _ = token.cancelled() => {
                debug!("[{}] joiner cancelled while waiting", self.name());
                Err(Error::Cancelled)
            }
        }
    }
}

impl<K: Hash + Eq + Clone, V, E> Group<K, V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for the caller, or hand back the call already in flight
    fn admit(&self, key: K) -> Admission<'_, K, V, E> {
        match self.calls.entry(key.clone()) {
            Entry::Occupied(entry) => {
                trace!("[{}] joining in-flight call", self.name());
                Admission::Joiner(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let call = Arc::new(Call::new());
                entry.insert(call.clone());
                trace!("[{}] starting new call", self.name());

                Admission::Executor(Flight {
                    group: self,
                    key,
                    call,
                })
            }
        }
    }

    /// Run `work` for `key` unless a call for it is already running, in which
    /// case block on that call and hand back its value or failure.
    ///
    /// The outcome is not kept once the call finishes.
    pub fn execute<F>(&self, key: K, work: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        match self.admit(key) {
            Admission::Joiner(call) => call.wait(),
            Admission::Executor(flight) => flight.run(work),
        }
    }

    /// Like [`Group::execute`], but a duplicate caller gives up with
    /// [`Error::Cancelled`] once `token` is cancelled.
    ///
    /// The token has no effect on the caller that runs `work`.
    pub fn execute_cancellable<F>(
        &self,
        key: K,
        token: &CancellationToken,
        work: F,
    ) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        match self.admit(key) {
            Admission::Joiner(call) => futures::executor::block_on(self.join(&call, token)),
            Admission::Executor(flight) => flight.run(work),
        }
    }

    /// Async version of [`Group::execute`].
    ///
    /// Dropping the future of the caller running `work` abandons the call and
    /// duplicate callers fail with [`Error::Abandoned`].
    pub async fn execute_async<F, Fut>(&self, key: K, work: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        match self.admit(key) {
            Admission::Joiner(call) => call.wait_async().await,
            Admission::Executor(flight) => flight.run_async(work).await,
        }
    }

    /// Async version of [`Group::execute_cancellable`].
    pub async fn execute_async_cancellable<F, Fut>(
        &self,
        key: K,
        token: &CancellationToken,
        work: F,
    ) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        match self.admit(key) {
            Admission::Joiner(call) => self.join(&call, token).await,
            Admission::Executor(flight) => flight.run_async(work).await,
        }
    }
}

impl<K: Hash + Eq, V, E> Clone for Group<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            calls: self.calls.clone(),
        }
    }
}

impl<K: Hash + Eq, V, E> Default for Group<K, V, E> {
    fn default() -> Self {
        Self::from_config(GroupConfig::default())
    }
}

impl<K: Hash + Eq, V, E> fmt::Debug for Group<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
