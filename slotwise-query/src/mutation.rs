//! Write path: optimistic mutations with rollback, retry, and an offline queue.
//!
//! A call to [`Mutation::mutate`] runs these steps in order:
//!
//! 1. cancel fetches for the optimistic key, snapshot it, and apply the
//!    optimistic value
//! 2. await the `on_mutate` hook
//! 3. park in the client's queue while offline
//! 4. run the mutation function, retrying transient failures
//! 5. on success invalidate the declared keys and call `on_success`;
//!    on failure restore the snapshot and call `on_error`
//!
//! Panicking callbacks are logged and otherwise ignored, and the snapshot
//! is restored even if the call is dropped part way.

use crate::client::{EntrySnapshot, QueryClient};
use crate::error::QueryError;
use crate::key::QueryKey;
use crate::state::{MutationState, MutationStatus};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type MutationFn<V, D> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<D, QueryError>> + Send + Sync>;
type KeyFn<V> = Arc<dyn Fn(&V) -> QueryKey + Send + Sync>;
type UpdateFn<V> =
    Arc<dyn Fn(Option<&Value>, &V) -> Result<Option<Value>, serde_json::Error> + Send + Sync>;
type HookFn<V> = Arc<dyn Fn(V) -> BoxFuture<'static, ()> + Send + Sync>;
type SuccessFn<V, D> = Arc<dyn Fn(&D, &V, &MutationContext<V>) + Send + Sync>;
type ErrorFn<V> = Arc<dyn Fn(&QueryError, &V, &MutationContext<V>) + Send + Sync>;

/// Whether a mutation waits for connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// Park while the client is offline.
    #[default]
    Online,
    /// Run regardless of connectivity.
    Always,
}

struct OptimisticUpdate<V> {
    key: KeyFn<V>,
    update: UpdateFn<V>,
}

/// Everything a mutation does besides calling its function.
pub struct MutationOptions<V, D> {
    mutation_fn: MutationFn<V, D>,
    optimistic: Option<OptimisticUpdate<V>>,
    invalidates: Vec<KeyFn<V>>,
    on_mutate: Option<HookFn<V>>,
    on_success: Option<SuccessFn<V, D>>,
    on_error: Option<ErrorFn<V>>,
    retries: Option<u32>,
    network_mode: NetworkMode,
}

impl<V, D> MutationOptions<V, D>
where
    V: Send + Sync + 'static,
    D: Send + 'static,
{
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, QueryError>> + Send + 'static,
    {
        Self {
            mutation_fn: Arc::new(move |vars| mutation_fn(vars).boxed()),
            optimistic: None,
            invalidates: Vec::new(),
            on_mutate: None,
            on_success: None,
            on_error: None,
            retries: None,
            network_mode: NetworkMode::default(),
        }
    }

    /// Writes `update(previous, variables)` to `key` before the request.
    #[must_use]
    pub fn optimistic<T, U>(self, key: QueryKey, update: U) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        U: Fn(Option<T>, &V) -> T + Send + Sync + 'static,
    {
        self.optimistic_with(move |_: &V| key.clone(), move |previous, vars| {
            Some(update(previous, vars))
        })
    }

    /// Like [`optimistic`](Self::optimistic), with the key derived from the
    /// variables. Returning `None` from `update` leaves the entry alone.
    #[must_use]
    pub fn optimistic_with<T, K, U>(mut self, key: K, update: U) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        K: Fn(&V) -> QueryKey + Send + Sync + 'static,
        U: Fn(Option<T>, &V) -> Option<T> + Send + Sync + 'static,
    {
        let update: UpdateFn<V> = Arc::new(move |previous: Option<&Value>, vars: &V| {
            let previous = previous
                .map(|value| serde_json::from_value::<T>(value.clone()))
                .transpose()?;
            update(previous, vars).map(serde_json::to_value).transpose()
        });
        self.optimistic = Some(OptimisticUpdate {
            key: Arc::new(key),
            update,
        });
        self
    }

    /// Invalidates `key` after a success.
    #[must_use]
    pub fn invalidates(self, key: QueryKey) -> Self {
        self.invalidates_with(move |_: &V| key.clone())
    }

    /// Invalidates a key derived from the variables after a success.
    #[must_use]
    pub fn invalidates_with<K>(mut self, key: K) -> Self
    where
        K: Fn(&V) -> QueryKey + Send + Sync + 'static,
    {
        self.invalidates.push(Arc::new(key));
        self
    }

    /// Awaited after the optimistic write, before the request.
    #[must_use]
    pub fn on_mutate<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_mutate = Some(Arc::new(move |vars| hook(vars).boxed()));
        self
    }

    #[must_use]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&D, &V, &MutationContext<V>) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Runs after the rollback.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&QueryError, &V, &MutationContext<V>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Overrides the client's mutation retry count.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }
}

/// What the callbacks see about the optimistic write.
#[derive(Debug, Clone)]
pub struct MutationContext<V> {
    /// Data under the optimistic key before the write.
    pub previous_data: Option<Value>,
    pub variables: V,
    optimistic_key: Option<QueryKey>,
}

impl<V> MutationContext<V> {
    /// Typed view of [`previous_data`](Self::previous_data).
    pub fn previous<T: DeserializeOwned>(&self) -> Option<T> {
        self.previous_data
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn optimistic_key(&self) -> Option<&QueryKey> {
        self.optimistic_key.as_ref()
    }
}

/// Restores the captured entry unless committed.
struct RollbackGuard {
    client: QueryClient,
    key: QueryKey,
    snapshot: Option<EntrySnapshot>,
}

impl RollbackGuard {
    fn commit(mut self) {
        self.snapshot = None;
    }

    fn rollback(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.client.restore(&self.key, snapshot);
        }
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            warn!("Mutation abandoned before settling; rolling back {}", self.key);
            self.client.restore(&self.key, snapshot);
        }
    }
}

/// Answers the client's resume signal when the call settles or is dropped.
struct SettleSignal(Option<tokio::sync::oneshot::Sender<()>>);

impl Drop for SettleSignal {
    fn drop(&mut self) {
        if let Some(done) = self.0.take() {
            let _ = done.send(());
        }
    }
}

/// A reusable mutation handle.
pub struct Mutation<V, D> {
    client: QueryClient,
    options: Arc<MutationOptions<V, D>>,
    state: Arc<watch::Sender<MutationState<V, D>>>,
}

impl<V, D> Clone for Mutation<V, D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            options: Arc::clone(&self.options),
            state: Arc::clone(&self.state),
        }
    }
}

impl QueryClient {
    /// Creates a mutation handle bound to this cache.
    pub fn mutation<V, D>(&self, options: MutationOptions<V, D>) -> Mutation<V, D>
    where
        V: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
    {
        Mutation::new(self.clone(), options)
    }
}

impl<V, D> Mutation<V, D>
where
    V: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    pub fn new(client: QueryClient, options: MutationOptions<V, D>) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            client,
            options: Arc::new(options),
            state: Arc::new(state),
        }
    }

    /// State of the latest call.
    pub fn state(&self) -> MutationState<V, D> {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> MutationStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<V, D>> {
        self.state.subscribe()
    }

    /// Returns the handle to idle.
    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }

    /// Runs the mutation once.
    pub async fn mutate(&self, variables: V) -> Result<D, QueryError> {
        let options = &self.options;
        self.state.send_replace(MutationState {
            status: MutationStatus::Mutating,
            variables: Some(variables.clone()),
            ..MutationState::default()
        });

        let mut context = MutationContext {
            previous_data: None,
            variables: variables.clone(),
            optimistic_key: None,
        };
        let mut guard = None;
        if let Some(optimistic) = &options.optimistic {
            let key = (optimistic.key)(&variables);
            let (previous, snapshot) =
                self.client
                    .apply_optimistic(&key, |previous| {
                        let update = AssertUnwindSafe(|| (optimistic.update)(previous, &variables));
                        match std::panic::catch_unwind(update) {
                            Ok(Ok(next)) => next,
                            Ok(Err(e)) => {
                                warn!("Skipping optimistic update of {}: {}", key, e);
                                None
                            }
                            Err(_) => {
                                error!("Optimistic update of {} panicked; skipping it", key);
                                None
                            }
                        }
                    });
            context.previous_data = previous;
            context.optimistic_key = Some(key.clone());
            guard = Some(RollbackGuard {
                client: self.client.clone(),
                key,
                snapshot,
            });
        }

        if let Some(hook) = &options.on_mutate {
            if AssertUnwindSafe(hook(variables.clone()))
                .catch_unwind()
                .await
                .is_err()
            {
                error!("on_mutate hook panicked");
            }
        }

        let mut settle = SettleSignal(None);
        if options.network_mode == NetworkMode::Online {
            if let Some(resume) = self.client.park_if_offline() {
                info!("Offline; mutation queued until connectivity returns");
                self.state.send_modify(|s| s.status = MutationStatus::Paused);
                settle.0 = resume.await.ok();
                self.state.send_modify(|s| s.status = MutationStatus::Mutating);
            }
        }

        let result = self.run_with_retry(&variables).await;

        match result {
            Ok(data) => {
                if let Some(guard) = guard {
                    guard.commit();
                }
                self.state.send_modify(|s| {
                    s.status = MutationStatus::Success;
                    s.data = Some(data.clone());
                    s.error = None;
                });
                for key in &options.invalidates {
                    self.client.invalidate_queries(&key(&variables));
                }
                if let Some(callback) = &options.on_success {
                    guarded("on_success", || callback(&data, &variables, &context));
                }
                drop(settle);
                Ok(data)
            }
            Err(err) => {
                if let Some(guard) = guard {
                    guard.rollback();
                }
                self.state.send_modify(|s| {
                    s.status = MutationStatus::Error;
                    s.error = Some(err.clone());
                });
                if let Some(callback) = &options.on_error {
                    guarded("on_error", || callback(&err, &variables, &context));
                }
                drop(settle);
                Err(err)
            }
        }
    }

    async fn run_with_retry(&self, variables: &V) -> Result<D, QueryError> {
        let config = self.client.config();
        let mut failures = 0;
        loop {
            let outcome = AssertUnwindSafe((self.options.mutation_fn)(variables.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(QueryError::new("mutation function panicked")));
            let err = match outcome {
                Ok(data) => return Ok(data),
                Err(err) => err,
            };

            failures += 1;
            self.state.send_modify(|s| s.failure_count = failures);
            if !config.should_retry_mutation(failures - 1, &err, self.options.retries) {
                return Err(err);
            }
            let delay = config.backoff(failures - 1);
            debug!("Retrying mutation in {:?} after {} error: {}", delay, err.kind(), err);
            tokio::time::sleep(delay).await;
        }
    }
}

fn guarded(name: &str, callback: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("{} callback panicked", name);
    }
}
