//! # Boxoffice Runtime
//!
//! Hosts a [`Reducer`] behind a [`Store`](store::Store): actions go in,
//! the state lock is taken for exactly one reduction, and the returned effects
//! are spawned. Whatever action an effect yields is fed back through the same
//! store, and an [`EffectHandle`] lets the sender wait for the whole chain.
//!
//! ```ignore
//! let store = Store::new(CheckoutState::default(), CheckoutReducer, env);
//! store.send_and_settle(CheckoutAction::Poll { booking_id }, Duration::from_secs(5)).await?;
//! let phase = store.state(|s| s.phase.clone()).await;
//! ```

use boxoffice_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Failures surfaced by [`Store`](super::Store) waits
pub mod error {
    use thiserror::Error;

    /// Why a store wait gave up
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Deadline hit with this many effects outstanding
        #[error("effects still running at deadline: {0}")]
        Timeout(usize),
    }
}

pub use error::StoreError;
pub use store::Store;

/// Completion tracker for one dispatched action
///
/// Feedback actions inherit the tracker of the action that caused them, so
/// [`EffectHandle::wait`] returns only after the entire chain is quiet.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// In-flight effect count
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Block until the counter drops to zero
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// [`EffectHandle::wait`] bounded by `timeout`
    ///
    /// # Errors
    ///
    /// [`StoreError::Timeout`] with the number of in-flight effects. Those
    /// effects are not cancelled.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout(self.pending()))
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// In-flight counter shared by every task spawned for one `send()`
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Decrements on drop, including when the effect task panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Reducer host
pub mod store {
    use super::{
        Arc, AtomicUsize, DecrementGuard, Duration, Effect, EffectHandle, EffectTracking, Ordering,
        Reducer, RwLock,
    };
    use tokio::sync::watch;

    /// Shared state plus the reducer and environment that evolve it
    ///
    /// Reductions are serialised by a write lock that is dropped before any
    /// effect starts. Effects run on spawned tasks and re-enter through the
    /// same lock when they yield an action.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Wrap `initial_state` with its reducer and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
            }
        }

        /// Reduce `action` and start its effects
        ///
        /// Returns as soon as the effects are spawned; the returned
        /// [`EffectHandle`] tracks them to completion.
        ///
        /// # Panics
        ///
        /// A panicking reducer panics the caller.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> EffectHandle {
            let (handle, tracking) = EffectHandle::new();
            self.dispatch(action, &tracking).await;
            handle
        }

        /// Project the current state through `f` under a read lock
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        async fn dispatch(&self, action: A, tracking: &EffectTracking) {
            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }
        }

        // Sequential children each get a private counter so the next child
        // starts only after the previous one and its feedback are done.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned into spawned tasks
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("empty effect");
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking.clone());

                        if let Some(action) = fut.await {
                            tracing::trace!("future effect yielded an action");
                            store.dispatch(action, &tracking).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking.clone());

                        tokio::time::sleep(duration).await;
                        store.dispatch(*action, &tracking).await;
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!(count = effects.len(), "fan-out effects");
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    tracing::trace!(count = effects.len(), "ordered effects");
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking.clone());

                        for effect in effects {
                            let (sub_tx, mut sub_rx) = watch::channel(());
                            let sub_tracking = EffectTracking {
                                counter: Arc::new(AtomicUsize::new(0)),
                                notifier: Arc::new(sub_tx),
                            };

                            store.execute_effect(effect, sub_tracking.clone());

                            while sub_tracking.counter.load(Ordering::SeqCst) > 0 {
                                if sub_rx.changed().await.is_err() {
                                    break;
                                }
                            }
                        }
                    });
                },
            }
        }

        /// [`Store::send`] followed by a bounded wait on its handle
        ///
        /// # Errors
        ///
        /// [`super::StoreError::Timeout`] when the chain outlives `timeout`.
        pub async fn send_and_settle(
            &self,
            action: A,
            timeout: Duration,
        ) -> Result<(), super::StoreError> {
            let mut handle = self.send(action).await;
            handle.wait_with_timeout(timeout).await
        }
    }
}
