//! # Boxoffice Core
//!
//! Core traits and types shared by the boxoffice crates.
//!
//! Business rules are written as reducers: pure functions
//! `(State, Action, Environment) → (State, Effects)`. A reducer never performs
//! I/O itself; it returns [`Effect`](effect::Effect) descriptions that the
//! runtime executes, feeding any resulting action back into the reducer.
//!
//! A workflow is described by four pieces:
//!
//! - **State** that one request owns for its lifetime
//! - **Actions**, both the command that starts it and the outcomes effects report back
//! - A **Reducer** that applies an action and says what to do next
//! - An **Environment** holding whatever the effects need (clock, ledger, gateway)
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Default)]
//! struct Seats {
//!     held: u32,
//! }
//!
//! enum SeatAction {
//!     Hold(u32),
//! }
//!
//! struct SeatReducer;
//!
//! impl Reducer for SeatReducer {
//!     type State = Seats;
//!     type Action = SeatAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Seats,
//!         action: SeatAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<SeatAction>; 4]> {
//!         let SeatAction::Hold(count) = action;
//!         state.held += count;
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut seats = Seats::default();
//! let _ = SeatReducer.reduce(&mut seats, SeatAction::Hold(2), &());
//! assert_eq!(seats.held, 2);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Macros for the common effect shapes
pub mod effect_macros;

/// The [`Reducer`](reducer::Reducer) trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business rules for one workflow
    pub trait Reducer {
        /// Per-request state
        type State;

        /// Commands plus the outcomes effects feed back
        type Action;

        /// Dependencies the effects close over
        type Environment;

        /// Apply `action` to `state` and describe the follow-up work.
        ///
        /// Must not perform I/O. Anything slow or fallible goes into the
        /// returned effects, which the runtime runs after the state write is
        /// released. Up to four effects are stored inline.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effects: work a reducer asks the runtime to do
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// One unit of follow-up work
    ///
    /// Whatever action an effect yields goes back through the reducer that
    /// produced it.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// All at once; finishes when every child has
        Parallel(Vec<Effect<Action>>),

        /// One after another, in order
        Sequential(Vec<Effect<Action>>),

        /// Feed `action` back after `duration`
        Delay {
            /// Wait before dispatching
            duration: Duration,
            /// Dispatched once the wait is over
            action: Box<Action>,
        },

        /// Async work; `Some(action)` is fed back, `None` ends the chain
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Futures have no Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Shorthand for [`Effect::Parallel`]
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Shorthand for [`Effect::Sequential`]
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Returns `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Injected dependencies shared by every workflow
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of "now"
    ///
    /// Every instant that feeds a business decision (booking cutoffs, pending
    /// reservation expiry) comes from a `Clock`, so tests can pin time.
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl SystemClock {
        /// Create a new system clock
        #[must_use]
        pub const fn new() -> Self {
            Self
        }
    }

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
