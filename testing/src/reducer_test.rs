//! Given/When/Then harness for a single reducer step.
//!
//! One action goes through the reducer; the resulting state and effects are
//! checked by closures registered beforehand. Effects are returned so a test
//! can keep walking the feedback chain with [`collect_actions`].

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use boxoffice_core::{effect::Effect, reducer::Reducer};
use boxoffice_core::SmallVec;
use std::collections::VecDeque;

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// One reducer step under test
///
/// ```ignore
/// let effects = ReducerTest::new(CheckoutReducer::new())
///     .with_env(env)
///     .given_state(CheckoutState::default())
///     .when_action(CheckoutAction::Expire { booking_id })
///     .then_state(|state| assert_eq!(state.phase, CheckoutPhase::Loading))
///     .then_effects(|effects| assertions::assert_has_future_effect(effects))
///     .run();
/// let feedback = collect_actions(effects).await;
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    env: Option<E>,
    given: Option<S>,
    when: Option<A>,
    state_checks: Vec<StateCheck<S>>,
    effect_checks: Vec<EffectCheck<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone,
    A: Clone,
{
    /// Start a test for `reducer`
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            given: None,
            when: None,
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }

    /// Environment handed to the reducer
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.env = Some(env);
        self
    }

    /// State before the step
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.given = Some(state);
        self
    }

    /// Action to reduce
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.when = Some(action);
        self
    }

    /// Check the state after the step
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Check the effects the step returned
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Reduce once, run every check, hand back the effects.
    ///
    /// # Panics
    ///
    /// If the state, action or environment was never given, or a check fails.
    #[allow(clippy::panic)] // Test harness
    pub fn run(self) -> SmallVec<[Effect<A>; 4]> {
        let (Some(mut state), Some(action), Some(env)) = (self.given, self.when, self.env) else {
            panic!("ReducerTest needs given_state(), when_action() and with_env() before run()");
        };

        let effects = self.reducer.reduce(&mut state, action, &env);

        self.state_checks.into_iter().for_each(|check| check(&state));
        self.effect_checks.into_iter().for_each(|check| check(effects.as_slice()));

        effects
    }
}

/// Checks over a slice of effects
pub mod assertions {
    use boxoffice_core::effect::Effect;

    /// Nothing to run: empty, or a lone [`Effect::None`].
    ///
    /// # Panics
    ///
    /// If any real effect is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        let idle = matches!(effects, [] | [Effect::None]);
        assert!(idle, "expected no work, got {effects:?}");
    }

    /// Exactly `expected` top-level effects.
    ///
    /// # Panics
    ///
    /// On a different count.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "wrong number of top-level effects");
    }

    /// At least one top-level [`Effect::Future`].
    ///
    /// # Panics
    ///
    /// If there is none.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        let found = effects.iter().any(|effect| matches!(effect, Effect::Future(_)));
        assert!(found, "expected an async effect");
    }

    /// At least one top-level [`Effect::Delay`].
    ///
    /// # Panics
    ///
    /// If there is none.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
        let found = effects.iter().any(|effect| matches!(effect, Effect::Delay { .. }));
        assert!(found, "expected a delayed action");
    }
}

/// Run effects by hand and collect the actions they produce
///
/// Futures are awaited in order and delays resolve immediately. Nothing is fed
/// back into a reducer, so a test can assert on each feedback action before
/// deciding what to dispatch next.
pub async fn collect_actions<A, I>(effects: I) -> Vec<A>
where
    I: IntoIterator<Item = Effect<A>>,
{
    let mut queue: VecDeque<Effect<A>> = effects.into_iter().collect();
    let mut actions = Vec::new();

    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::None => {},
            Effect::Future(fut) => {
                if let Some(action) = fut.await {
                    actions.push(action);
                }
            },
            Effect::Delay { action, .. } => actions.push(*action),
            Effect::Parallel(inner) | Effect::Sequential(inner) => {
                for (offset, effect) in inner.into_iter().enumerate() {
                    queue.insert(offset, effect);
                }
            },
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::effect::Effect;
    use boxoffice_core::reducer::Reducer;
    use boxoffice_core::smallvec;

    #[derive(Clone, Debug, Default)]
    struct TurnstileState {
        admitted: u32,
        capacity: u32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TurnstileAction {
        Admit,
        Rejected,
        Reopen,
    }

    struct TurnstileReducer;

    impl Reducer for TurnstileReducer {
        type State = TurnstileState;
        type Action = TurnstileAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TurnstileAction::Admit if state.admitted < state.capacity => {
                    state.admitted += 1;
                    smallvec![Effect::None]
                },
                TurnstileAction::Admit => smallvec![Effect::Future(Box::pin(async {
                    Some(TurnstileAction::Rejected)
                }))],
                TurnstileAction::Rejected => smallvec![Effect::Sequential(vec![
                    Effect::None,
                    Effect::Delay {
                        duration: std::time::Duration::from_secs(1),
                        action: Box::new(TurnstileAction::Reopen),
                    },
                ])],
                TurnstileAction::Reopen => {
                    state.admitted = 0;
                    smallvec![Effect::None]
                },
            }
        }
    }

    #[test]
    fn admits_below_capacity() {
        let _ = ReducerTest::new(TurnstileReducer)
            .with_env(())
            .given_state(TurnstileState { admitted: 0, capacity: 2 })
            .when_action(TurnstileAction::Admit)
            .then_state(|state| {
                assert_eq!(state.admitted, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[tokio::test]
    async fn full_turnstile_reports_rejection() {
        let effects = ReducerTest::new(TurnstileReducer)
            .with_env(())
            .given_state(TurnstileState { admitted: 2, capacity: 2 })
            .when_action(TurnstileAction::Admit)
            .then_state(|state| {
                assert_eq!(state.admitted, 2);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();

        assert_eq!(collect_actions(effects).await, vec![TurnstileAction::Rejected]);
    }

    #[tokio::test]
    async fn collect_actions_flattens_nested_effects() {
        let effects = ReducerTest::new(TurnstileReducer)
            .with_env(())
            .given_state(TurnstileState::default())
            .when_action(TurnstileAction::Rejected)
            .then_effects(|effects| {
                assert!(matches!(effects, [Effect::Sequential(_)]));
            })
            .run();

        assert_eq!(collect_actions(effects).await, vec![TurnstileAction::Reopen]);
    }

    #[test]
    fn delay_assertion_sees_top_level_delay() {
        let effects: Vec<Effect<TurnstileAction>> = vec![Effect::Delay {
            duration: std::time::Duration::from_millis(5),
            action: Box::new(TurnstileAction::Reopen),
        }];
        assertions::assert_has_delay_effect(&effects);
        assertions::assert_no_effects::<TurnstileAction>(&[]);
    }
}
