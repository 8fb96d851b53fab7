//! Macros for the two effect shapes reducers build most.
//!
//! Reducers that call out to a ledger or a gateway build the same shape over
//! and over: clone a few `Arc`s, await a call, map the result to an action.

/// Wrap an async block as an `Effect::Future`
///
/// The block is wrapped in `async move`, so clone any shared handles before
/// invoking the macro.
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::async_effect;
///
/// let ledger = env.ledger.clone();
/// async_effect! {
///     match ledger.booking(booking_id).await {
///         Ok(booking) => Some(CheckoutAction::Loaded { booking, source }),
///         Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Feed an action back after a pause
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(5),
///     action: CheckoutAction::Verify { booking_id, source: ReconcileSource::Poll }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
