//! Boxoffice - event ticket booking with hosted-checkout payments.
//!
//! The crate is the booking core of a ticketing backend:
//!
//! - **Ledger**: capacity-safe reservations and the booking state machine
//! - **Schedule**: venue-local start times, the 30-minute sales cutoff
//! - **Gateway**: the hosted checkout provider behind a trait
//! - **Reconciliation**: poll and webhook paths converging on one idempotent
//!   confirmation, plus the sweep that reclaims abandoned reservations
//! - **API**: the HTTP surface over all of the above
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum)            Sweeper (interval)
//!        │                        │
//!        └──────────┬─────────────┘
//!                   ▼
//!        ┌─────────────────────┐
//!        │ CheckoutCoordinator │  per-request Store + CheckoutReducer
//!        └─────────────────────┘
//!             │            │
//!             ▼            ▼
//!     ┌──────────────┐  ┌────────────────┐
//!     │ BookingLedger │  │ PaymentGateway │
//!     └──────────────┘  └────────────────┘
//!             │
//!             ▼
//!     LedgerStore (Postgres or in-memory)
//! ```
//!
//! # Booking Lifecycle
//!
//! ```text
//! reserve ─┬─ free event ──────────────► confirmed/paid
//!          └─ paid event ─► pending ─┬─ paid (poll or webhook) ─► confirmed/paid
//!                                    └─ failed / expired ───────► cancelled/failed
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod reconciliation;
pub mod schedule;
pub mod server;
pub mod types;

pub use config::Config;
pub use gateway::{HostedCheckoutGateway, MockPaymentGateway, OrderStatus, PaymentGateway};
pub use ledger::{BookingLedger, InMemoryLedgerStore, LedgerError, LedgerStore, PostgresLedgerStore};
pub use reconciliation::{CheckoutCoordinator, CheckoutEnvironment, Sweeper, WebhookVerifier};
pub use server::{build_router, AppState};
pub use types::*;
