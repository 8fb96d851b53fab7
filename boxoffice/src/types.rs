//! Domain types for the booking core.
//!
//! Identifiers, money, the event read model and the booking record. A booking
//! carries two independent state axes: `status` (the seat reservation) and
//! `payment_status` (the money). The only legal combinations are the ones the
//! ledger produces:
//!
//! ```text
//! pending/pending  --paid-->      confirmed/paid
//! pending/pending  --released-->  cancelled/failed
//! (free booking)                  confirmed/paid   (created directly)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a ticketed event
    EventId
);

uuid_id!(
    /// Unique identifier for a booking
    BookingId
);

uuid_id!(
    /// Opaque identifier of an authenticated requester
    RequesterId
);

/// Gateway order identifier
///
/// Derived from the booking identity, so a retry for the same booking reuses
/// the same order and two bookings can never share one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wrap an order identifier received from the gateway or a caller
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The order identifier used for `booking_id`
    #[must_use]
    pub fn for_booking(booking_id: &BookingId) -> Self {
        Self(format!("BX_{}", booking_id.as_uuid().simple()))
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-shareable booking reference (`BX-<unix millis>-<8 hex>`)
///
/// Generated once when the booking is created and never regenerated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingReference(String);

impl BookingReference {
    /// Generate a fresh reference from the creation instant and 32 random bits
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("BX-{}-{suffix:08X}", now.timestamp_millis()))
    }

    /// Rehydrate a stored reference
    #[must_use]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// Monetary amount in minor units (paise, cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates a `Money` value from whole major units, `None` on overflow
    #[must_use]
    pub const fn from_major(major: u64) -> Option<Self> {
        match major.checked_mul(100) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Amount in minor units
    #[must_use]
    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    /// Amount in the currency's natural unit, as the gateway expects it
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // ticket totals are far below 2^52
    pub fn as_major_units(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns `true` for a zero amount
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiply by a ticket quantity, `None` on overflow
    #[must_use]
    pub const fn checked_multiply(&self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(total) => Some(Self(total)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// ISO 4217 currency code
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Indian rupee, the default catalog currency
    #[must_use]
    pub fn inr() -> Self {
        Self("INR".to_string())
    }

    /// Wrap a currency code, upper-cased
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Borrow the code
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::inr()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Status enums
// ============================================================================

/// Reservation state of a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Capacity held, waiting for the payment outcome
    Pending,
    /// Seats are the requester's
    Confirmed,
    /// Capacity released
    Cancelled,
}

/// Money state of a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No outcome yet
    Pending,
    /// Gateway reported success
    Paid,
    /// Gateway reported failure, or checkout could not be opened
    Failed,
    /// Money returned to the payer
    Refunded,
}

/// How the booking is paid for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Zero-price event, no gateway involved
    Free,
    /// Hosted checkout page of the payment gateway
    HostedCheckout,
}

macro_rules! db_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Storage representation
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parse the storage representation
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

db_enum!(BookingStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});

db_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

db_enum!(PaymentMethod {
    Free => "free",
    HostedCheckout => "hosted_checkout",
});

// ============================================================================
// Event (catalog read model)
// ============================================================================

/// A scheduled, ticketed event as the booking core sees it
///
/// Schedule fields are venue-local wall-clock values; the time-of-day fields
/// are kept as the free-form strings the catalog stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Price per ticket
    pub price: Money,
    /// Price currency
    pub currency: Currency,
    /// Maximum tickets, `None` for unlimited
    pub capacity: Option<u32>,
    /// Tickets currently held by pending or confirmed bookings
    pub booked_count: u32,
    /// Inactive events cannot be booked
    pub is_active: bool,
    /// Start date
    pub start_date: Option<NaiveDate>,
    /// Start time of day (`"18:00"`, `"6:00 PM"`)
    pub start_time: Option<String>,
    /// End date
    pub end_date: Option<NaiveDate>,
    /// End time of day
    pub end_time: Option<String>,
}

impl Event {
    /// Tickets still available, `None` when capacity is unlimited
    #[must_use]
    pub fn remaining_capacity(&self) -> Option<u32> {
        self.capacity
            .map(|capacity| capacity.saturating_sub(self.booked_count))
    }

    /// Returns `true` if `quantity` more tickets fit
    #[must_use]
    pub fn has_room_for(&self, quantity: u32) -> bool {
        match self.capacity {
            None => true,
            Some(capacity) => self
                .booked_count
                .checked_add(quantity)
                .is_some_and(|total| total <= capacity),
        }
    }

    /// Zero-price events skip the gateway
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price.is_zero()
    }
}

// ============================================================================
// Requester
// ============================================================================

/// Authenticated caller, with the contact details the gateway asks for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Requester identifier
    pub id: RequesterId,
    /// Display name
    pub name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Phone number
    pub phone: Option<String>,
}

impl Requester {
    /// A requester known only by identifier
    #[must_use]
    pub const fn anonymous(id: RequesterId) -> Self {
        Self {
            id,
            name: None,
            email: None,
            phone: None,
        }
    }
}

// ============================================================================
// Booking
// ============================================================================

/// A requester's reservation of tickets for one event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Shareable reference
    pub reference: BookingReference,
    /// Booked event
    pub event_id: EventId,
    /// Who booked
    pub requester_id: RequesterId,
    /// Number of tickets (at least one)
    pub quantity: u32,
    /// Price times quantity
    pub total_amount: Money,
    /// Currency of `total_amount`
    pub currency: Currency,
    /// Reservation state
    pub status: BookingStatus,
    /// Money state
    pub payment_status: PaymentStatus,
    /// How the booking is paid for
    pub payment_method: PaymentMethod,
    /// Gateway order, set once for paid bookings
    pub order_id: Option<OrderId>,
    /// Gateway checkout session
    pub payment_session_id: Option<String>,
    /// Gateway payment, recorded on success
    pub payment_id: Option<String>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last transition instant
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Still waiting for a payment outcome
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending && self.payment_status == PaymentStatus::Pending
    }

    /// Reached `confirmed/paid`
    #[must_use]
    pub fn is_confirmed_paid(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.payment_status == PaymentStatus::Paid
    }

    /// Capacity was handed back
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}
