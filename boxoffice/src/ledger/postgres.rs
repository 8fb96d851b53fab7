//! `PostgreSQL` ledger store.
//!
//! Capacity is reserved with a conditional `UPDATE ... RETURNING` inside the
//! same transaction as the booking insert, so the row lock on the event is
//! the per-event serialization point. Booking transitions are single
//! conditional updates on the current status; a miss is followed by a read
//! to tell "already there" from "not allowed" from "missing".

use super::{LedgerError, LedgerFuture, LedgerResult, LedgerStore, SweepCursor, Transition};
use crate::config::DatabaseConfig;
use crate::types::{
    Booking, BookingId, BookingReference, BookingStatus, Currency, Event, EventId, Money, OrderId,
    PaymentMethod, PaymentStatus, RequesterId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

macro_rules! booking_columns {
    () => {
        "id, reference, event_id, requester_id, quantity, total_minor, currency, status, \
         payment_status, payment_method, order_id, payment_session_id, payment_id, \
         created_at, updated_at"
    };
}

#[allow(clippy::needless_pass_by_value)] // used as a `map_err` adapter
fn storage(error: sqlx::Error) -> LedgerError {
    LedgerError::Storage(error.to_string())
}

fn corrupt(column: &str, value: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("invalid value in column {column}: {value}"))
}

/// Ledger store backed by a `PgPool`
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Connect using the database section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if no URL is configured or the pool
    /// cannot connect.
    pub async fn connect(config: &DatabaseConfig) -> LedgerResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| LedgerError::Storage("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(url)
            .await
            .map_err(storage)?;

        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Borrow the pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    fn row_to_event(row: &PgRow) -> LedgerResult<Event> {
        let price: i64 = row.try_get("price_minor").map_err(storage)?;
        let capacity: Option<i32> = row.try_get("capacity").map_err(storage)?;
        let booked_count: i32 = row.try_get("booked_count").map_err(storage)?;
        let currency: String = row.try_get("currency").map_err(storage)?;

        Ok(Event {
            id: EventId::from_uuid(row.try_get("id").map_err(storage)?),
            title: row.try_get("title").map_err(storage)?,
            price: Money::from_minor(u64::try_from(price).map_err(|_| corrupt("price_minor", price))?),
            currency: Currency::new(currency),
            capacity: capacity
                .map(|c| u32::try_from(c).map_err(|_| corrupt("capacity", c)))
                .transpose()?,
            booked_count: u32::try_from(booked_count)
                .map_err(|_| corrupt("booked_count", booked_count))?,
            is_active: row.try_get("is_active").map_err(storage)?,
            start_date: row.try_get("start_date").map_err(storage)?,
            start_time: row.try_get("start_time").map_err(storage)?,
            end_date: row.try_get("end_date").map_err(storage)?,
            end_time: row.try_get("end_time").map_err(storage)?,
        })
    }

    fn row_to_booking(row: &PgRow) -> LedgerResult<Booking> {
        let quantity: i32 = row.try_get("quantity").map_err(storage)?;
        let total: i64 = row.try_get("total_minor").map_err(storage)?;
        let status: String = row.try_get("status").map_err(storage)?;
        let payment_status: String = row.try_get("payment_status").map_err(storage)?;
        let payment_method: String = row.try_get("payment_method").map_err(storage)?;
        let reference: String = row.try_get("reference").map_err(storage)?;
        let currency: String = row.try_get("currency").map_err(storage)?;
        let order_id: Option<String> = row.try_get("order_id").map_err(storage)?;

        Ok(Booking {
            id: BookingId::from_uuid(row.try_get("id").map_err(storage)?),
            reference: BookingReference::from_stored(reference),
            event_id: EventId::from_uuid(row.try_get("event_id").map_err(storage)?),
            requester_id: RequesterId::from_uuid(row.try_get("requester_id").map_err(storage)?),
            quantity: u32::try_from(quantity).map_err(|_| corrupt("quantity", quantity))?,
            total_amount: Money::from_minor(u64::try_from(total).map_err(|_| corrupt("total_minor", total))?),
            currency: Currency::new(currency),
            status: BookingStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
            payment_status: PaymentStatus::parse(&payment_status)
                .ok_or_else(|| corrupt("payment_status", &payment_status))?,
            payment_method: PaymentMethod::parse(&payment_method)
                .ok_or_else(|| corrupt("payment_method", &payment_method))?,
            order_id: order_id.map(OrderId::new),
            payment_session_id: row.try_get("payment_session_id").map_err(storage)?,
            payment_id: row.try_get("payment_id").map_err(storage)?,
            created_at: row.try_get("created_at").map_err(storage)?,
            updated_at: row.try_get("updated_at").map_err(storage)?,
        })
    }

    async fn fetch_booking(pool: &PgPool, id: BookingId) -> LedgerResult<Option<Booking>> {
        let row = sqlx::query(concat!("SELECT ", booking_columns!(), " FROM bookings WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(Self::row_to_booking).transpose()
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn find_event(&self, id: EventId) -> LedgerFuture<Option<Event>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, title, price_minor, currency, capacity, booked_count, is_active,
                       start_date, start_time, end_date, end_time
                FROM events
                WHERE id = $1
                ",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&pool)
            .await
            .map_err(storage)?;

            row.as_ref().map(Self::row_to_event).transpose()
        })
    }

    fn reserve(&self, booking: Booking) -> LedgerFuture<Booking> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let quantity = i32::try_from(booking.quantity)
                .map_err(|_| corrupt("quantity", booking.quantity))?;
            let total = i64::try_from(booking.total_amount.minor_units())
                .map_err(|_| LedgerError::AmountOverflow)?;

            let mut tx = pool.begin().await.map_err(storage)?;

            let reserved = sqlx::query(
                r"
                UPDATE events
                SET booked_count = booked_count + $2
                WHERE id = $1
                  AND is_active
                  AND (capacity IS NULL OR booked_count + $2 <= capacity)
                RETURNING booked_count
                ",
            )
            .bind(*booking.event_id.as_uuid())
            .bind(quantity)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

            if reserved.is_none() {
                tx.rollback().await.map_err(storage)?;

                let row = sqlx::query("SELECT capacity, booked_count, is_active FROM events WHERE id = $1")
                    .bind(*booking.event_id.as_uuid())
                    .fetch_optional(&pool)
                    .await
                    .map_err(storage)?;

                let Some(row) = row else {
                    return Err(LedgerError::event_not_found(booking.event_id));
                };
                let is_active: bool = row.try_get("is_active").map_err(storage)?;
                if !is_active {
                    return Err(LedgerError::event_not_found(booking.event_id));
                }
                let capacity: Option<i32> = row.try_get("capacity").map_err(storage)?;
                let booked: i32 = row.try_get("booked_count").map_err(storage)?;
                let remaining = capacity.map_or(0, |c| c.saturating_sub(booked).max(0));
                return Err(LedgerError::CapacityExceeded {
                    requested: booking.quantity,
                    remaining: u32::try_from(remaining).unwrap_or(0),
                });
            }

            sqlx::query(concat!(
                "INSERT INTO bookings (",
                booking_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
            ))
            .bind(*booking.id.as_uuid())
            .bind(booking.reference.as_str())
            .bind(*booking.event_id.as_uuid())
            .bind(*booking.requester_id.as_uuid())
            .bind(quantity)
            .bind(total)
            .bind(booking.currency.as_str())
            .bind(booking.status.as_str())
            .bind(booking.payment_status.as_str())
            .bind(booking.payment_method.as_str())
            .bind(booking.order_id.as_ref().map(OrderId::as_str))
            .bind(booking.payment_session_id.as_deref())
            .bind(booking.payment_id.as_deref())
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            tx.commit().await.map_err(storage)?;

            tracing::debug!(booking_id = %booking.id, quantity, "Reservation committed");
            Ok(booking)
        })
    }

    fn find_booking(&self, id: BookingId) -> LedgerFuture<Option<Booking>> {
        let pool = self.pool.clone();
        Box::pin(async move { Self::fetch_booking(&pool, id).await })
    }

    fn find_by_order(&self, order_id: OrderId) -> LedgerFuture<Option<Booking>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", booking_columns!(), " FROM bookings WHERE order_id = $1"))
                .bind(order_id.as_str())
                .fetch_optional(&pool)
                .await
                .map_err(storage)?;

            row.as_ref().map(Self::row_to_booking).transpose()
        })
    }

    fn list_for_requester(&self, requester_id: RequesterId) -> LedgerFuture<Vec<Booking>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(concat!(
                "SELECT ",
                booking_columns!(),
                " FROM bookings WHERE requester_id = $1 ORDER BY created_at DESC"
            ))
            .bind(*requester_id.as_uuid())
            .fetch_all(&pool)
            .await
            .map_err(storage)?;

            rows.iter().map(Self::row_to_booking).collect()
        })
    }

    fn attach_session(
        &self,
        id: BookingId,
        session_id: String,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "UPDATE bookings SET payment_session_id = $2, updated_at = $3 \
                 WHERE id = $1 AND status = 'pending' AND payment_status = 'pending' \
                 AND payment_session_id IS NULL RETURNING ",
                booking_columns!()
            ))
            .bind(*id.as_uuid())
            .bind(&session_id)
            .bind(at)
            .fetch_optional(&pool)
            .await
            .map_err(storage)?;

            if let Some(row) = row {
                return Self::row_to_booking(&row).map(Transition::Applied);
            }

            match Self::fetch_booking(&pool, id).await? {
                None => Err(LedgerError::booking_not_found(id)),
                Some(booking) if booking.is_pending() => Ok(Transition::Unchanged(booking)),
                Some(booking) => Err(LedgerError::InvalidTransition {
                    booking_id: id,
                    from: booking.status,
                }),
            }
        })
    }

    fn mark_paid(
        &self,
        id: BookingId,
        payment_id: Option<String>,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "UPDATE bookings SET status = 'confirmed', payment_status = 'paid', \
                 payment_id = COALESCE($2, payment_id), updated_at = $3 \
                 WHERE id = $1 AND status = 'pending' AND payment_status = 'pending' RETURNING ",
                booking_columns!()
            ))
            .bind(*id.as_uuid())
            .bind(payment_id.as_deref())
            .bind(at)
            .fetch_optional(&pool)
            .await
            .map_err(storage)?;

            if let Some(row) = row {
                return Self::row_to_booking(&row).map(Transition::Applied);
            }

            match Self::fetch_booking(&pool, id).await? {
                None => Err(LedgerError::booking_not_found(id)),
                Some(booking) if booking.is_confirmed_paid() => Ok(Transition::Unchanged(booking)),
                Some(booking) => Err(LedgerError::InvalidTransition {
                    booking_id: id,
                    from: booking.status,
                }),
            }
        })
    }

    fn release(&self, id: BookingId, at: DateTime<Utc>) -> LedgerFuture<Transition> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(storage)?;

            let row = sqlx::query(concat!(
                "UPDATE bookings SET status = 'cancelled', payment_status = 'failed', updated_at = $2 \
                 WHERE id = $1 AND status = 'pending' AND payment_status = 'pending' RETURNING ",
                booking_columns!()
            ))
            .bind(*id.as_uuid())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

            let Some(row) = row else {
                tx.rollback().await.map_err(storage)?;
                return match Self::fetch_booking(&pool, id).await? {
                    None => Err(LedgerError::booking_not_found(id)),
                    Some(booking) => Ok(Transition::Unchanged(booking)),
                };
            };
            let booking = Self::row_to_booking(&row)?;
            let quantity = i32::try_from(booking.quantity)
                .map_err(|_| corrupt("quantity", booking.quantity))?;

            sqlx::query(
                r"
                UPDATE events
                SET booked_count = GREATEST(booked_count - $2, 0)
                WHERE id = $1
                ",
            )
            .bind(*booking.event_id.as_uuid())
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            tx.commit().await.map_err(storage)?;
            Ok(Transition::Applied(booking))
        })
    }

    fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: usize,
    ) -> LedgerFuture<Vec<Booking>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = sqlx::query(concat!(
                "SELECT ",
                booking_columns!(),
                " FROM bookings WHERE status = 'pending' AND payment_status = 'pending' \
                 AND payment_method = 'hosted_checkout' AND created_at < $1 \
                 AND ($2::timestamptz IS NULL OR (created_at, id) > ($2, $3::uuid)) \
                 ORDER BY created_at ASC, id ASC LIMIT $4"
            ))
            .bind(created_before)
            .bind(after.map(|cursor| cursor.created_at))
            .bind(after.map(|cursor| *cursor.booking_id.as_uuid()))
            .bind(limit)
            .fetch_all(&pool)
            .await
            .map_err(storage)?;

            rows.iter().map(Self::row_to_booking).collect()
        })
    }

    fn ping(&self) -> LedgerFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let _: (i32,) = sqlx::query_as("SELECT 1")
                .fetch_one(&pool)
                .await
                .map_err(storage)?;
            Ok(())
        })
    }
}

/// Seed an event row; used by fixtures and local tooling.
///
/// # Errors
///
/// Returns [`LedgerError::Storage`] if the insert fails.
pub async fn upsert_event(pool: &PgPool, event: &Event) -> LedgerResult<()> {
    let price = i64::try_from(event.price.minor_units()).map_err(|_| LedgerError::AmountOverflow)?;
    let capacity = event
        .capacity
        .map(|c| i32::try_from(c).map_err(|_| corrupt("capacity", c)))
        .transpose()?;
    let booked = i32::try_from(event.booked_count).map_err(|_| corrupt("booked_count", event.booked_count))?;

    sqlx::query(
        r"
        INSERT INTO events (id, title, price_minor, currency, capacity, booked_count, is_active,
                            start_date, start_time, end_date, end_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            price_minor = EXCLUDED.price_minor,
            currency = EXCLUDED.currency,
            capacity = EXCLUDED.capacity,
            is_active = EXCLUDED.is_active,
            start_date = EXCLUDED.start_date,
            start_time = EXCLUDED.start_time,
            end_date = EXCLUDED.end_date,
            end_time = EXCLUDED.end_time
        ",
    )
    .bind(*event.id.as_uuid())
    .bind(&event.title)
    .bind(price)
    .bind(event.currency.as_str())
    .bind(capacity)
    .bind(booked)
    .bind(event.is_active)
    .bind(event.start_date)
    .bind(event.start_time.as_deref())
    .bind(event.end_date)
    .bind(event.end_time.as_deref())
    .execute(pool)
    .await
    .map_err(storage)?;

    Ok(())
}
