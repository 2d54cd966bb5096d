//! Job processing logic

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, Row};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use labbook_core::adapter::DiagnosticsVendor;
use labbook_core::domain::{BookingStatus, PaymentStatus};

const EXPIRY_REMARKS: &str = "Payment not received in time";

/// A booking row the worker acts on
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedBooking {
    pub id: Uuid,
    pub vendor_booking_id: Option<String>,
    pub status: BookingStatus,
}

/// Booking queries and updates the worker needs
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Booked, unpaid, created before `cutoff`
    async fn fetch_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<TrackedBooking>>;

    /// Paid and not yet terminal, least recently updated first
    async fn fetch_active(&self, limit: i64) -> anyhow::Result<Vec<TrackedBooking>>;

    /// Cancel an unpaid booking. Returns false if it was paid meanwhile.
    async fn mark_expired(&self, id: Uuid, remarks: &str) -> anyhow::Result<bool>;

    /// Move a booking from `from` to `to`. Returns false if its status changed meanwhile.
    async fn record_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        status_text: &str,
    ) -> anyhow::Result<bool>;

    /// Bump `updated_at` so the next pass starts with other bookings
    async fn touch(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Expire unpaid bookings and pull vendor status for paid ones
pub async fn process_pending_jobs<S: BookingStore, V: DiagnosticsVendor>(
    store: &S,
    vendor: &V,
    config: &WorkerConfig,
) -> anyhow::Result<usize> {
    let mut processed = 0;

    // Unpaid past the payment window
    let expired = store
        .fetch_expired(config.payment_cutoff(Utc::now()), config.sync_batch_size)
        .await?;
    for booking in expired {
        match expire_booking(store, vendor, &booking).await {
            Ok(_) => {
                info!("Expired unpaid booking {}", booking.id);
                processed += 1;
            }
            Err(e) => {
                error!("Failed to expire booking {}: {}", booking.id, e);
            }
        }
    }

    // Paid and still in progress
    let active = store.fetch_active(config.sync_batch_size).await?;
    for booking in active {
        match sync_booking(store, vendor, &booking).await {
            Ok(true) => processed += 1,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to sync booking {}: {}", booking.id, e);
            }
        }
    }

    Ok(processed)
}

async fn expire_booking<S: BookingStore, V: DiagnosticsVendor>(
    store: &S,
    vendor: &V,
    booking: &TrackedBooking,
) -> anyhow::Result<()> {
    if let Some(vendor_id) = booking.vendor_booking_id.as_deref() {
        vendor.cancel_booking(vendor_id, EXPIRY_REMARKS).await?;
    }

    if !store.mark_expired(booking.id, EXPIRY_REMARKS).await? {
        warn!(
            "Booking {} was paid while expiring; vendor booking already cancelled",
            booking.id
        );
    }
    Ok(())
}

/// Returns whether the stored status changed
async fn sync_booking<S: BookingStore, V: DiagnosticsVendor>(
    store: &S,
    vendor: &V,
    booking: &TrackedBooking,
) -> anyhow::Result<bool> {
    let Some(vendor_id) = booking.vendor_booking_id.as_deref() else {
        return Ok(false);
    };

    let vendor_status = vendor.booking_status(vendor_id).await?;
    let Some(next) = booking.status.transition(vendor_status.status) else {
        debug!("Booking {} unchanged ({})", booking.id, vendor_status.status_text);
        store.touch(booking.id).await?;
        return Ok(false);
    };

    if !store
        .record_status(booking.id, booking.status, next, &vendor_status.status_text)
        .await?
    {
        debug!("Booking {} changed during sync; skipped", booking.id);
        return Ok(false);
    }

    info!(
        "Booking {} moved {} -> {}",
        booking.id,
        booking.status.as_str(),
        next.as_str()
    );
    Ok(true)
}

fn row_to_tracked(row: &sqlx::postgres::PgRow) -> TrackedBooking {
    let status: String = row.get("status");
    TrackedBooking {
        id: row.get("id"),
        vendor_booking_id: row.get("vendor_booking_id"),
        status: BookingStatus::from_db(&status),
    }
}

#[async_trait]
impl BookingStore for PgPool {
    async fn fetch_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<TrackedBooking>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_booking_id, status
            FROM bookings
            WHERE status = $1 AND payment_status = $2 AND created_at < $3
            ORDER BY created_at ASC
            LIMIT $4
            "#,
        )
        .bind(BookingStatus::Booked.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self)
        .await?;

        Ok(rows.iter().map(row_to_tracked).collect())
    }

    async fn fetch_active(&self, limit: i64) -> anyhow::Result<Vec<TrackedBooking>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_booking_id, status
            FROM bookings
            WHERE status <> ALL($1) AND payment_status = $2 AND vendor_booking_id IS NOT NULL
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
        )
        .bind(BookingStatus::terminal_names())
        .bind(PaymentStatus::Paid.as_str())
        .bind(limit)
        .fetch_all(self)
        .await?;

        Ok(rows.iter().map(row_to_tracked).collect())
    }

    async fn mark_expired(&self, id: Uuid, remarks: &str) -> anyhow::Result<bool> {
        // Guarded so a payment that lands mid-pass is not overwritten
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, payment_status = $2, vendor_status_text = $3, updated_at = $4
            WHERE id = $5 AND payment_status = $6
            "#,
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(PaymentStatus::Failed.as_str())
        .bind(remarks)
        .bind(Utc::now())
        .bind(id)
        .bind(PaymentStatus::Pending.as_str())
        .execute(self)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        status_text: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, vendor_status_text = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(to.as_str())
        .bind(status_text)
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(self)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE bookings SET updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(self)
            .await?;
        Ok(())
    }
}
