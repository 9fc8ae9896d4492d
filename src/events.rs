// Event lifecycle and fund aggregation

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::Principal;
use crate::database::{Database, DbPool};
use crate::error::LedgerError;
use crate::models::{Event, EventBalance, EventStatus, EventView};

pub struct EventFunds;

/// An event may be deleted only once every contributed BU has been
/// withdrawn and no payout is still in flight. An in-flight withdrawal
/// already counts toward `total_withdrawn`, so `remaining == 0` alone would
/// let a delete cascade away an unpaid obligation.
pub fn ensure_deletable(
    funds: &EventBalance,
    in_flight_withdrawals: i64,
) -> Result<(), LedgerError> {
    if funds.remaining > Decimal::ZERO {
        return Err(LedgerError::InvalidState(format!(
            "event still holds {} BU",
            funds.remaining
        )));
    }
    if in_flight_withdrawals > 0 {
        return Err(LedgerError::InvalidState(
            "event has withdrawals awaiting payout".into(),
        ));
    }
    Ok(())
}

impl EventFunds {
    /// Fold an event's funds from the transfer and withdrawal tables. Both
    /// sums come from one SELECT, so they reflect a single snapshot.
    ///
    /// Withdrawn funds count every non-failed withdrawal: a pending or
    /// processing payout has already claimed its slice of the event, and
    /// counting it keeps a second request from claiming the same funds.
    pub async fn balance(
        conn: &mut PgConnection,
        event_id: Uuid,
    ) -> Result<EventBalance, LedgerError> {
        let (total_received, total_withdrawn): (Decimal, Decimal) = sqlx::query_as(
            "SELECT
                COALESCE((SELECT SUM(amount) FROM transfers
                          WHERE event_id = $1 AND status = 'completed'), 0),
                COALESCE((SELECT SUM(bu_amount) FROM withdrawals
                          WHERE event_id = $1 AND status <> 'failed'), 0)",
        )
        .bind(event_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(EventBalance::new(total_received, total_withdrawn))
    }

    pub async fn get(conn: &mut PgConnection, event_id: Uuid) -> Result<Event, LedgerError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(LedgerError::NotFound("event"))
    }

    pub async fn create(
        pool: &DbPool,
        principal: &Principal,
        title: &str,
    ) -> Result<Event, LedgerError> {
        if !principal.role.can_celebrate() {
            return Err(LedgerError::Unauthorized);
        }
        if title.trim().is_empty() {
            return Err(LedgerError::Validation("event title must not be empty"));
        }

        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (celebrant_id, title) VALUES ($1, $2) RETURNING *",
        )
        .bind(principal.user_id)
        .bind(title.trim())
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    /// Event with its derived funds.
    pub async fn view(
        pool: &DbPool,
        principal: &Principal,
        event_id: Uuid,
    ) -> Result<EventView, LedgerError> {
        let mut conn = pool.acquire().await?;
        let event = Self::get(&mut conn, event_id).await?;
        if event.celebrant_id != principal.user_id && !principal.role.is_admin() {
            return Err(LedgerError::Unauthorized);
        }
        let funds = Self::balance(&mut conn, event_id).await?;
        Ok(EventView { event, funds })
    }

    /// Celebrant-only lifecycle transition `active -> done`.
    pub async fn mark_done(
        pool: &DbPool,
        principal: &Principal,
        event_id: Uuid,
    ) -> Result<Event, LedgerError> {
        let mut conn = pool.acquire().await?;
        let event = Self::get(&mut conn, event_id).await?;
        if event.celebrant_id != principal.user_id {
            return Err(LedgerError::Unauthorized);
        }
        if event.status != EventStatus::Active {
            return Err(LedgerError::InvalidState("event is already done".into()));
        }

        let updated = sqlx::query_as::<_, Event>(
            "UPDATE events SET status = 'done'
             WHERE id = $1 AND status = 'active'
             RETURNING *",
        )
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;

        updated.ok_or(LedgerError::InvalidState("event is already done".into()))
    }

    /// Deletion is permitted only once every contributed BU has been
    /// withdrawn. The scope lock serializes this check against a racing
    /// withdrawal into the same event.
    pub async fn delete(
        pool: &DbPool,
        principal: &Principal,
        event_id: Uuid,
    ) -> Result<(), LedgerError> {
        let mut tx = pool.begin().await?;
        Database::lock_scope(&mut tx, event_id).await?;

        let event = Self::get(&mut tx, event_id).await?;
        if event.celebrant_id != principal.user_id && !principal.role.is_admin() {
            return Err(LedgerError::Unauthorized);
        }

        let funds = Self::balance(&mut tx, event_id).await?;
        let in_flight: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM withdrawals
             WHERE event_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
        ensure_deletable(&funds, in_flight)?;

        // Cascades to the event's transfers, gateways, and settled
        // withdrawal history.
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::EventBalance;
    use rust_decimal::Decimal;

    // A full contribution walkthrough, replayed against the aggregation arithmetic:
    // 200 BU contributed, a 250 BU withdrawal must find only 200 remaining,
    // a 200 BU withdrawal drains the event to zero.
    #[test]
    fn aggregation_walkthrough() {
        let funds = EventBalance::new(Decimal::from(200), Decimal::ZERO);
        assert_eq!(funds.remaining, Decimal::from(200));
        assert!(Decimal::from(250) > funds.remaining);

        let after = EventBalance::new(Decimal::from(200), Decimal::from(200));
        assert_eq!(after.remaining, Decimal::ZERO);
    }

    #[test]
    fn deletion_waits_for_in_flight_payouts() {
        use super::ensure_deletable;
        use crate::error::LedgerError;

        let holding = EventBalance::new(Decimal::from(200), Decimal::from(50));
        assert!(matches!(
            ensure_deletable(&holding, 0),
            Err(LedgerError::InvalidState(_))
        ));

        // Drained through a still-pending withdrawal: remaining is zero but
        // the payout obligation must survive.
        let drained = EventBalance::new(Decimal::from(200), Decimal::from(200));
        assert!(matches!(
            ensure_deletable(&drained, 1),
            Err(LedgerError::InvalidState(_))
        ));

        // Fully paid out: deletable.
        assert!(ensure_deletable(&drained, 0).is_ok());
    }

    #[test]
    fn decimal_amounts_do_not_drift() {
        // 0.1 + 0.2 is exact in fixed-point, unlike binary floats.
        let funds = EventBalance::new(
            "0.10".parse::<Decimal>().unwrap() + "0.20".parse::<Decimal>().unwrap(),
            "0.30".parse::<Decimal>().unwrap(),
        );
        assert_eq!(funds.remaining, Decimal::ZERO);
    }
}
