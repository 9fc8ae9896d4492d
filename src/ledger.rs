// Transfer ledger: the only writer of transfer rows

use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::database::{Database, DbPool};
use crate::error::LedgerError;
use crate::models::{Event, EventStatus, Transfer, TransferPage, TransferType};
use crate::notify::{Notifier, NotificationPayload};
use crate::wallet::{ensure_positive, WalletStore};

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub amount: Decimal,
    pub transfer_type: TransferType,
    pub message: Option<String>,
    pub event_id: Option<Uuid>,
}

pub struct TransferLedger;

impl TransferLedger {
    pub fn validate(new: &NewTransfer) -> Result<(), LedgerError> {
        ensure_positive(new.amount)?;
        if new.sender_id.is_none() && new.receiver_id.is_none() {
            return Err(LedgerError::Validation(
                "a transfer needs a sender or a receiver",
            ));
        }
        // Event contributions are escrowed in the event until withdrawn; the
        // celebrant's wallet is never credited at contribution time.
        if new.event_id.is_some() && new.receiver_id.is_some() {
            return Err(LedgerError::Validation(
                "an event contribution cannot also credit a wallet",
            ));
        }
        Ok(())
    }

    /// Move the funds and write the row inside the caller's open
    /// transaction: debit the sender (if any), credit the receiver (if any),
    /// insert the completed transfer. The caller's commit makes all three
    /// visible at once, or none of them.
    pub async fn record_in_tx(
        conn: &mut PgConnection,
        new: &NewTransfer,
    ) -> Result<Transfer, LedgerError> {
        Self::validate(new)?;

        if let Some(sender_id) = new.sender_id {
            WalletStore::debit(&mut *conn, sender_id, new.amount).await?;
        }
        if let Some(receiver_id) = new.receiver_id {
            WalletStore::credit(&mut *conn, receiver_id, new.amount).await?;
        }

        let transfer = sqlx::query_as::<_, Transfer>(
            "INSERT INTO transfers (sender_id, receiver_id, amount, transfer_type, status, message, event_id)
             VALUES ($1, $2, $3, $4, 'completed', $5, $6)
             RETURNING *",
        )
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(new.amount)
        .bind(new.transfer_type)
        .bind(&new.message)
        .bind(new.event_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(transfer)
    }

    /// Record a transfer as one atomic unit, then inform the parties.
    pub async fn record_transfer(
        pool: &DbPool,
        notifier: &Notifier,
        new: NewTransfer,
    ) -> Result<Transfer, LedgerError> {
        Self::validate(&new)?;

        let mut tx = pool.begin().await?;

        let event = match new.event_id {
            Some(event_id) => {
                // Contributions serialize against event deletion on the same
                // scope lock, so a concurrent delete cannot fold the
                // aggregate before this transfer lands and then cascade it
                // away after commit.
                Database::lock_scope(&mut tx, event_id).await?;
                let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
                    .bind(event_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(LedgerError::NotFound("event"))?;
                if event.status != EventStatus::Active {
                    return Err(LedgerError::InvalidState(
                        "event no longer accepts contributions".into(),
                    ));
                }
                Some(event)
            }
            None => None,
        };

        let transfer = Self::record_in_tx(&mut tx, &new).await?;
        tx.commit().await?;

        info!(
            "recorded {:?} transfer {} of {} BU",
            transfer.transfer_type, transfer.id, transfer.amount
        );

        if let Some(sender_id) = transfer.sender_id {
            notifier.notify(
                sender_id,
                NotificationPayload {
                    kind: "transfer_out",
                    title: "Transfer sent".into(),
                    message: format!("You sent {} BU", transfer.amount),
                    amount: Some(transfer.amount),
                    metadata: serde_json::json!({ "transfer_id": transfer.id }),
                },
            );
        }
        if let Some(receiver_id) = transfer.receiver_id {
            notifier.notify(
                receiver_id,
                NotificationPayload {
                    kind: "transfer_in",
                    title: "Transfer received".into(),
                    message: format!("You received {} BU", transfer.amount),
                    amount: Some(transfer.amount),
                    metadata: serde_json::json!({ "transfer_id": transfer.id }),
                },
            );
        }
        if let Some(event) = event {
            notifier.notify(
                event.celebrant_id,
                NotificationPayload {
                    kind: "event_contribution",
                    title: "Event contribution".into(),
                    message: format!("{} received {} BU", event.title, transfer.amount),
                    amount: Some(transfer.amount),
                    metadata: serde_json::json!({
                        "transfer_id": transfer.id,
                        "event_id": event.id,
                    }),
                },
            );
        }

        Ok(transfer)
    }

    /// External funds entering the system: a completed transfer with no
    /// sender, credited straight to the user's wallet.
    pub async fn record_top_up(
        pool: &DbPool,
        notifier: &Notifier,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Transfer, LedgerError> {
        Self::record_transfer(
            pool,
            notifier,
            NewTransfer {
                sender_id: None,
                receiver_id: Some(user_id),
                amount,
                transfer_type: TransferType::TopUp,
                message: None,
                event_id: None,
            },
        )
        .await
    }

    /// A user's transfer history, newest first. Count and page are read in
    /// one repeatable-read transaction so the page matches its total.
    pub async fn history(
        pool: &DbPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<TransferPage, LedgerError> {
        let limit = limit.clamp(1, 200);
        let offset = offset.max(0);

        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfers WHERE sender_id = $1 OR receiver_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let transfers = sqlx::query_as::<_, Transfer>(
            "SELECT * FROM transfers
             WHERE sender_id = $1 OR receiver_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TransferPage {
            transfers,
            total,
            limit,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(
        sender: Option<Uuid>,
        receiver: Option<Uuid>,
        amount: i64,
        event: Option<Uuid>,
    ) -> NewTransfer {
        NewTransfer {
            sender_id: sender,
            receiver_id: receiver,
            amount: Decimal::from(amount),
            transfer_type: TransferType::Transfer,
            message: None,
            event_id: event,
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let new = transfer(Some(Uuid::new_v4()), Some(Uuid::new_v4()), 0, None);
        assert!(matches!(
            TransferLedger::validate(&new),
            Err(LedgerError::InvalidAmount)
        ));
    }

    #[test]
    fn rejects_transfer_with_no_parties() {
        let new = transfer(None, None, 100, None);
        assert!(matches!(
            TransferLedger::validate(&new),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn event_contribution_cannot_name_a_wallet_receiver() {
        let new = transfer(
            Some(Uuid::new_v4()),
            Some(Uuid::new_v4()),
            100,
            Some(Uuid::new_v4()),
        );
        assert!(matches!(
            TransferLedger::validate(&new),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn top_up_shape_is_valid() {
        let new = NewTransfer {
            sender_id: None,
            receiver_id: Some(Uuid::new_v4()),
            amount: Decimal::from(500),
            transfer_type: TransferType::TopUp,
            message: None,
            event_id: None,
        };
        assert!(TransferLedger::validate(&new).is_ok());
    }

    #[test]
    fn event_contribution_shape_is_valid() {
        let new = transfer(Some(Uuid::new_v4()), None, 200, Some(Uuid::new_v4()));
        assert!(TransferLedger::validate(&new).is_ok());
    }
}
