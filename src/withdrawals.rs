// Withdrawal eligibility and lifecycle

use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::database::{funding_scope, Database, DbPool};
use crate::error::LedgerError;
use crate::events::EventFunds;
use crate::models::{Withdrawal, WithdrawalRequest, WithdrawalType};
use crate::notify::{Notifier, NotificationPayload};
use crate::wallet::{ensure_positive, WalletStore};

pub struct WithdrawalProcessor;

/// Destination details must match the payout type.
pub fn validate_destination(req: &WithdrawalRequest) -> Result<(), LedgerError> {
    fn present(field: &Option<String>) -> bool {
        field.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    match req.withdrawal_type {
        WithdrawalType::Bank => {
            if !present(&req.bank_name) {
                return Err(LedgerError::InvalidDestination("bank name is required"));
            }
            if !present(&req.account_number) {
                return Err(LedgerError::InvalidDestination("account number is required"));
            }
            if !present(&req.account_name) {
                return Err(LedgerError::InvalidDestination("account name is required"));
            }
        }
        WithdrawalType::WalletAddress => {
            if !present(&req.wallet_address) {
                return Err(LedgerError::InvalidDestination("wallet address is required"));
            }
        }
    }
    Ok(())
}

impl WithdrawalProcessor {
    /// Validate eligibility and insert a pending withdrawal.
    ///
    /// The sufficiency check and the insert run under a per-scope advisory
    /// lock inside one transaction, so two requests racing the same funds
    /// are serialized: the second sees the first's row in the aggregate (or
    /// the already-debited wallet) and fails cleanly.
    pub async fn request(
        pool: &DbPool,
        notifier: &Notifier,
        principal: &Principal,
        req: WithdrawalRequest,
    ) -> Result<Withdrawal, LedgerError> {
        ensure_positive(req.amount)?;
        validate_destination(&req)?;

        let mut tx = pool.begin().await?;
        let scope = funding_scope(req.event_id, principal.user_id);
        Database::lock_scope(&mut tx, scope).await?;

        let available = match req.event_id {
            Some(event_id) => {
                let event = EventFunds::get(&mut tx, event_id).await?;
                if event.celebrant_id != principal.user_id {
                    return Err(LedgerError::Unauthorized);
                }
                EventFunds::balance(&mut tx, event_id).await?.remaining
            }
            None => WalletStore::get_or_create(&mut tx, principal.user_id)
                .await?
                .balance,
        };

        if req.amount > available {
            return Err(LedgerError::InsufficientFunds {
                available,
                requested: req.amount,
            });
        }

        // Personal withdrawals leave the wallet immediately; event
        // withdrawals claim escrowed funds through the aggregate alone.
        if req.event_id.is_none() {
            WalletStore::debit(&mut tx, principal.user_id, req.amount).await?;
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            "INSERT INTO withdrawals
                (user_id, event_id, bu_amount, naira_amount, withdrawal_type,
                 bank_name, account_number, account_name, wallet_address)
             VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(principal.user_id)
        .bind(req.event_id)
        .bind(req.amount)
        .bind(req.withdrawal_type)
        .bind(&req.bank_name)
        .bind(&req.account_number)
        .bind(&req.account_name)
        .bind(&req.wallet_address)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "withdrawal {} of {} BU requested (scope: {})",
            withdrawal.id,
            withdrawal.bu_amount,
            withdrawal
                .event_id
                .map_or("personal".to_string(), |id| id.to_string())
        );

        notifier.notify(
            principal.user_id,
            NotificationPayload {
                kind: "withdrawal_requested",
                title: "Withdrawal requested".into(),
                message: format!("Withdrawal of {} BU is pending", withdrawal.bu_amount),
                amount: Some(withdrawal.bu_amount),
                metadata: serde_json::json!({ "withdrawal_id": withdrawal.id }),
            },
        );

        Ok(withdrawal)
    }

    /// Drive `pending -> processing -> completed`. The payout integration is
    /// synchronous here, so processing completes in one call; both hops are
    /// guarded updates and a raced or replayed call fails `InvalidState`.
    pub async fn process(
        pool: &DbPool,
        notifier: &Notifier,
        withdrawal_id: Uuid,
    ) -> Result<Withdrawal, LedgerError> {
        let current = Self::get(pool, withdrawal_id).await?;
        if !current.status.may_begin_processing() {
            return Err(LedgerError::InvalidState(format!(
                "cannot process a {} withdrawal",
                current.status.as_str()
            )));
        }

        let processing = sqlx::query_as::<_, Withdrawal>(
            "UPDATE withdrawals SET status = 'processing'
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(withdrawal_id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::Conflict)?;

        let completed = sqlx::query_as::<_, Withdrawal>(
            "UPDATE withdrawals SET status = 'completed', completed_at = NOW()
             WHERE id = $1 AND status = 'processing'
             RETURNING *",
        )
        .bind(processing.id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::Conflict)?;

        info!("withdrawal {} completed", completed.id);

        notifier.notify(
            completed.user_id,
            NotificationPayload {
                kind: "withdrawal_completed",
                title: "Withdrawal completed".into(),
                message: format!("Withdrawal of {} BU was paid out", completed.bu_amount),
                amount: Some(completed.bu_amount),
                metadata: serde_json::json!({ "withdrawal_id": completed.id }),
            },
        );

        Ok(completed)
    }

    /// Mark a withdrawal failed. A failed personal withdrawal returns the
    /// debited funds to the wallet; a failed event withdrawal simply drops
    /// out of the aggregate.
    pub async fn fail(
        pool: &DbPool,
        notifier: &Notifier,
        withdrawal_id: Uuid,
        reason: &str,
    ) -> Result<Withdrawal, LedgerError> {
        let current = Self::get(pool, withdrawal_id).await?;
        if !current.status.may_fail() {
            return Err(LedgerError::InvalidState(format!(
                "cannot fail a {} withdrawal",
                current.status.as_str()
            )));
        }

        let mut tx = pool.begin().await?;

        let failed = sqlx::query_as::<_, Withdrawal>(
            "UPDATE withdrawals SET status = 'failed', failure_reason = $2
             WHERE id = $1 AND status IN ('pending', 'processing')
             RETURNING *",
        )
        .bind(withdrawal_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::Conflict)?;

        if failed.event_id.is_none() {
            WalletStore::credit(&mut tx, failed.user_id, failed.bu_amount).await?;
        }

        tx.commit().await?;

        notifier.notify(
            failed.user_id,
            NotificationPayload {
                kind: "withdrawal_failed",
                title: "Withdrawal failed".into(),
                message: format!(
                    "Withdrawal of {} BU failed: {}",
                    failed.bu_amount, reason
                ),
                amount: Some(failed.bu_amount),
                metadata: serde_json::json!({ "withdrawal_id": failed.id }),
            },
        );

        Ok(failed)
    }

    pub async fn get(pool: &DbPool, withdrawal_id: Uuid) -> Result<Withdrawal, LedgerError> {
        sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = $1")
            .bind(withdrawal_id)
            .fetch_optional(pool)
            .await?
            .ok_or(LedgerError::NotFound("withdrawal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bank_request(amount: i64) -> WithdrawalRequest {
        WithdrawalRequest {
            event_id: None,
            amount: Decimal::from(amount),
            withdrawal_type: WithdrawalType::Bank,
            bank_name: Some("First Bank".into()),
            account_number: Some("0123456789".into()),
            account_name: Some("Ada O.".into()),
            wallet_address: None,
        }
    }

    #[test]
    fn bank_destination_requires_all_three_fields() {
        assert!(validate_destination(&bank_request(100)).is_ok());

        let mut missing_account = bank_request(100);
        missing_account.account_number = None;
        assert!(matches!(
            validate_destination(&missing_account),
            Err(LedgerError::InvalidDestination(_))
        ));

        let mut blank_name = bank_request(100);
        blank_name.account_name = Some("   ".into());
        assert!(matches!(
            validate_destination(&blank_name),
            Err(LedgerError::InvalidDestination(_))
        ));
    }

    #[test]
    fn wallet_destination_requires_an_address() {
        let req = WithdrawalRequest {
            event_id: None,
            amount: Decimal::from(50),
            withdrawal_type: WithdrawalType::WalletAddress,
            bank_name: None,
            account_number: None,
            account_name: None,
            wallet_address: Some("0xdeadbeef".into()),
        };
        assert!(validate_destination(&req).is_ok());

        let missing = WithdrawalRequest {
            wallet_address: None,
            ..req
        };
        assert!(matches!(
            validate_destination(&missing),
            Err(LedgerError::InvalidDestination(_))
        ));
    }

    #[test]
    fn bank_fields_are_ignored_for_wallet_withdrawals() {
        let req = WithdrawalRequest {
            event_id: None,
            amount: Decimal::from(50),
            withdrawal_type: WithdrawalType::WalletAddress,
            bank_name: None,
            account_number: None,
            account_name: None,
            wallet_address: Some("addr1".into()),
        };
        assert!(validate_destination(&req).is_ok());
    }
}
