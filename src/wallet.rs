// Wallet store: the only component that mutates balances

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::DbPool;
use crate::error::LedgerError;
use crate::models::Wallet;

pub struct WalletStore;

/// Mutation amounts must be strictly positive.
pub fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

impl WalletStore {
    /// Fetch the user's wallet, provisioning a zero-balance one on first
    /// access. `ON CONFLICT DO NOTHING` makes concurrent first accesses
    /// converge on a single row.
    pub async fn get_or_create(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Wallet, LedgerError> {
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(wallet)
    }

    /// Pool-level lookup, provisioning on first access.
    pub async fn get(pool: &DbPool, user_id: Uuid) -> Result<Wallet, LedgerError> {
        let mut conn = pool.acquire().await?;
        Self::get_or_create(&mut conn, user_id).await
    }

    /// Add `amount` BU. The increment happens in the store, never as a
    /// caller-side read-modify-write.
    pub async fn credit(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError> {
        ensure_positive(amount)?;

        Self::get_or_create(&mut *conn, user_id).await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            "UPDATE wallets
             SET balance = balance + $2,
                 naira_balance = naira_balance + $2,
                 updated_at = NOW()
             WHERE user_id = $1
             RETURNING *",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wallet)
    }

    /// Remove `amount` BU. The sufficiency guard lives in the UPDATE
    /// predicate, so a concurrent debit cannot overdraw the wallet.
    pub async fn debit(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError> {
        ensure_positive(amount)?;

        let current = Self::get_or_create(&mut *conn, user_id).await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            "UPDATE wallets
             SET balance = balance - $2,
                 naira_balance = naira_balance - $2,
                 updated_at = NOW()
             WHERE user_id = $1 AND balance >= $2
             RETURNING *",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        wallet.ok_or(LedgerError::InsufficientFunds {
            available: current.balance,
            requested: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mutation paths are single guarded UPDATE statements exercised against
    // a live store; the amount validation is the pure part.

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert!(matches!(
            ensure_positive(Decimal::ZERO),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            ensure_positive(Decimal::from(-5)),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(ensure_positive(Decimal::new(1, 2)).is_ok());
    }

    #[test]
    fn insufficient_funds_reports_both_sides() {
        let err = LedgerError::InsufficientFunds {
            available: Decimal::new(30000, 2),
            requested: Decimal::new(50000, 2),
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("500"));
    }
}
