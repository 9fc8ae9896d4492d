// Database layer: pool init, migrations, scope locking

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgConnection, Pool, Postgres};
use tracing::info;
use uuid::Uuid;

pub type DbPool = Pool<Postgres>;

pub struct Database;

impl Database {
    /// Initialize database connection pool
    pub async fn init(database_url: &str) -> Result<DbPool> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        // Run migrations
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(pool)
    }

    /// Serialize check-then-mutate sequences on a funding scope (an event id
    /// or a user id). Transaction-scoped advisory lock: released on
    /// commit/rollback, so callers must hold an open transaction.
    ///
    /// Every mutation touching an event's funds (contribution, withdrawal,
    /// deletion) must take this lock on the event id first, so none of them
    /// can fold the aggregate while another is mid-flight.
    pub async fn lock_scope(conn: &mut PgConnection, scope: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), 0)")
            .bind(scope.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// The lock key for a funding scope: the event when one is named, the user's
/// own wallet otherwise. Event-scoped callers and personal-scoped callers
/// must land on the same key for the same funds.
pub fn funding_scope(event_id: Option<Uuid>, user_id: Uuid) -> Uuid {
    event_id.unwrap_or(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_scoped_operations_share_one_lock_key() {
        let event = Uuid::new_v4();
        let user = Uuid::new_v4();
        // A contribution, a withdrawal, and a deletion against the same
        // event must serialize on the same key regardless of who calls.
        assert_eq!(funding_scope(Some(event), user), event);
        assert_eq!(funding_scope(Some(event), Uuid::new_v4()), event);
        assert_eq!(funding_scope(None, user), user);
    }
}
