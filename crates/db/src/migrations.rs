use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    async fn memory_pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect")
    }

    async fn object_names(pool: &DbPool) -> Vec<String> {
        let mut names: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master
             WHERE type IN ('table', 'index') AND name LIKE '%clarifier_session%'
               AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(pool)
        .await
        .expect("list schema objects")
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn session_table_has_the_persisted_columns() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(clarifier_session)")
            .fetch_all(&pool)
            .await
            .expect("table info")
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        assert_eq!(
            columns,
            ["session_id", "flow", "user_id", "state", "payload_json", "created_at", "updated_at"]
        );
    }

    #[tokio::test]
    async fn rerunning_is_a_noop_and_undo_drops_everything() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");
        run_pending(&pool).await.expect("second run is a noop");

        assert_eq!(
            object_names(&pool).await,
            [
                "clarifier_session",
                "idx_clarifier_session_updated_at",
                "idx_clarifier_session_user_id",
            ]
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(object_names(&pool).await.is_empty());
    }
}
