use log::info;
use sqlx::{Executor, PgPool};

/// Migration scripts in application order. Every script is idempotent so the
/// whole list is replayed on each start.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_create_users.sql", include_str!("sql/001_create_users.sql")),
    ("002_create_alerts.sql", include_str!("sql/002_create_alerts.sql")),
    (
        "003_create_alert_evidence.sql",
        include_str!("sql/003_create_alert_evidence.sql"),
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
    }

    Ok(())
}

async fn execute_migration(
    pool: &PgPool,
    name: &str,
    sql: &'static str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    pool.execute(sql).await?;
    info!("Applied migration: {}", name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_by_prefix() {
        let prefixes: Vec<u32> = MIGRATIONS
            .iter()
            .map(|(name, _)| name.split('_').next().unwrap().parse().unwrap())
            .collect();
        let mut sorted = prefixes.clone();
        sorted.sort();
        assert_eq!(prefixes, sorted);
    }

    #[test]
    fn uniqueness_constraints_are_declared() {
        let all: String = MIGRATIONS.iter().map(|(_, sql)| *sql).collect();
        assert!(all.contains("UNIQUE (user_id, session_key)"));
        assert!(all.contains("UNIQUE (alert_id, sequence_index)"));
        assert!(all.contains("ON DELETE CASCADE"));
    }
}
