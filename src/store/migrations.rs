//! Schema versions for the libSQL backend.
//!
//! `_migrations` holds one row per applied step. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a crash never
//! leaves a half-applied version behind.

use libsql::Connection;

use crate::error::DatabaseError;

struct Step {
    version: i64,
    name: &'static str,
    ddl: &'static str,
}

/// Append only. Never edit a step that has shipped.
const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "dedup_and_thread_memory",
        ddl: "
            CREATE TABLE IF NOT EXISTS processed_messages (
                message_id TEXT PRIMARY KEY,
                result TEXT NOT NULL,
                processed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS threads (
                thread_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                last_action TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        ",
    },
    Step {
        version: 2,
        name: "meetings_and_todos",
        ddl: "
            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                datetime TEXT NOT NULL,
                attendees TEXT NOT NULL,
                source_message_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_meetings_created ON meetings(created_at);
            CREATE TABLE IF NOT EXISTS todos (
                id TEXT PRIMARY KEY,
                task TEXT NOT NULL,
                due_date TEXT NOT NULL,
                source_message_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_todos_created ON todos(created_at);
        ",
    },
];

fn migration_err(context: &str) -> impl FnOnce(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Migration(format!("{context}: {e}"))
}

/// Bring the schema up to the newest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(migration_err("cannot create version table"))?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Step> = STEPS.iter().filter(|s| s.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Applying schema step");
        // constants only, no user input
        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, name) VALUES ({}, '{}');\nCOMMIT;",
            step.ddl, step.version, step.name
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            // harmless if the batch never reached BEGIN
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "step V{} {} failed: {e}",
                step.version, step.name
            )));
        }
    }
    Ok(())
}

/// Newest applied version, 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(migration_err("cannot read schema version"))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(migration_err("cannot read schema version"))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(migration_err("schema version is not an integer"))
}
