// Schema setup for the transcriptions table
// Additive only: missing columns are added, existing rows are never touched

use rusqlite::Connection;
use tracing::info;

/// Columns added after the first release, with their SQL type
const ADDED_COLUMNS: &[(&str, &str)] = &[("audio_path", "TEXT"), ("segments", "TEXT")];

/// Create the table if needed and add any columns an older database lacks
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS transcriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            transcript TEXT NOT NULL,
            audio_path TEXT,
            segments TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )?;

    let existing = table_columns(conn, "transcriptions")?;

    for (column, sql_type) in ADDED_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            info!("Migrating database: adding {} column", column);
            conn.execute(
                &format!("ALTER TABLE transcriptions ADD COLUMN {} {}", column, sql_type),
                [],
            )?;
        }
    }

    Ok(())
}

/// Column names of a table, in declaration order
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}
