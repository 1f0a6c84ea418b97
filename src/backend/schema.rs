use rusqlite::Connection;

use crate::error::BackendResult;

pub fn apply(conn: &Connection) -> BackendResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            fields TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            seq INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS documents_by_collection
            ON documents(collection, seq);

        CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT,
            created_at INTEGER NOT NULL,
            last_sign_in_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
