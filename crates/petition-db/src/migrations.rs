use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                user_id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                city            TEXT,
                country         TEXT,
                photo_filename  TEXT,
                auth_token      TEXT UNIQUE
            );

            CREATE TABLE categories (
                category_id     INTEGER PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE
            );

            CREATE TABLE petitions (
                petition_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                author_id       INTEGER NOT NULL REFERENCES users(user_id),
                category_id     INTEGER NOT NULL REFERENCES categories(category_id),
                created_date    TEXT NOT NULL,
                closing_date    TEXT,
                photo_filename  TEXT
            );

            CREATE INDEX idx_petitions_author ON petitions(author_id);
            CREATE INDEX idx_petitions_category ON petitions(category_id);

            CREATE TABLE signatures (
                signatory_id    INTEGER NOT NULL REFERENCES users(user_id),
                petition_id     INTEGER NOT NULL REFERENCES petitions(petition_id) ON DELETE CASCADE,
                signed_date     TEXT NOT NULL,
                PRIMARY KEY (signatory_id, petition_id)
            );

            CREATE INDEX idx_signatures_petition ON signatures(petition_id, signed_date);

            INSERT INTO categories (category_id, name) VALUES
                (1, 'Animal Rights'),
                (2, 'Education'),
                (3, 'Environment'),
                (4, 'Health'),
                (5, 'Human Rights'),
                (6, 'Justice'),
                (7, 'Politics'),
                (8, 'Technology');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
