use anyhow::{Result, bail};
use rusqlite::{Connection, ToSql};
use tracing::error;

use crate::models::{NewUser, UserChanges, UserRow};
use crate::{Database, OptionalExt};

const USER_COLUMNS: &str = "user_id, name, email, password, city, country, photo_filename";

impl Database {
    /// Inserts a user and returns the new id. A taken email surfaces as a
    /// unique-constraint error (see [`crate::is_unique_violation`]).
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (name, email, password, city, country) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.name,
                    user.email,
                    user.password_hash,
                    user.city,
                    user.country
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "user_id = ?1", &user_id))
    }

    pub fn get_user_id_by_token(&self, token: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id FROM users WHERE auth_token = ?1",
                [token],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Sets or clears (`None`) the user's session token.
    pub fn set_auth_token(&self, user_id: i64, token: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET auth_token = ?1 WHERE user_id = ?2",
                rusqlite::params![token, user_id],
            )?;
            Ok(())
        })
    }

    /// Applies only the supplied columns.
    pub fn update_user(&self, user_id: i64, changes: &UserChanges) -> Result<()> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(name) = &changes.name {
            assignments.push("name = ?");
            values.push(name);
        }
        if let Some(email) = &changes.email {
            assignments.push("email = ?");
            values.push(email);
        }
        if let Some(hash) = &changes.password_hash {
            assignments.push("password = ?");
            values.push(hash);
        }
        if let Some(city) = &changes.city {
            assignments.push("city = ?");
            values.push(city);
        }
        if let Some(country) = &changes.country {
            assignments.push("country = ?");
            values.push(country);
        }

        if assignments.is_empty() {
            return Ok(());
        }
        values.push(&user_id);

        let sql = format!("UPDATE users SET {} WHERE user_id = ?", assignments.join(", "));
        self.with_conn_mut(|conn| {
            conn.execute(&sql, values.as_slice())?;
            Ok(())
        })
    }

    /// Best-effort lookup: a store error is logged and reported as "no photo".
    pub fn get_user_photo_filename(&self, user_id: i64) -> Option<String> {
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT photo_filename FROM users WHERE user_id = ?1",
                [user_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
        });

        match result {
            Ok(filename) => filename.flatten(),
            Err(e) => {
                error!("Failed to look up photo for user {}: {}", user_id, e);
                None
            }
        }
    }

    pub fn set_user_photo_filename(&self, user_id: i64, filename: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET photo_filename = ?1 WHERE user_id = ?2",
                rusqlite::params![filename, user_id],
            )?;
            if changed != 1 {
                bail!("Expected exactly one user photo to change, but {} did", changed);
            }
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &dyn ToSql) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            user_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            city: row.get(4)?,
            country: row.get(5)?,
            photo_filename: row.get(6)?,
        })
    })
    .optional()
}

#[cfg(test)]
mod tests {
    use crate::is_unique_violation;
    use crate::models::{NewUser, UserChanges};
    use crate::test_support::{add_user, open_temp};

    #[test]
    fn create_and_find_user() {
        let (_dir, db) = open_temp();
        let id = add_user(&db, "Alice");

        let by_id = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(by_id.name, "Alice");
        assert_eq!(by_id.email, "alice@example.com");

        let by_email = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.user_id, id);
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let (_dir, db) = open_temp();
        add_user(&db, "Alice");

        let err = db
            .create_user(&NewUser {
                name: "Other Alice",
                email: "alice@example.com",
                password_hash: "hash",
                city: None,
                country: None,
            })
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn token_set_and_cleared() {
        let (_dir, db) = open_temp();
        let id = add_user(&db, "Alice");

        db.set_auth_token(id, Some("abc")).unwrap();
        assert_eq!(db.get_user_id_by_token("abc").unwrap(), Some(id));

        db.set_auth_token(id, None).unwrap();
        assert_eq!(db.get_user_id_by_token("abc").unwrap(), None);
    }

    #[test]
    fn update_touches_only_supplied_columns() {
        let (_dir, db) = open_temp();
        let id = add_user(&db, "Alice");

        db.update_user(
            id,
            &UserChanges {
                city: Some("Dunedin".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.city.as_deref(), Some("Dunedin"));
        assert_eq!(user.country.as_deref(), Some("New Zealand"));
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn photo_filename_round_trip() {
        let (_dir, db) = open_temp();
        let id = add_user(&db, "Alice");
        assert_eq!(db.get_user_photo_filename(id), None);

        db.set_user_photo_filename(id, Some("a.png")).unwrap();
        assert_eq!(db.get_user_photo_filename(id).as_deref(), Some("a.png"));

        assert!(db.set_user_photo_filename(9999, Some("b.png")).is_err());
    }
}
