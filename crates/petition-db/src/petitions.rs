use std::collections::HashSet;

use anyhow::{Result, bail};
use rusqlite::{Connection, ToSql};
use tracing::error;

use petition_types::api::{PetitionSummary, SearchQuery};
use petition_types::models::Category;

use crate::models::{NewPetition, PetitionChanges, PetitionRow};
use crate::search::build_search;
use crate::{Database, OptionalExt};

impl Database {
    // -- Categories --

    pub fn get_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT category_id, name FROM categories ORDER BY category_id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Category {
                        category_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn category_exists(&self, category_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM categories WHERE category_id = ?1",
                    [category_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Petitions --

    pub fn search_petitions(&self, query: &SearchQuery) -> Result<Vec<PetitionSummary>> {
        let built = build_search(query);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&built.sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(built.params.iter()), |row| {
                    Ok(PetitionSummary {
                        petition_id: row.get(0)?,
                        title: row.get(1)?,
                        category: row.get(2)?,
                        author_name: row.get(3)?,
                        signature_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_petition(&self, petition: &NewPetition<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO petitions (title, description, author_id, category_id, created_date, closing_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    petition.title,
                    petition.description,
                    petition.author_id,
                    petition.category_id,
                    petition.created_date,
                    petition.closing_date,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_petition(&self, petition_id: i64) -> Result<Option<PetitionRow>> {
        self.with_conn(|conn| query_petition(conn, petition_id))
    }

    /// Applies only the supplied columns.
    pub fn update_petition(&self, petition_id: i64, changes: &PetitionChanges) -> Result<()> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(title) = &changes.title {
            assignments.push("title = ?");
            values.push(title);
        }
        if let Some(description) = &changes.description {
            assignments.push("description = ?");
            values.push(description);
        }
        if let Some(category_id) = &changes.category_id {
            assignments.push("category_id = ?");
            values.push(category_id);
        }
        if let Some(closing_date) = &changes.closing_date {
            assignments.push("closing_date = ?");
            values.push(closing_date);
        }

        if assignments.is_empty() {
            return Ok(());
        }
        values.push(&petition_id);

        let sql = format!(
            "UPDATE petitions SET {} WHERE petition_id = ?",
            assignments.join(", ")
        );
        self.with_conn_mut(|conn| {
            conn.execute(&sql, values.as_slice())?;
            Ok(())
        })
    }

    /// Deletes the petition (its signatures cascade) and returns the photo
    /// filename it referenced, so the caller can remove the blob.
    pub fn delete_petition(&self, petition_id: i64) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let photo: Option<String> = tx
                .query_row(
                    "SELECT photo_filename FROM petitions WHERE petition_id = ?1",
                    [petition_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();

            let deleted =
                tx.execute("DELETE FROM petitions WHERE petition_id = ?1", [petition_id])?;
            if deleted != 1 {
                bail!(
                    "Should be exactly one petition that was deleted, but it was {}",
                    deleted
                );
            }

            tx.commit()?;
            Ok(photo)
        })
    }

    /// Best-effort lookup: a store error is logged and reported as "no photo".
    pub fn get_petition_photo_filename(&self, petition_id: i64) -> Option<String> {
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT photo_filename FROM petitions WHERE petition_id = ?1",
                [petition_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
        });

        match result {
            Ok(filename) => filename.flatten(),
            Err(e) => {
                error!("Failed to look up photo for petition {}: {}", petition_id, e);
                None
            }
        }
    }

    pub fn set_petition_photo_filename(&self, petition_id: i64, filename: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE petitions SET photo_filename = ?1 WHERE petition_id = ?2",
                rusqlite::params![filename, petition_id],
            )?;
            if changed != 1 {
                bail!(
                    "Should be exactly one petition photo that was modified, but it was {}",
                    changed
                );
            }
            Ok(())
        })
    }

    /// Every photo filename referenced by a user or petition row.
    pub fn referenced_photo_filenames(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT photo_filename FROM users WHERE photo_filename IS NOT NULL
                 UNION
                 SELECT photo_filename FROM petitions WHERE photo_filename IS NOT NULL",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(names)
        })
    }
}

fn query_petition(conn: &Connection, petition_id: i64) -> Result<Option<PetitionRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.petition_id, p.title, p.description, p.author_id,
                u.name, u.city, u.country, c.name,
                (SELECT COUNT(*) FROM signatures s WHERE s.petition_id = p.petition_id),
                p.created_date, p.closing_date
         FROM petitions p
         LEFT JOIN users u ON u.user_id = p.author_id
         LEFT JOIN categories c ON c.category_id = p.category_id
         WHERE p.petition_id = ?1",
    )?;

    stmt.query_row([petition_id], |row| {
        Ok(PetitionRow {
            petition_id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            author_id: row.get(3)?,
            author_name: row.get(4)?,
            author_city: row.get(5)?,
            author_country: row.get(6)?,
            category: row.get(7)?,
            signature_count: row.get(8)?,
            created_date: row.get(9)?,
            closing_date: row.get(10)?,
        })
    })
    .optional()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use petition_types::api::SearchQuery;
    use petition_types::models::SortBy;

    use crate::Database;
    use crate::models::{NewPetition, PetitionChanges};
    use crate::test_support::{add_user, open_temp};

    fn add_petition(db: &Database, author_id: i64, title: &str, category_id: i64) -> i64 {
        db.create_petition(&NewPetition {
            title,
            description: "A description",
            author_id,
            category_id,
            created_date: Utc::now(),
            closing_date: Some(Utc::now() + Duration::days(30)),
        })
        .unwrap()
    }

    fn sign(db: &Database, petition_id: i64, user_id: i64) {
        db.add_signature(petition_id, user_id, Utc::now()).unwrap();
    }

    #[test]
    fn categories_are_seeded() {
        let (_dir, db) = open_temp();
        let categories = db.get_categories().unwrap();
        assert!(!categories.is_empty());
        assert!(db.category_exists(categories[0].category_id).unwrap());
        assert!(!db.category_exists(9999).unwrap());
    }

    #[test]
    fn petition_detail_joins_author_and_counts_signatures() {
        let (_dir, db) = open_temp();
        let author = add_user(&db, "Alice");
        let signer = add_user(&db, "Bob");
        let id = add_petition(&db, author, "Save the kea", 1);
        sign(&db, id, signer);

        let row = db.get_petition(id).unwrap().unwrap();
        assert_eq!(row.title, "Save the kea");
        assert_eq!(row.author_id, author);
        assert_eq!(row.author_name.as_deref(), Some("Alice"));
        assert_eq!(row.category.as_deref(), Some("Animal Rights"));
        assert_eq!(row.signature_count, 1);
        assert!(db.get_petition(id + 100).unwrap().is_none());
    }

    #[test]
    fn search_orders_by_signatures_then_id() {
        let (_dir, db) = open_temp();
        let author = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let carol = add_user(&db, "Carol");

        let a = add_petition(&db, author, "A", 1);
        let b = add_petition(&db, author, "B", 1);
        let c = add_petition(&db, author, "C", 2);
        sign(&db, c, bob);
        sign(&db, c, carol);
        sign(&db, b, bob);

        let ids: Vec<i64> = db
            .search_petitions(&SearchQuery::default())
            .unwrap()
            .into_iter()
            .map(|p| p.petition_id)
            .collect();
        assert_eq!(ids, vec![c, b, a]);

        let asc = SearchQuery {
            sort_by: SortBy::SignaturesAsc,
            ..Default::default()
        };
        let ids: Vec<i64> = db
            .search_petitions(&asc)
            .unwrap()
            .into_iter()
            .map(|p| p.petition_id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn search_filters_and_pages() {
        let (_dir, db) = open_temp();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        add_petition(&db, alice, "Protect rivers", 3);
        add_petition(&db, alice, "Protect forests", 3);
        add_petition(&db, bob, "Fund schools", 2);
        add_petition(&db, bob, "Protect bees", 1);

        let by_title = db
            .search_petitions(&SearchQuery {
                q: Some("Protect".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_title.len(), 3);

        let by_author_and_category = db
            .search_petitions(&SearchQuery {
                author_id: Some(alice),
                category_id: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_author_and_category.len(), 2);

        let page = db
            .search_petitions(&SearchQuery {
                sort_by: SortBy::AlphabeticalAsc,
                count: Some(2),
                start_index: Some(1),
                ..Default::default()
            })
            .unwrap();
        let titles: Vec<&str> = page.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Protect bees", "Protect forests"]);

        let tail = db
            .search_petitions(&SearchQuery {
                start_index: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[test]
    fn alphabetical_sort_ignores_case() {
        let (_dir, db) = open_temp();
        let alice = add_user(&db, "Alice");
        for title in ["banana", "Apple", "cherry", "Date"] {
            add_petition(&db, alice, title, 1);
        }

        let titles = |sort_by: SortBy| -> Vec<String> {
            db.search_petitions(&SearchQuery {
                sort_by,
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect()
        };

        assert_eq!(titles(SortBy::AlphabeticalAsc), ["Apple", "banana", "cherry", "Date"]);
        assert_eq!(titles(SortBy::AlphabeticalDesc), ["Date", "cherry", "banana", "Apple"]);
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let (_dir, db) = open_temp();
        let author = add_user(&db, "Alice");
        let id = add_petition(&db, author, "Old title", 1);

        db.update_petition(
            id,
            &PetitionChanges {
                title: Some("New title".into()),
                category_id: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

        let row = db.get_petition(id).unwrap().unwrap();
        assert_eq!(row.title, "New title");
        assert_eq!(row.description, "A description");
        assert_eq!(row.category.as_deref(), Some("Education"));
    }

    #[test]
    fn delete_returns_photo_and_cascades_signatures() {
        let (_dir, db) = open_temp();
        let author = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let id = add_petition(&db, author, "Doomed", 1);
        sign(&db, id, bob);
        db.set_petition_photo_filename(id, "photo.png").unwrap();

        assert_eq!(db.delete_petition(id).unwrap().as_deref(), Some("photo.png"));
        assert!(db.get_petition(id).unwrap().is_none());
        assert!(!db.has_signed(id, bob).unwrap());

        assert!(db.delete_petition(id).is_err());
    }

    #[test]
    fn referenced_photos_span_users_and_petitions() {
        let (_dir, db) = open_temp();
        let author = add_user(&db, "Alice");
        let id = add_petition(&db, author, "Pictured", 1);
        db.set_user_photo_filename(author, Some("user.jpg")).unwrap();
        db.set_petition_photo_filename(id, "petition.gif").unwrap();

        let names = db.referenced_photo_filenames().unwrap();
        assert!(names.contains("user.jpg"));
        assert!(names.contains("petition.gif"));
        assert_eq!(names.len(), 2);
    }
}
