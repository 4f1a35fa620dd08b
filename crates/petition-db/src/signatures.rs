use anyhow::Result;
use chrono::{DateTime, Utc};

use petition_types::api::SignatureView;

use crate::{Database, OptionalExt};

impl Database {
    /// Signatures for a petition, earliest first.
    pub fn get_signatures(&self, petition_id: i64) -> Result<Vec<SignatureView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.signatory_id, u.name, u.city, u.country, s.signed_date
                 FROM signatures s
                 LEFT JOIN users u ON u.user_id = s.signatory_id
                 WHERE s.petition_id = ?1
                 ORDER BY s.signed_date ASC, s.signatory_id ASC",
            )?;

            let rows = stmt
                .query_map([petition_id], |row| {
                    Ok(SignatureView {
                        signatory_id: row.get(0)?,
                        name: row.get(1)?,
                        city: row.get(2)?,
                        country: row.get(3)?,
                        signed_date: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn has_signed(&self, petition_id: i64, signatory_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM signatures WHERE petition_id = ?1 AND signatory_id = ?2",
                    [petition_id, signatory_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// A second signature by the same user fails with a primary-key violation.
    pub fn add_signature(
        &self,
        petition_id: i64,
        signatory_id: i64,
        signed_date: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO signatures (signatory_id, petition_id, signed_date) VALUES (?1, ?2, ?3)",
                rusqlite::params![signatory_id, petition_id, signed_date],
            )?;
            Ok(())
        })
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn remove_signature(&self, petition_id: i64, signatory_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM signatures WHERE signatory_id = ?1 AND petition_id = ?2",
                [signatory_id, petition_id],
            )?;
            Ok(removed)
        })
    }
}
