use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::ids::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A local user record. Owned by identity sync: the webhook stream is the
/// only writer. `email` is the correlation key for provider events;
/// `external_id` is the provider's stable reference when the event carries
/// one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub image_url: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or update a user keyed by email. Replaying the same upsert is
    /// idempotent: an existing row is updated in place, never duplicated.
    #[instrument(skip(self), fields(email))]
    pub fn upsert_by_email(
        &self,
        email: &str,
        name: &str,
        image_url: &str,
        external_id: Option<&str>,
    ) -> Result<UserRow, StoreError> {
        if email.trim().is_empty() {
            return Err(StoreError::Invalid("email must not be empty".into()));
        }

        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO users (id, external_id, email, name, image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(email) DO UPDATE SET
                     name = excluded.name,
                     image_url = excluded.image_url,
                     external_id = COALESCE(excluded.external_id, users.external_id),
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    UserId::new().as_str(),
                    external_id,
                    email,
                    name,
                    image_url,
                    now,
                ],
            )?;

            get_by_email_inner(conn, email)
        })
    }

    /// Get a user by email.
    #[instrument(skip(self), fields(email))]
    pub fn get_by_email(&self, email: &str) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| get_by_email_inner(conn, email))
    }

    /// Delete a user by email. Returns whether a row existed; deleting an
    /// absent user is not an error (event delivery is at-least-once).
    #[instrument(skip(self), fields(email))]
    pub fn delete_by_email(&self, email: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE email = ?1", [email])?;
            Ok(changed > 0)
        })
    }

    /// Count of user records (for health/diagnostic surfaces).
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }
}

fn get_by_email_inner(conn: &rusqlite::Connection, email: &str) -> Result<UserRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id, email, name, image_url, created_at, updated_at
         FROM users WHERE email = ?1",
    )?;
    let mut rows = stmt.query([email])?;
    match rows.next()? {
        Some(row) => Ok(UserRow {
            id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
            external_id: row_helpers::get_opt(row, 1, "users", "external_id")?,
            email: row_helpers::get(row, 2, "users", "email")?,
            name: row_helpers::get(row, 3, "users", "name")?,
            image_url: row_helpers::get(row, 4, "users", "image_url")?,
            created_at: row_helpers::get(row, 5, "users", "created_at")?,
            updated_at: row_helpers::get(row, 6, "users", "updated_at")?,
        }),
        None => Err(StoreError::NotFound(format!("user {email}"))),
    }
}
