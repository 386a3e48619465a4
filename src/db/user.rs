//! User repository

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{DbPool, parse_datetime};
use crate::{Error, Result};

/// A local user bound to an identity provider subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub cognito_sub: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, cognito_sub, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        cognito_sub: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

/// User repository
#[derive(Clone)]
pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    /// Create a new user repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find the user for a subject, creating it on first sight
    ///
    /// The insert tolerates a concurrent insert of the same subject: the
    /// unique constraint on `cognito_sub` turns the loser into a no-op and
    /// both callers read back the same row.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_or_create_by_subject(&self, subject: &str) -> Result<User> {
        if let Some(user) = self.find_by_subject(subject)? {
            return Ok(user);
        }

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT INTO users (id, cognito_sub, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(cognito_sub) DO NOTHING",
                rusqlite::params![id, subject, now],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if inserted > 0 {
            tracing::info!(user_id = %id, "created user for new subject");
        }
        drop(conn);

        self.find_by_subject(subject)?
            .ok_or_else(|| Error::Database(format!("user for subject {subject} vanished after insert")))
    }

    /// Find a user by identity provider subject
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_subject(&self, subject: &str) -> Result<Option<User>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE cognito_sub = ?1"),
                [subject],
                row_to_user,
            )
            .optional()?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> UserRepo {
        let pool = init_memory().unwrap();
        UserRepo::new(pool)
    }

    #[test]
    fn test_find_or_create_user() {
        let repo = setup();

        let user = repo.find_or_create_by_subject("sub-123").unwrap();
        assert_eq!(user.cognito_sub, "sub-123");
        assert!(Uuid::parse_str(&user.id).is_ok());

        // Should return same user
        let user2 = repo.find_or_create_by_subject("sub-123").unwrap();
        assert_eq!(user.id, user2.id);
    }

    #[test]
    fn test_distinct_subjects_get_distinct_users() {
        let repo = setup();

        let a = repo.find_or_create_by_subject("sub-a").unwrap();
        let b = repo.find_or_create_by_subject("sub-b").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_find_by_subject() {
        let repo = setup();

        let user = repo.find_or_create_by_subject("sub-find").unwrap();
        let found = repo.find_by_subject("sub-find").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(repo.find_by_subject("missing").unwrap().is_none());
    }
}
