//! Device repository

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{DbPool, parse_datetime};
use crate::{Error, Result};

/// A playback device bound to one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    /// Identifier the device presents in `X-Device-ID`
    pub device_code: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of binding a device code to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new device row was created
    Created,
    /// The caller already owned this device code
    Existing,
}

const DEVICE_COLUMNS: &str = "id, device_code, user_id, created_at, updated_at";

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        device_code: row.get(1)?,
        user_id: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// Device repository
#[derive(Clone)]
pub struct DeviceRepo {
    pool: DbPool,
}

impl DeviceRepo {
    /// Create a new device repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Bind a device code to a user
    ///
    /// Re-registering a code the user already owns is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if the code belongs to another user, or a
    /// database error
    pub fn register(&self, device_code: &str, user_id: &str) -> Result<(Device, Registration)> {
        if let Some(existing) = self.find_by_code(device_code)? {
            return owned_or_conflict(existing, user_id);
        }

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT INTO devices (id, device_code, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(device_code) DO NOTHING",
                rusqlite::params![id, device_code, user_id, now],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);

        let device = self
            .find_by_code(device_code)?
            .ok_or_else(|| Error::Database(format!("device {device_code} vanished after insert")))?;

        if inserted == 0 {
            // Lost a race with a concurrent registration of the same code
            return owned_or_conflict(device, user_id);
        }

        tracing::info!(device_id = %device.id, device_code = %device_code, "device registered");
        Ok((device, Registration::Created))
    }

    /// Find a device by the code it presents
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_code(&self, device_code: &str) -> Result<Option<Device>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let device = conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_code = ?1"),
                [device_code],
                row_to_device,
            )
            .optional()?;

        Ok(device)
    }

    /// Find a device by ID, only if it belongs to the given user
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_owned(&self, id: &str, user_id: &str) -> Result<Option<Device>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let device = conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1 AND user_id = ?2"),
                [id, user_id],
                row_to_device,
            )
            .optional()?;

        Ok(device)
    }

    /// List all devices owned by a user, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Device>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = ?1 ORDER BY created_at, device_code"
            ))
            .map_err(|e| Error::Database(e.to_string()))?;

        let devices = stmt
            .query_map([user_id], row_to_device)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(devices)
    }

    /// Delete a device
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute("DELETE FROM devices WHERE id = ?1", [id])
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

fn owned_or_conflict(device: Device, user_id: &str) -> Result<(Device, Registration)> {
    if device.user_id == user_id {
        Ok((device, Registration::Existing))
    } else {
        Err(Error::Conflict(format!(
            "device {} already registered to another user",
            device.device_code
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{UserRepo, init_memory};

    fn setup() -> (DeviceRepo, String, String) {
        let pool = init_memory().unwrap();
        let users = UserRepo::new(pool.clone());
        let alice = users.find_or_create_by_subject("alice").unwrap();
        let bob = users.find_or_create_by_subject("bob").unwrap();
        (DeviceRepo::new(pool), alice.id, bob.id)
    }

    #[test]
    fn test_register_and_find() {
        let (repo, alice, _) = setup();

        let (device, outcome) = repo.register("tv-livingroom", &alice).unwrap();
        assert_eq!(outcome, Registration::Created);
        assert_eq!(device.user_id, alice);

        let found = repo.find_by_code("tv-livingroom").unwrap().unwrap();
        assert_eq!(found.id, device.id);
    }

    #[test]
    fn test_register_is_idempotent_for_owner() {
        let (repo, alice, _) = setup();

        let (first, _) = repo.register("tv-1", &alice).unwrap();
        let (second, outcome) = repo.register("tv-1", &alice).unwrap();

        assert_eq!(outcome, Registration::Existing);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_register_conflicts_across_users() {
        let (repo, alice, bob) = setup();

        repo.register("tv-1", &alice).unwrap();
        let err = repo.register("tv-1", &bob).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_find_owned_scopes_by_user() {
        let (repo, alice, bob) = setup();

        let (device, _) = repo.register("tv-1", &alice).unwrap();
        assert!(repo.find_owned(&device.id, &alice).unwrap().is_some());
        assert!(repo.find_owned(&device.id, &bob).unwrap().is_none());
    }

    #[test]
    fn test_list_and_delete() {
        let (repo, alice, bob) = setup();

        let (tv1, _) = repo.register("tv-1", &alice).unwrap();
        repo.register("tv-2", &alice).unwrap();
        repo.register("tv-3", &bob).unwrap();

        assert_eq!(repo.list_for_user(&alice).unwrap().len(), 2);

        repo.delete(&tv1.id).unwrap();
        let remaining = repo.list_for_user(&alice).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].device_code, "tv-2");
        assert!(repo.find_by_code("tv-1").unwrap().is_none());
    }
}
