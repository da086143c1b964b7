// Session storage
// Key-value persistence for the credential pair and the session user

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{
    CredentialPair, RefreshedTokens, SessionUser, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
};

/// Persistent string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several entries at once, all or nothing
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove several keys at once, all or nothing
    fn remove_all(&self, keys: &[&str]) -> Result<()>;

    /// Write `entries` only while `guard` still holds `expected`, atomically
    ///
    /// Returns false and writes nothing when the guard value differs or is missing.
    fn set_all_if(&self, guard: &str, expected: &str, entries: &[(&str, &str)]) -> Result<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// SQLite-backed store, survives process restarts
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the session database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create session directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// In-memory database, gone when dropped
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create session_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = lock(&self.conn);
        conn.query_row(
            "SELECT value FROM session_kv WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read {} from session store", key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_all(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_all(&[key])
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().context("Failed to begin transaction")?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("Failed to write {} to session store", key))?;
        }
        tx.commit().context("Failed to commit session store write")
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().context("Failed to begin transaction")?;
        for key in keys {
            tx.execute("DELETE FROM session_kv WHERE key = ?", [key])
                .with_context(|| format!("Failed to remove {} from session store", key))?;
        }
        tx.commit().context("Failed to commit session store removal")
    }

    fn set_all_if(&self, guard: &str, expected: &str, entries: &[(&str, &str)]) -> Result<bool> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM session_kv WHERE key = ?",
                [guard],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read {} from session store", guard))?;
        if current.as_deref() != Some(expected) {
            return Ok(false);
        }

        for (key, value) in entries {
            tx.execute(
                "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("Failed to write {} to session store", key))?;
        }
        tx.commit().context("Failed to commit session store write")?;
        Ok(true)
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = lock(&self.entries);
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut map = lock(&self.entries);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn set_all_if(&self, guard: &str, expected: &str, entries: &[(&str, &str)]) -> Result<bool> {
        let mut map = lock(&self.entries);
        if map.get(guard).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(true)
    }
}

/// Typed view of the session keys in a `KeyValueStore`
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(REFRESH_TOKEN_KEY)?
            .filter(|token| !token.is_empty()))
    }

    /// Persist a fresh login
    pub fn save_session(&self, pair: &CredentialPair, user: &SessionUser) -> Result<()> {
        let user_json = serde_json::to_string(user).context("Failed to serialize session user")?;
        self.store.set_all(&[
            (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
            (USER_KEY, user_json.as_str()),
        ])
    }

    /// Persist the result of a refresh, keeping the old refresh token unless rotated
    ///
    /// Only lands while `sent_refresh_token` is still the stored one. Returns false
    /// when the session was cleared or replaced while the refresh was in flight.
    pub fn store_refreshed(
        &self,
        sent_refresh_token: &str,
        tokens: &RefreshedTokens,
    ) -> Result<bool> {
        let refresh_token = tokens.refresh_token.as_deref().unwrap_or(sent_refresh_token);
        self.store.set_all_if(
            REFRESH_TOKEN_KEY,
            sent_refresh_token,
            &[
                (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
                (REFRESH_TOKEN_KEY, refresh_token),
            ],
        )
    }

    pub fn user(&self) -> Result<Option<SessionUser>> {
        match self.store.get(USER_KEY)? {
            Some(json) => {
                let user = serde_json::from_str(&json).context("Failed to parse session user")?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Drop the token pair and the user together
    pub fn clear(&self) -> Result<()> {
        self.store
            .remove_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])
    }
}
