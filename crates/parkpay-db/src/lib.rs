// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use parkpay_app::{
    LoginSession, Row, RowCache, SessionKey, SubscriptionName, TableKind, UserProfile,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

pub const APP_NAME: &str = "parkpay";

const SESSION_TABLE: &str = "session_values";
const SESSION_COLUMNS: [&str; 3] = ["key", "value", "updated_at"];

/// Client-side session cache: one string value per `SessionKey`, table
/// values stored as JSON.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open session store at {}", path.display()))?;
        configure_connection(&conn)?;
        debug!(path = %path.display(), "opened session store");
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory session store")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if table_exists(&self.conn, SESSION_TABLE)? {
            validate_schema(&self.conn)?;
            return Ok(());
        }
        self.conn
            .execute_batch(include_str!("sql/schema.sql"))
            .context("create session schema")?;
        info!("created session schema");
        Ok(())
    }

    pub fn get(&self, key: SessionKey) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM session_values WHERE key = ?",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read session value {}", key.as_str()))
    }

    pub fn put(&self, key: SessionKey, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO session_values (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key.as_str(), value, now],
            )
            .with_context(|| format!("upsert session value {}", key.as_str()))?;
        debug!(key = key.as_str(), bytes = value.len(), "stored session value");
        Ok(())
    }

    pub fn remove(&self, key: SessionKey) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM session_values WHERE key = ?",
                params![key.as_str()],
            )
            .with_context(|| format!("delete session value {}", key.as_str()))?;
        Ok(removed > 0)
    }

    pub fn updated_at(&self, key: SessionKey) -> Result<Option<OffsetDateTime>> {
        let raw = self
            .conn
            .query_row(
                "SELECT updated_at FROM session_values WHERE key = ?",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read timestamp of {}", key.as_str()))?;
        raw.map(|value| {
            OffsetDateTime::parse(&value, &Rfc3339)
                .with_context(|| format!("parse timestamp {value:?} of {}", key.as_str()))
        })
        .transpose()
    }

    /// The signed-in user, or `None` when no email is stored.
    pub fn profile(&self) -> Result<Option<UserProfile>> {
        let Some(email) = self.email()? else {
            return Ok(None);
        };
        Ok(Some(UserProfile {
            name: self.get(SessionKey::Name)?.unwrap_or_default(),
            last_name: self.get(SessionKey::LastName)?.unwrap_or_default(),
            email,
            phone: self.get(SessionKey::Phone)?.unwrap_or_default(),
        }))
    }

    pub fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        self.put(SessionKey::Name, &profile.name)?;
        self.put(SessionKey::LastName, &profile.last_name)?;
        self.put(SessionKey::Email, &profile.email)?;
        self.put(SessionKey::Phone, &profile.phone)
    }

    pub fn email(&self) -> Result<Option<String>> {
        Ok(self
            .get(SessionKey::Email)?
            .filter(|email| !email.trim().is_empty()))
    }

    pub fn store_login(&self, session: &LoginSession) -> Result<()> {
        self.put_profile(&session.profile)?;
        self.put_rows(TableKind::Subscriptions, &session.subscriptions)?;
        info!(email = %session.profile.email, "stored login session");
        Ok(())
    }

    pub fn subscription_name(&self) -> Result<Option<SubscriptionName>> {
        Ok(self
            .get(SessionKey::SubscriptionName)?
            .filter(|name| !name.is_empty())
            .map(SubscriptionName::new))
    }

    pub fn put_subscription_name(&self, name: &SubscriptionName) -> Result<()> {
        self.put(SessionKey::SubscriptionName, name.as_str())
    }

    /// Strict read; a malformed table is an error here. `RowRegistry::load`
    /// is the lenient path.
    pub fn rows(&self, kind: TableKind) -> Result<Vec<Row>> {
        match self.get(kind.cache_key())? {
            Some(raw) => kind.decode_rows(&raw),
            None => Ok(Vec::new()),
        }
    }

    pub fn put_rows(&self, kind: TableKind, rows: &[Row]) -> Result<()> {
        let raw = kind.encode_rows(rows)?;
        self.put(kind.cache_key(), &raw)
    }

    pub fn emails_table(&self) -> Result<Vec<Vec<String>>> {
        let Some(raw) = self.get(SessionKey::EmailsTable)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("decode emails table")
    }

    pub fn put_emails_table(&self, rows: &[Vec<String>]) -> Result<()> {
        let raw = serde_json::to_string(rows).context("encode emails table")?;
        self.put(SessionKey::EmailsTable, &raw)
    }

    pub fn is_admin(&self) -> Result<bool> {
        Ok(self.get(SessionKey::Admin)?.as_deref() == Some("true"))
    }

    pub fn put_admin(&self, admin: bool) -> Result<()> {
        self.put(SessionKey::Admin, if admin { "true" } else { "false" })
    }

    /// Drops every user-scoped key.
    pub fn clear_session(&self) -> Result<()> {
        let mut removed = 0usize;
        for key in SessionKey::ALL.into_iter().filter(|key| key.is_user_scoped()) {
            if self.remove(key)? {
                removed += 1;
            }
        }
        info!(removed, "cleared session");
        Ok(())
    }

    /// Fills the store with a signed-in demo account.
    pub fn seed_demo_session(&self) -> Result<()> {
        let session = LoginSession {
            profile: UserProfile {
                name: "Ana".to_owned(),
                last_name: "Popescu".to_owned(),
                email: "ana.popescu@example.ro".to_owned(),
                phone: "0712345678".to_owned(),
            },
            subscriptions: ["Family", "Work"].into_iter().map(Row::single).collect(),
        };
        self.store_login(&session)?;

        let vehicles = [
            ["B123ABC", "2024-03-01", "08:00", "", "", "", "", "Active"],
            [
                "CJ07XYZ",
                "2024-02-28",
                "09:30",
                "2024-02-28",
                "12:45",
                "3h 15m",
                "15 RON",
                "Inactive",
            ],
        ]
        .into_iter()
        .map(|cells| Row::new(cells.into_iter().map(str::to_owned).collect()))
        .collect::<Vec<_>>();
        self.put_subscription_name(&SubscriptionName::from("Family"))?;
        self.put_rows(TableKind::Vehicles, &vehicles)?;
        self.put_admin(false)?;
        info!("seeded demo session");
        Ok(())
    }
}

impl RowCache for SessionStore {
    fn read_table(&self, kind: TableKind) -> Result<Option<String>> {
        self.get(kind.cache_key())
    }

    fn write_table(&mut self, kind: TableKind, raw: &str) -> Result<()> {
        self.put(kind.cache_key(), raw)
    }
}

/// Writes go through the connection, so a shared borrow is enough.
impl RowCache for &SessionStore {
    fn read_table(&self, kind: TableKind) -> Result<Option<String>> {
        self.get(kind.cache_key())
    }

    fn write_table(&mut self, kind: TableKind, raw: &str) -> Result<()> {
        self.put(kind.cache_key(), raw)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("PARKPAY_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set PARKPAY_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("session.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![table],
            |row| row.get(0),
        )
        .with_context(|| format!("look up table {table}"))?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    let mut statement = conn
        .prepare(&format!("PRAGMA table_info({SESSION_TABLE})"))
        .context("inspect session schema")?;
    let columns = statement
        .query_map([], |row| row.get::<_, String>(1))
        .context("list session columns")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("read session columns")?;

    let missing = SESSION_COLUMNS
        .into_iter()
        .filter(|column| !columns.iter().any(|existing| existing == column))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        warn!(missing = ?missing, "session schema is incompatible");
        bail!(
            "session store table `{SESSION_TABLE}` is missing column(s) {}; delete the file or set PARKPAY_DB_PATH to a fresh path",
            missing.join(", ")
        );
    }
    Ok(())
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}
