//! Alarm store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide durable CRUD over `alarms` rows.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `AlarmRecord::validate()` before SQL mutations.
//! - `insert` ignores the caller's id; the store assigns a fresh one.
//! - `get_all` returns rows in ascending id (insertion) order.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::alarm::{AlarmId, AlarmRecord, AlarmValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};

const ALARM_SELECT_SQL: &str = "SELECT
    id,
    title,
    hour,
    minute,
    is_active
FROM alarms";

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence-level failure for alarm rows.
#[derive(Debug)]
pub enum StoreError {
    Validation(AlarmValidationError),
    Db(DbError),
    NotFound(AlarmId),
    InvalidData(String),
    /// Store is unusable, e.g. its connection lock was poisoned.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "alarm not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted alarm data: {message}"),
            Self::Unavailable(message) => write!(f, "alarm store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<AlarmValidationError> for StoreError {
    fn from(value: AlarmValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable record store for alarms.
///
/// Implementations must be safe under concurrent access from several
/// blocking worker threads.
pub trait AlarmStore: Send + Sync {
    /// Inserts a record and returns the store-assigned id.
    fn insert(&self, alarm: &AlarmRecord) -> StoreResult<AlarmId>;
    /// Overwrites all fields of the row identified by `alarm.id`.
    fn update(&self, alarm: &AlarmRecord) -> StoreResult<()>;
    /// Removes the row identified by `id`.
    fn delete(&self, id: AlarmId) -> StoreResult<()>;
    /// Lists all rows in insertion order.
    fn get_all(&self) -> StoreResult<Vec<AlarmRecord>>;
    /// Gets one row by id.
    fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<AlarmRecord>>;
}

/// SQLite-backed alarm store owning its connection.
pub struct SqliteAlarmStore {
    conn: Mutex<Connection>,
}

impl SqliteAlarmStore {
    /// Wraps a connection returned by `open_db` / `open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl AlarmStore for SqliteAlarmStore {
    fn insert(&self, alarm: &AlarmRecord) -> StoreResult<AlarmId> {
        alarm.validate()?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alarms (title, hour, minute, is_active)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                alarm.title.as_str(),
                alarm.hour,
                alarm.minute,
                bool_to_int(alarm.is_active),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update(&self, alarm: &AlarmRecord) -> StoreResult<()> {
        alarm.validate()?;

        let changed = self.conn()?.execute(
            "UPDATE alarms
             SET
                title = ?1,
                hour = ?2,
                minute = ?3,
                is_active = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![
                alarm.title.as_str(),
                alarm.hour,
                alarm.minute,
                bool_to_int(alarm.is_active),
                alarm.id,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(alarm.id));
        }

        Ok(())
    }

    fn delete(&self, id: AlarmId) -> StoreResult<()> {
        let changed = self
            .conn()?
            .execute("DELETE FROM alarms WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        Ok(())
    }

    fn get_all(&self) -> StoreResult<Vec<AlarmRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{ALARM_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut alarms = Vec::new();

        while let Some(row) = rows.next()? {
            alarms.push(parse_alarm_row(row)?);
        }

        Ok(alarms)
    }

    fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<AlarmRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{ALARM_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_alarm_row(row)))
            .optional()?;

        row.transpose()
    }
}

fn parse_alarm_row(row: &Row<'_>) -> StoreResult<AlarmRecord> {
    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_active value `{other}` in alarms.is_active"
            )));
        }
    };

    let alarm = AlarmRecord {
        id: row.get("id")?,
        title: row.get("title")?,
        hour: row.get("hour")?,
        minute: row.get("minute")?,
        is_active,
    };
    alarm.validate()?;
    Ok(alarm)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
