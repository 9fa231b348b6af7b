use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, ErrorCode};
use serde::Serialize;

use super::{StorageError, TIMESTAMP_FORMAT};

/// A registered doctor account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Doctor {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// Insert a doctor. A taken username surfaces as `ConstraintViolation`.
pub fn insert_doctor(
    conn: &Connection,
    username: &str,
    password_hash: &str,
) -> Result<Doctor, StorageError> {
    let created_at = Local::now().naive_local();
    conn.execute(
        "INSERT INTO doctors (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        params![username, password_hash, created_at.format(TIMESTAMP_FORMAT).to_string()],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(format!("username {username:?} already registered"))
        }
        other => StorageError::from(other),
    })?;

    Ok(Doctor {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        created_at,
    })
}

pub fn find_doctor_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<Doctor>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password_hash, created_at FROM doctors WHERE username = ?1",
    )?;
    let mut rows = stmt.query_map(params![username], |row| {
        let created_str: String = row.get(3)?;
        Ok(Doctor {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: NaiveDateTime::parse_from_str(&created_str, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        })
    })?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}
