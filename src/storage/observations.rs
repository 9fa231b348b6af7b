use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use super::{Observation, ObservationDraft, SortOrder, StorageError, TIMESTAMP_FORMAT};
use crate::classifier::RiskLabel;

const COLUMNS: &str = "id, patient_name, age, address, systolic, diastolic, heart_rate, spo2, result, recorded_at, notes";

/// Insert a fully classified observation and return its assigned id.
pub fn insert_observation(
    conn: &Connection,
    draft: &ObservationDraft,
    result: RiskLabel,
    recorded_at: &NaiveDateTime,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO observations (patient_name, age, address, systolic, diastolic, heart_rate, spo2, result, recorded_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            draft.patient_name,
            draft.age,
            draft.address,
            draft.vitals.systolic,
            draft.vitals.diastolic,
            draft.vitals.heart_rate,
            draft.vitals.spo2,
            result.as_str(),
            recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            draft.notes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_observation(conn: &Connection, id: i64) -> Result<Observation, StorageError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM observations WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id], row_to_observation)?;
    match rows.next() {
        Some(row) => Ok(row?),
        None => Err(StorageError::NotFound(id)),
    }
}

/// Newest first, at most `limit` rows.
pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<Observation>, StorageError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM observations
         ORDER BY recorded_at DESC, id DESC
         LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], row_to_observation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

pub fn list_by_name(
    conn: &Connection,
    name: &str,
    order: SortOrder,
) -> Result<Vec<Observation>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM observations
         WHERE patient_name = ?1
         ORDER BY {}",
        order_clause(order)
    ))?;
    let rows = stmt.query_map(params![name], row_to_observation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

pub fn list_all(conn: &Connection, order: SortOrder) -> Result<Vec<Observation>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM observations ORDER BY {}",
        order_clause(order)
    ))?;
    let rows = stmt.query_map([], row_to_observation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

/// Name substring plus optional inclusive `[from, until]` bounds, newest first.
/// An empty `name_fragment` matches every patient.
pub fn search_observations(
    conn: &Connection,
    name_fragment: &str,
    from: Option<&NaiveDateTime>,
    until: Option<&NaiveDateTime>,
) -> Result<Vec<Observation>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM observations
         WHERE (?1 = '' OR instr(patient_name, ?1) > 0)
           AND (?2 IS NULL OR recorded_at >= ?2)
           AND (?3 IS NULL OR recorded_at <= ?3)
         ORDER BY recorded_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map(
        params![
            name_fragment,
            from.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            until.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        ],
        row_to_observation,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

pub fn count_observations(conn: &Connection) -> Result<usize, StorageError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "recorded_at ASC, id ASC",
        SortOrder::Descending => "recorded_at DESC, id DESC",
    }
}

fn row_to_observation(row: &Row) -> Result<Observation, rusqlite::Error> {
    let result_str: String = row.get(8)?;
    let recorded_str: String = row.get(9)?;

    let result = RiskLabel::from_str(&result_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown result label {result_str:?}").into(),
        )
    })?;
    let timestamp = NaiveDateTime::parse_from_str(&recorded_str, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Observation {
        id: row.get(0)?,
        patient_name: row.get(1)?,
        age: row.get(2)?,
        address: row.get(3)?,
        systolic: row.get(4)?,
        diastolic: row.get(5)?,
        heart_rate: row.get(6)?,
        spo2: row.get(7)?,
        result,
        timestamp,
        notes: row.get(10)?,
    })
}
