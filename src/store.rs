//! Relational sink: write a result set into a SQLite table.
//!
//! Records are stored as opaque rows, one column per field. Columns come
//! from the union of all records' keys, not from the first record, and
//! [`ensure_table`] adds any column the table does not have yet; a later
//! record that introduces a new field therefore lands in its own column
//! instead of failing the insert.
//!
//! Columns are declared without a type. SQLite keeps each value's storage
//! class, so numbers stay numbers and text stays text.

use crate::error::ExtractError;
use crate::output::ExtractionResult;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Open (or create) the database file at `path`.
pub fn open(path: impl AsRef<Path>) -> Result<Connection, ExtractError> {
    let conn = Connection::open(path.as_ref())?;
    debug!("Opened SQLite database {}", path.as_ref().display());
    Ok(conn)
}

/// Create `table` if missing and add any of `columns` it lacks.
///
/// `columns` must not be empty: SQLite has no zero-column tables.
pub fn ensure_table(conn: &Connection, table: &str, columns: &[String]) -> Result<(), ExtractError> {
    if columns.is_empty() {
        return Err(ExtractError::InvalidConfig(format!(
            "cannot create table '{table}' without columns"
        )));
    }
    let table_ident = quote_ident(table)?;
    let mut quoted = Vec::with_capacity(columns.len());
    for col in columns {
        quoted.push(quote_ident(col)?);
    }

    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS {} ({})", table_ident, quoted.join(", ")),
        [],
    )?;

    let existing = existing_columns(conn, table)?;
    for (col, ident) in columns.iter().zip(&quoted) {
        if !existing.contains(&col.to_lowercase()) {
            info!("Adding column {} to {}", col, table);
            conn.execute(&format!("ALTER TABLE {} ADD COLUMN {}", table_ident, ident), [])?;
        }
    }
    Ok(())
}

/// Insert every record of `result` into `table` in one transaction.
///
/// Schema changes from [`ensure_table`] run in the same transaction, so a
/// failed insert leaves the table exactly as it was. Returns the number of
/// rows written. Missing fields are stored as NULL. An empty result is
/// [`ExtractError::NoRecords`].
pub fn write_records(
    conn: &mut Connection,
    table: &str,
    result: &ExtractionResult,
) -> Result<usize, ExtractError> {
    let records = result.require_rows()?;
    let columns = check_identifiers(table, result)?;

    let idents = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table)?,
        idents.join(", "),
        placeholders
    );

    let tx = conn.transaction()?;
    ensure_table(&tx, table, &columns)?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for record in records {
            let values = columns.iter().map(|c| to_sql_value(record.get(c)));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    info!("Inserted {} rows into {}", records.len(), table);
    Ok(records.len())
}

/// Check that `table` and every column of `result` can be stored, without
/// touching a database. Returns the columns.
///
/// Lets callers reject a result before producing any other output from it.
pub fn check_identifiers(table: &str, result: &ExtractionResult) -> Result<Vec<String>, ExtractError> {
    result.require_rows()?;
    let columns = result.columns();
    if columns.is_empty() {
        // Every record is `{}`: there is nothing to insert.
        return Err(ExtractError::NoRecords);
    }
    quote_ident(table)?;
    for col in &columns {
        quote_ident(col)?;
    }
    Ok(columns)
}

/// Map a JSON value to a SQLite value.
///
/// | JSON | SQLite |
/// |------|--------|
/// | missing, null | NULL |
/// | bool | INTEGER 0/1 |
/// | integer | INTEGER |
/// | other number | REAL |
/// | string | TEXT |
/// | array, object | TEXT (compact JSON) |
pub fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .unwrap_or_else(|| SqlValue::Text(n.to_string())),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

/// Double-quote a plain identifier, rejecting anything else.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` is accepted: model-chosen field names such
/// as `"unit price"` must be renamed by the caller rather than smuggled into
/// SQL.
pub fn quote_ident(name: &str) -> Result<String, ExtractError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(ExtractError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

fn existing_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, ExtractError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)?))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().map(|n| n.to_lowercase()).collect())
}
