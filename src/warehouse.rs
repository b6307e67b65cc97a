use crate::config::{Config, CreateDisposition, WriteDisposition};
use crate::error::{PipelineError, Result};
use crate::models::LoadReport;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// One newline-delimited JSON record.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub create_disposition: CreateDisposition,
    pub write_disposition: WriteDisposition,
    pub allow_field_addition: bool,
}

impl LoadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            create_disposition: config.create_disposition,
            write_disposition: config.write_disposition,
            allow_field_addition: config.allow_field_addition,
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_disposition: CreateDisposition::CreateIfNeeded,
            write_disposition: WriteDisposition::Append,
            allow_field_addition: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Integer(i),
                None => n.as_f64().map(Cell::Real).unwrap_or(Cell::Null),
            },
            Value::String(s) => Cell::Text(s.clone()),
            // Nested objects and arrays keep their JSON text.
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Parses a newline-delimited JSON object. Blank lines are skipped.
pub fn parse_ndjson(object: &str, text: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let invalid = |message: String| PipelineError::InvalidRecord {
            object: object.to_string(),
            line: idx + 1,
            message,
        };

        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(_) => return Err(invalid("record is not a JSON object".to_string())),
            Err(e) => return Err(invalid(e.to_string())),
        }
    }

    Ok(records)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite-backed warehouse: one database file per dataset.
pub struct Warehouse {
    pool: SqlitePool,
    dataset: String,
}

impl Warehouse {
    pub async fn open(dir: &Path, dataset: &str, max_connections: u32) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join(format!("{}.db", dataset)))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            dataset: dataset.to_string(),
        })
    }

    #[cfg(test)]
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        table_exists(&mut conn, table).await
    }

    #[cfg(test)]
    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        columns(&mut conn, table).await
    }

    #[cfg(test)]
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        row_count(&mut conn, table).await
    }

    /// Writes `records` into `table` in a single transaction.
    pub async fn load(&self, table: &str, records: &[Record], options: LoadOptions) -> Result<LoadReport> {
        let qualified = format!("{}.{}", self.dataset, table);
        let mut tx = self.pool.begin().await?;

        let fields = field_union(records)?;
        let mut columns_added = Vec::new();

        if table_exists(&mut *tx, table).await? {
            let existing: HashSet<String> = columns(&mut *tx, table)
                .await?
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect();
            let new_fields: Vec<&String> = fields
                .iter()
                .filter(|f| !existing.contains(&f.to_lowercase()))
                .collect();

            if !new_fields.is_empty() {
                if !options.allow_field_addition {
                    let names: Vec<&str> = new_fields.iter().map(|f| f.as_str()).collect();
                    return Err(PipelineError::SchemaMismatch(format!(
                        "{} has no columns {}",
                        qualified,
                        names.join(", ")
                    )));
                }
                for field in new_fields {
                    let sql = format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), quote_ident(field));
                    sqlx::query(&sql).execute(&mut *tx).await?;
                    columns_added.push(field.clone());
                }
            }
        } else {
            if options.create_disposition == CreateDisposition::CreateNever {
                return Err(PipelineError::TableNotFound(qualified));
            }
            if fields.is_empty() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "no fields to create {} from",
                    qualified
                )));
            }

            let column_list: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
            let sql = format!("CREATE TABLE {} ({})", quote_ident(table), column_list.join(", "));
            sqlx::query(&sql).execute(&mut *tx).await?;
            info!("Created table {} with {} columns", qualified, fields.len());
            columns_added = fields.clone();
        }

        match options.write_disposition {
            WriteDisposition::Append => {}
            WriteDisposition::Truncate => {
                let sql = format!("DELETE FROM {}", quote_ident(table));
                let deleted = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
                debug!("Truncated {} ({} rows)", qualified, deleted);
            }
            WriteDisposition::Empty => {
                if row_count(&mut *tx, table).await? > 0 {
                    return Err(PipelineError::TableNotEmpty(qualified));
                }
            }
        }

        for record in records {
            insert_record(&mut *tx, table, record).await?;
        }

        let table_rows = row_count(&mut *tx, table).await?;
        tx.commit().await?;

        Ok(LoadReport {
            objects: Vec::new(),
            rows_appended: records.len() as u64,
            columns_added,
            table_rows,
        })
    }
}

/// Field names across all records, in first-seen order. Column names are
/// case-insensitive, so a record may not carry two keys differing only by case.
fn field_union(records: &[Record]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let mut in_record: HashMap<String, &String> = HashMap::new();
        for key in record.keys() {
            let folded = key.to_lowercase();
            if let Some(other) = in_record.insert(folded.clone(), key) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "record {} has fields {} and {} that differ only by case",
                    idx + 1,
                    other,
                    key
                )));
            }
            if seen.insert(folded) {
                fields.push(key.clone());
            }
        }
    }
    Ok(fields)
}

async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_one(conn)
        .await?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(conn)
        .await?;
    Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
}

async fn row_count(conn: &mut SqliteConnection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) AS count FROM {}", quote_ident(table));
    let row = sqlx::query(&sql).fetch_one(conn).await?;
    Ok(row.get::<i64, _>("count"))
}

async fn insert_record(conn: &mut SqliteConnection, table: &str, record: &Record) -> Result<()> {
    if record.is_empty() {
        let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
        sqlx::query(&sql).execute(conn).await?;
        return Ok(());
    }

    let names: Vec<String> = record.keys().map(|k| quote_ident(k)).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for value in record.values() {
        query = match Cell::from(value) {
            Cell::Null => query.bind(None::<String>),
            Cell::Integer(i) => query.bind(i),
            Cell::Real(f) => query.bind(f),
            Cell::Text(s) => query.bind(s),
        };
    }
    query.execute(conn).await?;
    Ok(())
}
