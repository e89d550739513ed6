//! Tiberius-backed change source for SQL Server CDC.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, trace, warn};

use super::config::SqlServerConfig;
use crate::error::{ChangeStreamError, Result};
use crate::event::{ChangeOp, ChangeRow};
use crate::position::Lsn;
use crate::source::{ChangeSource, RowFilter};

const MAX_IDENTIFIER_LENGTH: usize = 128;

/// SQL Server change source.
///
/// Reads change rows from the CDC change tables over a tiberius TDS
/// connection. Captured-column metadata is cached per capture instance so
/// steady-state polling issues one query per table per cycle.
pub struct SqlServerSource {
    client: Client<Compat<TcpStream>>,
    database: String,
    column_cache: HashMap<String, Vec<String>>,
}

impl SqlServerSource {
    /// Connect to SQL Server
    pub async fn connect(config: &SqlServerConfig) -> Result<Self> {
        debug!(
            "connecting to SQL Server {}:{}/{}",
            config.host, config.port, config.database
        );

        let mut tiberius_config = Config::new();
        tiberius_config.host(&config.host);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.application_name(&config.application_name);

        if let Some(ref password) = config.password {
            tiberius_config.authentication(AuthMethod::sql_server(&config.username, password));
        } else {
            return Err(ChangeStreamError::config(
                "Password is required for SQL Server authentication",
            ));
        }

        if config.encrypt {
            tiberius_config.encryption(EncryptionLevel::Required);
            if config.trust_server_certificate {
                tiberius_config.trust_cert();
            }
        } else {
            tiberius_config.encryption(EncryptionLevel::NotSupported);
        }

        let connect_timeout = std::time::Duration::from_secs(config.connect_timeout_secs);
        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(tiberius_config.get_addr()))
            .await
            .map_err(|_| {
                ChangeStreamError::timeout(format!(
                    "connect to {}:{} exceeded {}s",
                    config.host, config.port, config.connect_timeout_secs
                ))
            })?
            .map_err(|e| ChangeStreamError::connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| ChangeStreamError::connection(e.to_string()))?;

        let client = Client::connect(tiberius_config, tcp.compat_write())
            .await
            .map_err(|e| ChangeStreamError::connection(e.to_string()))?;

        info!(
            "connected to SQL Server {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            client,
            database: config.database.clone(),
            column_cache: HashMap::new(),
        })
    }

    /// Verify that CDC is enabled on the database
    pub async fn verify_cdc_enabled(&mut self) -> Result<()> {
        let query = "SELECT is_cdc_enabled FROM sys.databases WHERE name = @P1";
        let result = self
            .client
            .query(query, &[&self.database.as_str()])
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?;

        let is_enabled = result
            .first()
            .and_then(|row| row.get::<bool, _>(0))
            .unwrap_or(false);

        if !is_enabled {
            return Err(ChangeStreamError::CdcNotEnabled(self.database.clone()));
        }

        debug!("CDC is enabled on database '{}'", self.database);
        Ok(())
    }

    /// Get captured column names for a capture instance, cached after the
    /// first lookup.
    async fn capture_columns(&mut self, capture_instance: &str) -> Result<Vec<String>> {
        if let Some(columns) = self.column_cache.get(capture_instance) {
            return Ok(columns.clone());
        }

        let query = r#"
            SELECT column_name
            FROM cdc.captured_columns cc
            JOIN cdc.change_tables ct ON cc.object_id = ct.object_id
            WHERE ct.capture_instance = @P1
            ORDER BY cc.column_ordinal
        "#;

        let result = self
            .client
            .query(query, &[&capture_instance])
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?;

        let columns: Vec<String> = result
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(|s| s.to_string()))
            .collect();

        if columns.is_empty() {
            return Err(ChangeStreamError::query(format!(
                "No capture instance '{}' found in cdc.change_tables",
                capture_instance
            )));
        }

        self.column_cache
            .insert(capture_instance.to_string(), columns.clone());
        Ok(columns)
    }
}

#[async_trait]
impl ChangeSource for SqlServerSource {
    async fn current_max_position(&mut self) -> Result<Lsn> {
        let query = "SELECT sys.fn_cdc_get_max_lsn()";
        let result = self
            .client
            .query(query, &[])
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?;

        let row = result
            .first()
            .ok_or_else(|| ChangeStreamError::query("No max LSN result returned"))?;
        parse_lsn_from_row(row, 0)
    }

    async fn fetch_changes(
        &mut self,
        table: &str,
        low: &Lsn,
        high: &Lsn,
        filter: RowFilter,
    ) -> Result<Vec<ChangeRow>> {
        // The capture instance is interpolated into the CDC function name,
        // which cannot be parameterized in T-SQL.
        validate_identifier(table)?;
        let columns = self.capture_columns(table).await?;

        let column_list = columns
            .iter()
            .map(|c| format!("[{}]", c.replace(']', "]]")))
            .collect::<Vec<_>>()
            .join(", ");

        let query = format!(
            r#"
            SELECT __$start_lsn, __$seqval, __$operation, {column_list}
            FROM cdc.fn_cdc_get_all_changes_{table}(@P1, @P2, N'{filter}')
            ORDER BY __$start_lsn, __$seqval
            "#,
            column_list = column_list,
            table = table,
            filter = filter.as_sql()
        );

        let result = self
            .client
            .query(&query, &[&low.bytes.as_slice(), &high.bytes.as_slice()])
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?;

        let mut changes = Vec::with_capacity(result.len());
        for row in result {
            let commit_lsn = parse_lsn_from_row(&row, 0)?;
            let sequence_value = parse_lsn_from_row(&row, 1)?;
            let code: i32 = row.get(2).unwrap_or(0);
            let Some(operation) = ChangeOp::from_code(code) else {
                warn!("unknown CDC operation code: {}", code);
                continue;
            };
            let values = parse_row_data(&row, &columns, 3);

            changes.push(ChangeRow {
                table: table.to_string(),
                operation,
                sequence_value,
                commit_lsn,
                values,
            });
        }

        trace!("got {} changes from '{}'", changes.len(), table);
        Ok(changes)
    }

    async fn next_position(&mut self, pos: &Lsn) -> Result<Lsn> {
        let query = "SELECT sys.fn_cdc_increment_lsn(@P1)";
        let result = self
            .client
            .query(query, &[&pos.bytes.as_slice()])
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ChangeStreamError::query(e.to_string()))?;

        let row = result
            .first()
            .ok_or_else(|| ChangeStreamError::query("No incremented LSN result returned"))?;
        parse_lsn_from_row(row, 0)
    }
}

/// Reject values unsafe to interpolate as a T-SQL identifier.
fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChangeStreamError::config("Identifier cannot be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ChangeStreamError::config(format!(
            "Identifier too long: {} chars (max: {})",
            name.len(),
            MAX_IDENTIFIER_LENGTH
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !first_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ChangeStreamError::config(format!(
            "Invalid identifier '{}': must start with letter/underscore and contain only alphanumeric characters and underscores",
            name
        )));
    }
    Ok(())
}

/// Parse a 10-byte LSN column at the given index
fn parse_lsn_from_row(row: &Row, index: usize) -> Result<Lsn> {
    let bytes: &[u8] = row
        .get(index)
        .ok_or_else(|| ChangeStreamError::InvalidLsn("Missing LSN column".to_string()))?;

    if bytes.len() != 10 {
        return Err(ChangeStreamError::InvalidLsn(format!(
            "Expected 10 bytes, got {}",
            bytes.len()
        )));
    }

    let mut arr = [0u8; 10];
    arr.copy_from_slice(bytes);
    Ok(Lsn::new(arr))
}

/// Parse data columns into a JSON map
fn parse_row_data(row: &Row, columns: &[String], start_index: usize) -> Map<String, Value> {
    let mut data = Map::new();

    for (i, col_name) in columns.iter().enumerate() {
        let col_idx = start_index + i;
        if col_idx >= row.len() {
            break;
        }

        // Try types in order of likelihood
        let value = if let Some(v) = row.try_get::<&str, _>(col_idx).ok().flatten() {
            Value::String(v.to_string())
        } else if let Some(v) = row.try_get::<i64, _>(col_idx).ok().flatten() {
            Value::Number(v.into())
        } else if let Some(v) = row.try_get::<i32, _>(col_idx).ok().flatten() {
            Value::Number(v.into())
        } else if let Some(v) = row.try_get::<i16, _>(col_idx).ok().flatten() {
            Value::Number(v.into())
        } else if let Some(v) = row.try_get::<f64, _>(col_idx).ok().flatten() {
            if v.is_nan() || v.is_infinite() {
                Value::Null
            } else {
                serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        } else if let Some(v) = row.try_get::<bool, _>(col_idx).ok().flatten() {
            Value::Bool(v)
        } else if let Some(v) = row.try_get::<&[u8], _>(col_idx).ok().flatten() {
            Value::String(base64_encode(v))
        } else if let Some(v) = row
            .try_get::<chrono::NaiveDateTime, _>(col_idx)
            .ok()
            .flatten()
        {
            Value::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        } else if let Some(v) = row.try_get::<chrono::NaiveDate, _>(col_idx).ok().flatten() {
            Value::String(v.format("%Y-%m-%d").to_string())
        } else if let Some(v) = row.try_get::<chrono::NaiveTime, _>(col_idx).ok().flatten() {
            Value::String(v.format("%H:%M:%S%.f").to_string())
        } else if let Some(v) = row.try_get::<uuid::Uuid, _>(col_idx).ok().flatten() {
            Value::String(v.to_string())
        } else {
            Value::Null
        };

        data.insert(col_name.clone(), value);
    }

    data
}

/// Base64 encode binary column data
fn base64_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(data)
}
