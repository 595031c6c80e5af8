// ABOUTME: Database session abstraction shared by MySQL and PostgreSQL backends
// ABOUTME: Exposes the query seam used by schema introspection and checksumming

pub mod mysql;
pub mod postgres;

use crate::error::{CompareError, DriverError};
use crate::utils::{self, DatabaseKind};
use crate::verify::Dialect;
use async_trait::async_trait;
use std::fmt;

pub use mysql::MySqlSession;
pub use postgres::PostgresSession;

/// A single primary-key value captured from the last row of a page.
///
/// Values travel from one page query back into the next as bind arguments,
/// so each backend converts them to its own parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl KeyValue {
    /// Textual form used when the dialect casts bind arguments server-side
    pub fn to_text(&self) -> Option<String> {
        match self {
            KeyValue::Null => None,
            KeyValue::Int(v) => Some(v.to_string()),
            KeyValue::UInt(v) => Some(v.to_string()),
            KeyValue::Float(v) => Some(v.to_string()),
            KeyValue::Text(s) => Some(s.clone()),
            KeyValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => write!(f, "NULL"),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::UInt(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
            KeyValue::Text(s) => write!(f, "{:?}", s),
            KeyValue::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Four unsigned partial sums returned by a checksum query
pub type DigestParts = [u64; 4];

/// Query primitives the comparison engine needs from a live connection.
///
/// Every statement is generated by [`Dialect`]; implementations only execute
/// it and decode the result into plain values.
#[async_trait]
pub trait SqlSession: Send {
    fn dialect(&self) -> Dialect;

    /// Schema that unqualified catalog lookups resolve against, if the
    /// engine needs one
    fn current_schema(&self) -> Option<&str>;

    /// Run a query and return every row as nullable text columns
    async fn query_text(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Vec<Vec<Option<String>>>, DriverError>;

    /// Run a `SELECT COUNT(*)` style query
    async fn query_count(&mut self, sql: &str, args: &[KeyValue]) -> Result<u64, DriverError>;

    /// Run a checksum query returning the four aggregate columns `a, b, c, d`
    async fn query_digest(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<DigestParts, DriverError>;

    /// Fetch the first row of a key query, if any
    async fn query_keys(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Option<Vec<KeyValue>>, DriverError>;
}

/// A live connection to one of the supported engines
pub enum Connection {
    MySql(MySqlSession),
    Postgres(PostgresSession),
}

impl Connection {
    pub fn kind(&self) -> DatabaseKind {
        match self {
            Connection::MySql(_) => DatabaseKind::MySql,
            Connection::Postgres(_) => DatabaseKind::Postgres,
        }
    }

    /// Release the underlying session
    pub async fn close(self) -> Result<(), DriverError> {
        match self {
            Connection::MySql(session) => session.close().await,
            Connection::Postgres(session) => {
                session.close();
                Ok(())
            }
        }
    }
}

/// Open a connection, detecting the engine from the connection string.
///
/// `endpoint` names the side ("source" or "target") for error messages.
pub async fn connect(endpoint: &str, connection_string: &str) -> crate::error::Result<Connection> {
    let kind = utils::detect_kind(connection_string);
    tracing::debug!("Connecting to {} database ({})", endpoint, kind);

    match kind {
        DatabaseKind::Postgres => {
            let session = PostgresSession::connect(connection_string)
                .await
                .map_err(|e| CompareError::connection(endpoint, format!("{:#}", e)))?;
            Ok(Connection::Postgres(session))
        }
        DatabaseKind::MySql => {
            let url = utils::normalize_mysql_dsn(connection_string)
                .map_err(|e| CompareError::connection(endpoint, format!("{:#}", e)))?;
            let session = MySqlSession::connect(&url)
                .await
                .map_err(|e| CompareError::connection(endpoint, format!("{:#}", e)))?;
            Ok(Connection::MySql(session))
        }
    }
}

#[async_trait]
impl SqlSession for Connection {
    fn dialect(&self) -> Dialect {
        match self {
            Connection::MySql(s) => s.dialect(),
            Connection::Postgres(s) => s.dialect(),
        }
    }

    fn current_schema(&self) -> Option<&str> {
        match self {
            Connection::MySql(s) => s.current_schema(),
            Connection::Postgres(s) => s.current_schema(),
        }
    }

    async fn query_text(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Vec<Vec<Option<String>>>, DriverError> {
        match self {
            Connection::MySql(s) => s.query_text(sql, args).await,
            Connection::Postgres(s) => s.query_text(sql, args).await,
        }
    }

    async fn query_count(&mut self, sql: &str, args: &[KeyValue]) -> Result<u64, DriverError> {
        match self {
            Connection::MySql(s) => s.query_count(sql, args).await,
            Connection::Postgres(s) => s.query_count(sql, args).await,
        }
    }

    async fn query_digest(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<DigestParts, DriverError> {
        match self {
            Connection::MySql(s) => s.query_digest(sql, args).await,
            Connection::Postgres(s) => s.query_digest(sql, args).await,
        }
    }

    async fn query_keys(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Option<Vec<KeyValue>>, DriverError> {
        match self {
            Connection::MySql(s) => s.query_keys(sql, args).await,
            Connection::Postgres(s) => s.query_keys(sql, args).await,
        }
    }
}

/// Parse a decimal aggregate returned as text
pub(crate) fn parse_sum(value: Option<&str>) -> Result<u64, DriverError> {
    match value {
        None => Ok(0),
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| DriverError::Decode(format!("invalid checksum part {:?}: {}", s, e))),
    }
}
