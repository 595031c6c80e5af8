// ABOUTME: Error taxonomy for a comparison run
// ABOUTME: Separates fatal run failures from driver-level query errors

use thiserror::Error;

/// Errors raised by a database driver while executing a single statement.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A value came back in a shape the caller cannot interpret
    #[error("could not decode result: {0}")]
    Decode(String),
}

/// Fatal conditions that abort a comparison run.
///
/// A data mismatch is not an error; it is reported through
/// [`crate::verify::ComparisonResult`].
#[derive(Error, Debug)]
pub enum CompareError {
    /// Invalid options (page size, missing endpoints, unreadable config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection string could not be understood or the server was unreachable
    #[error("could not connect to {endpoint} database: {message}")]
    Connection { endpoint: String, message: String },

    /// Table, column or primary key introspection failed
    #[error("could not introspect schema ({context})")]
    Schema {
        context: String,
        #[source]
        source: DriverError,
    },

    /// A source table has no counterpart in the target
    #[error("{table:?} table is not found in target schema")]
    Precondition { table: String },

    /// A count, checksum or cursor query failed
    #[error("query failed for table {table:?}: {message}")]
    Query {
        table: String,
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Source and target cursors reported different remaining rows
    #[error(
        "could not compute checksum for {table:?}: cursors are out of sync \
         (source limit {source_limit}, target limit {target_limit})"
    )]
    Sync {
        table: String,
        source_limit: u64,
        target_limit: u64,
    },
}

impl CompareError {
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        CompareError::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn schema(context: impl Into<String>, source: DriverError) -> Self {
        CompareError::Schema {
            context: context.into(),
            source,
        }
    }

    /// Query error caused by a driver failure
    pub fn query(table: impl Into<String>, message: impl Into<String>, source: DriverError) -> Self {
        CompareError::Query {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Query error detected before anything was sent to the server
    pub fn invalid_query(table: impl Into<String>, message: impl Into<String>) -> Self {
        CompareError::Query {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Format error with the full chain of causes
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, CompareError>;
