// ABOUTME: Schema introspection for checksum planning
// ABOUTME: Discovers tables, sorted columns and primary key order on either engine

use crate::database::{KeyValue, SqlSession};
use crate::error::{CompareError, DriverError, Result};
use std::collections::BTreeMap;

/// Tables keyed by lowercase name so both engines can be matched
pub type TableMap = BTreeMap<String, TableInfo>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by `information_schema`
    pub data_type: String,
    /// Engine type name usable in a cast (PostgreSQL `udt_name`)
    pub udt_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Original case, used for display and for building SQL
    pub name: String,
    /// Columns sorted by lowercase name
    pub columns: Vec<ColumnInfo>,
    /// Primary key columns in key order
    pub primary_keys: Vec<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, mut columns: Vec<ColumnInfo>, primary_keys: Vec<String>) -> Self {
        sort_columns(&mut columns);
        Self {
            name: name.into(),
            columns,
            primary_keys,
        }
    }

    /// Column descriptors of the primary key, in key order
    pub fn key_columns(&self) -> Vec<&ColumnInfo> {
        self.primary_keys
            .iter()
            .filter_map(|pk| self.columns.iter().find(|c| &c.name == pk))
            .collect()
    }
}

/// Order columns by lowercase name so hash concatenation is identical
/// regardless of each engine's native column order
pub fn sort_columns(columns: &mut [ColumnInfo]) {
    columns.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// List every base table in the current database or schema.
///
/// Each table is described with its columns and primary key. Any catalog
/// failure aborts the listing.
pub async fn list_tables<S: SqlSession + ?Sized>(session: &mut S) -> Result<TableMap> {
    let dialect = session.dialect();

    let rows = session
        .query_text(dialect.list_tables_query(), &[])
        .await
        .map_err(|e| CompareError::schema("listing tables", e))?;

    let mut tables = TableMap::new();
    for row in rows {
        let name = first_column(row).map_err(|e| CompareError::schema("listing tables", e))?;

        let columns = list_columns(session, &name).await?;
        let primary_keys = list_primary_keys(session, &name).await?;

        if let Some(missing) = primary_keys
            .iter()
            .find(|pk| !columns.iter().any(|c| &c.name == *pk))
        {
            return Err(CompareError::schema(
                format!("determining primary keys of {}", name),
                DriverError::Decode(format!("primary key column {:?} is not a column", missing)),
            ));
        }

        tracing::debug!(
            "Discovered table {} ({} columns, primary key: [{}])",
            name,
            columns.len(),
            primary_keys.join(", ")
        );

        tables.insert(
            name.to_lowercase(),
            TableInfo::new(name, columns, primary_keys),
        );
    }

    Ok(tables)
}

async fn list_columns<S: SqlSession + ?Sized>(session: &mut S, table: &str) -> Result<Vec<ColumnInfo>> {
    let dialect = session.dialect();
    let context = || format!("populating columns of {}", table);

    let rows = session
        .query_text(dialect.columns_query(), &[KeyValue::Text(table.to_string())])
        .await
        .map_err(|e| CompareError::schema(context(), e))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = row.into_iter();
        let mut next = |what: &str| {
            values
                .next()
                .flatten()
                .ok_or_else(|| CompareError::schema(context(), missing(what)))
        };
        let name = next("column name")?;
        let data_type = next("data type")?;
        let udt_name = next("type name")?;
        columns.push(ColumnInfo {
            name,
            data_type,
            udt_name,
        });
    }

    sort_columns(&mut columns);
    Ok(columns)
}

async fn list_primary_keys<S: SqlSession + ?Sized>(session: &mut S, table: &str) -> Result<Vec<String>> {
    let dialect = session.dialect();
    let arg = dialect.primary_keys_arg(session.current_schema(), table);
    let context = || format!("determining primary keys of {}", table);

    let rows = session
        .query_text(dialect.primary_keys_query(), &[KeyValue::Text(arg)])
        .await
        .map_err(|e| CompareError::schema(context(), e))?;

    rows.into_iter()
        .map(|row| first_column(row).map_err(|e| CompareError::schema(context(), e)))
        .collect()
}

fn first_column(row: Vec<Option<String>>) -> std::result::Result<String, DriverError> {
    row.into_iter()
        .next()
        .flatten()
        .ok_or_else(|| missing("first column"))
}

fn missing(what: &str) -> DriverError {
    DriverError::Decode(format!("catalog query returned no {}", what))
}
