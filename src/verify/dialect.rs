// ABOUTME: SQL generation for MySQL and PostgreSQL checksum queries
// ABOUTME: Builds column hashes, keyset pagination and catalog lookups per engine

use super::schema::ColumnInfo;
use crate::database::KeyValue;
use thiserror::Error;

/// Schema used when PostgreSQL reports no current schema
pub const DEFAULT_PG_SCHEMA: &str = "public";

// Per row: MD5 of each column (a space for NULL), concatenated and hashed
// again. The row hash is split into four 8-character hex strings which are
// converted to 32-bit integers and summed across the page.
const MYSQL_CHECKSUM_TEMPLATE: &str = "SELECT
  CAST(COALESCE(SUM(CAST(CONV(SUBSTRING(hash, 1, 8), 16, 10) AS UNSIGNED)), 0) AS CHAR) AS a,
  CAST(COALESCE(SUM(CAST(CONV(SUBSTRING(hash, 9, 8), 16, 10) AS UNSIGNED)), 0) AS CHAR) AS b,
  CAST(COALESCE(SUM(CAST(CONV(SUBSTRING(hash, 17, 8), 16, 10) AS UNSIGNED)), 0) AS CHAR) AS c,
  CAST(COALESCE(SUM(CAST(CONV(SUBSTRING(hash, 25, 8), 16, 10) AS UNSIGNED)), 0) AS CHAR) AS d
FROM (
  SELECT MD5(CONCAT(
    {column_hash}
  )) AS hash
  FROM {table}{pagination}
) AS t";

// The 'x' prefix makes PostgreSQL read the substring as hex when casting
// through bit(32).
const POSTGRES_CHECKSUM_TEMPLATE: &str = "SELECT
  COALESCE(SUM(('x' || SUBSTRING(hash, 1, 8))::bit(32)::bigint), 0)::text AS a,
  COALESCE(SUM(('x' || SUBSTRING(hash, 9, 8))::bit(32)::bigint), 0)::text AS b,
  COALESCE(SUM(('x' || SUBSTRING(hash, 17, 8))::bit(32)::bigint), 0)::text AS c,
  COALESCE(SUM(('x' || SUBSTRING(hash, 25, 8))::bit(32)::bigint), 0)::text AS d
FROM (
  SELECT MD5(
    {column_hash}
  ) AS hash
  FROM {schema}.{table}{pagination}
) AS t";

/// Number of cursor values does not line up with the primary key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("primary keys ({keys}) and cursor values ({values}) do not match")]
pub struct CursorArityError {
    pub keys: usize,
    pub values: usize,
}

/// How a column participates in the row hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCategory {
    /// Hashed as its integer form so `true` and `1` agree across engines
    Boolean,
    /// Bit strings, hashed as a 64-bit integer
    Bit,
    /// Raw bytes are hashed without a text cast
    Binary,
    /// Everything else is hashed through its text form
    Text,
}

impl HashCategory {
    pub fn of(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => HashCategory::Boolean,
            "bit" => HashCategory::Bit,
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary"
            | "varbinary" => HashCategory::Binary,
            _ => HashCategory::Text,
        }
    }
}

/// `ORDER BY` plus optional keyset `WHERE`, with the arguments it binds
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationClause {
    pub sql: String,
    pub args: Vec<KeyValue>,
}

impl PaginationClause {
    pub fn with_limit(&self, limit: u64) -> String {
        format!("{} LIMIT {}", self.sql, limit)
    }
}

/// SQL dialects the comparison engine can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Fully qualified reference to a table as it appears after `FROM`
    pub fn table_ref(&self, schema: Option<&str>, table: &str) -> String {
        match self {
            Dialect::MySql => self.quote_ident(table),
            Dialect::Postgres => format!(
                "{}.{}",
                self.quote_ident(schema.unwrap_or(DEFAULT_PG_SCHEMA)),
                self.quote_ident(table)
            ),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", index),
        }
    }

    fn hash_column(&self, column: &ColumnInfo) -> String {
        let name = self.quote_ident(&column.name);
        let category = HashCategory::of(&column.data_type);
        match self {
            Dialect::MySql => match category {
                HashCategory::Boolean | HashCategory::Bit => {
                    format!("COALESCE(MD5(CAST({} AS UNSIGNED)), ' ')", name)
                }
                HashCategory::Binary | HashCategory::Text => {
                    format!("COALESCE(MD5({}), ' ')", name)
                }
            },
            Dialect::Postgres => match category {
                HashCategory::Boolean => format!("COALESCE(MD5(({}::int)::text), ' ')", name),
                HashCategory::Bit => format!("COALESCE(MD5(({}::bigint)::text), ' ')", name),
                HashCategory::Binary => format!("COALESCE(MD5({}), ' ')", name),
                HashCategory::Text => format!("COALESCE(MD5({}::text), ' ')", name),
            },
        }
    }

    /// Per-column hash expressions joined in the order given.
    ///
    /// Callers pass columns already sorted by lowercase name so that both
    /// engines concatenate in the same order.
    pub fn column_hash_expression(&self, columns: &[ColumnInfo]) -> String {
        let parts: Vec<String> = columns.iter().map(|c| self.hash_column(c)).collect();
        match self {
            Dialect::MySql => parts.join(",\n    "),
            Dialect::Postgres => parts.join(" ||\n    "),
        }
    }

    /// Keyset pagination over `primary_keys`.
    ///
    /// Without a cursor only the ordering is emitted. With one, rows strictly
    /// after the cursor's key tuple are selected and one argument is bound
    /// per key column.
    pub fn pagination_clause(
        &self,
        primary_keys: &[&ColumnInfo],
        after: Option<&[KeyValue]>,
    ) -> Result<PaginationClause, CursorArityError> {
        if primary_keys.is_empty() {
            return match after {
                None => Ok(PaginationClause {
                    sql: String::new(),
                    args: Vec::new(),
                }),
                Some(values) => Err(CursorArityError {
                    keys: 0,
                    values: values.len(),
                }),
            };
        }

        let order_by = format!(" ORDER BY {}", self.key_list(primary_keys, ""));

        let values = match after {
            None => {
                return Ok(PaginationClause {
                    sql: order_by,
                    args: Vec::new(),
                })
            }
            Some(values) => values,
        };

        if values.len() != primary_keys.len() {
            return Err(CursorArityError {
                keys: primary_keys.len(),
                values: values.len(),
            });
        }

        let binds: Vec<String> = primary_keys
            .iter()
            .enumerate()
            .map(|(i, column)| self.bind_key(column, i + 1))
            .collect();

        let predicate = if primary_keys.len() == 1 {
            format!("{} > {}", self.quote_ident(&primary_keys[0].name), binds[0])
        } else {
            format!(
                "({}) > ({})",
                self.key_list(primary_keys, ""),
                binds.join(", ")
            )
        };

        Ok(PaginationClause {
            sql: format!(" WHERE {}{}", predicate, order_by),
            args: values.to_vec(),
        })
    }

    // PostgreSQL receives cursor values as text and casts them back to the
    // column's own type so comparisons use native ordering.
    fn bind_key(&self, column: &ColumnInfo, index: usize) -> String {
        let placeholder = self.placeholder(index);
        match self {
            Dialect::MySql => placeholder,
            Dialect::Postgres => format!(
                "CAST({}::text AS {})",
                placeholder,
                self.quote_ident(&column.udt_name)
            ),
        }
    }

    fn key_list(&self, primary_keys: &[&ColumnInfo], suffix: &str) -> String {
        primary_keys
            .iter()
            .map(|c| format!("{}{}", self.quote_ident(&c.name), suffix))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn checksum_template(&self) -> &'static str {
        match self {
            Dialect::MySql => MYSQL_CHECKSUM_TEMPLATE,
            Dialect::Postgres => POSTGRES_CHECKSUM_TEMPLATE,
        }
    }

    /// Fill the checksum template for one page.
    ///
    /// `pagination` is the rendered clause including its `LIMIT`.
    pub fn render_checksum_query(
        &self,
        schema: Option<&str>,
        table: &str,
        column_hash: &str,
        pagination: &str,
    ) -> String {
        let template = self.checksum_template();
        let with_table = match self {
            Dialect::MySql => template.replace("{table}", &self.quote_ident(table)),
            Dialect::Postgres => template
                .replace(
                    "{schema}",
                    &self.quote_ident(schema.unwrap_or(DEFAULT_PG_SCHEMA)),
                )
                .replace("{table}", &self.quote_ident(table)),
        };
        with_table
            .replace("{column_hash}", column_hash)
            .replace("{pagination}", pagination)
    }

    pub fn count_query(&self, table_ref: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", table_ref)
    }

    /// Number of rows selected by one page of the keyset query
    pub fn page_count_query(
        &self,
        table_ref: &str,
        primary_keys: &[&ColumnInfo],
        pagination: &PaginationClause,
        limit: u64,
    ) -> String {
        let selected = if primary_keys.is_empty() {
            "1".to_string()
        } else {
            self.key_list(primary_keys, "")
        };
        format!(
            "SELECT COUNT(*) FROM (SELECT {} FROM {}{}) AS q2",
            selected,
            table_ref,
            pagination.with_limit(limit)
        )
    }

    /// Key tuple of the last row of one page
    pub fn last_key_query(
        &self,
        table_ref: &str,
        primary_keys: &[&ColumnInfo],
        pagination: &PaginationClause,
        limit: u64,
    ) -> String {
        let outer = match self {
            Dialect::MySql => self.key_list(primary_keys, ""),
            Dialect::Postgres => self.key_list(primary_keys, "::text"),
        };
        // Qualified so PostgreSQL sorts the key columns, not the ::text outputs
        let order_by = primary_keys
            .iter()
            .map(|c| format!("q1.{} DESC", self.quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM (SELECT {} FROM {}{}) AS q1 ORDER BY {} LIMIT 1",
            outer,
            self.key_list(primary_keys, ""),
            table_ref,
            pagination.with_limit(limit),
            order_by
        )
    }

    pub fn list_tables_query(&self) -> &'static str {
        match self {
            Dialect::MySql => {
                "SELECT TABLE_NAME FROM information_schema.tables \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME"
            }
            Dialect::Postgres => {
                "SELECT tablename::text FROM pg_catalog.pg_tables \
                 WHERE schemaname = current_schema() \
                 ORDER BY tablename"
            }
        }
    }

    /// Column name, declared type and underlying type name for one table
    pub fn columns_query(&self) -> &'static str {
        match self {
            // with mysql-8 the information_schema columns are upper case
            Dialect::MySql => {
                "SELECT COLUMN_NAME, DATA_TYPE, DATA_TYPE FROM information_schema.columns \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
            Dialect::Postgres => {
                "SELECT column_name::text, data_type::text, udt_name::text \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1::text"
            }
        }
    }

    /// Primary key columns in key order
    pub fn primary_keys_query(&self) -> &'static str {
        match self {
            Dialect::MySql => {
                "SELECT COLUMN_NAME FROM information_schema.key_column_usage \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 AND CONSTRAINT_NAME = 'PRIMARY' \
                 ORDER BY ORDINAL_POSITION"
            }
            Dialect::Postgres => {
                "SELECT a.attname::text \
                 FROM pg_catalog.pg_index i \
                 JOIN pg_catalog.pg_attribute a \
                   ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = $1::text::regclass AND i.indisprimary \
                 ORDER BY array_position(i.indkey::int2[], a.attnum)"
            }
        }
    }

    /// Argument identifying a table for [`Dialect::primary_keys_query`].
    ///
    /// PostgreSQL resolves it through `regclass`, which is ambiguous without
    /// the schema and folds case unless quoted.
    pub fn primary_keys_arg(&self, schema: Option<&str>, table: &str) -> String {
        match self {
            Dialect::MySql => table.to_string(),
            Dialect::Postgres => self.table_ref(schema, table),
        }
    }
}
