// ABOUTME: In-memory SqlSession used by unit tests
// ABOUTME: Interprets the generated catalog, count and keyset queries of either dialect

use crate::database::{DigestParts, KeyValue, SqlSession};
use crate::error::DriverError;
use crate::verify::Dialect;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Range;

/// A table with a single integer key and one opaque payload per row
#[derive(Debug, Clone)]
pub struct MemoryTable {
    columns: Vec<String>,
    keyed: bool,
    rows: BTreeMap<i64, u32>,
}

impl MemoryTable {
    /// The first column is the primary key
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            keyed: true,
            rows: BTreeMap::new(),
        }
    }

    pub fn without_primary_key(mut self) -> Self {
        self.keyed = false;
        self
    }

    pub fn rows(mut self, keys: Range<i64>) -> Self {
        for key in keys {
            self.rows.insert(key, default_payload(key));
        }
        self
    }

    fn row_parts(key: i64, payload: u32) -> DigestParts {
        [
            payload as u64,
            payload.rotate_left(8) as u64,
            (payload ^ key as u32) as u64,
            ((payload >> 16) + 1) as u64,
        ]
    }
}

fn default_payload(key: i64) -> u32 {
    (key as u32).wrapping_mul(2_654_435_761).wrapping_add(17)
}

#[derive(Debug)]
pub struct MemorySession {
    dialect: Dialect,
    tables: BTreeMap<String, MemoryTable>,
    queries: Vec<String>,
    fail_pattern: Option<String>,
}

impl MemorySession {
    /// Session answering MySQL-dialect queries with native integer keys
    pub fn new() -> Self {
        Self {
            dialect: Dialect::MySql,
            tables: BTreeMap::new(),
            queries: Vec::new(),
            fail_pattern: None,
        }
    }

    /// Session answering PostgreSQL-dialect queries; keys travel as text
    pub fn postgres() -> Self {
        Self {
            dialect: Dialect::Postgres,
            ..Self::new()
        }
    }

    pub fn with_table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    /// Fail every statement containing `pattern`
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_pattern = Some(pattern.to_string());
        self
    }

    pub fn delete_row(&mut self, table: &str, key: i64) {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows.remove(&key);
        }
    }

    pub fn update_row(&mut self, table: &str, key: i64, payload: u32) {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows.insert(key, payload);
        }
    }

    /// Every statement executed so far
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn queried(&self, needle: &str) -> bool {
        self.queries.iter().any(|q| q.contains(needle))
    }

    fn record(&mut self, sql: &str) -> Result<(), DriverError> {
        self.queries.push(sql.to_string());
        match &self.fail_pattern {
            Some(pattern) if sql.contains(pattern.as_str()) => {
                Err(DriverError::Decode(format!("injected failure on {:?}", pattern)))
            }
            _ => Ok(()),
        }
    }

    fn table_arg(&self, args: &[KeyValue]) -> Result<&MemoryTable, DriverError> {
        match args.first() {
            // PostgreSQL primary key lookups pass "schema"."table"
            Some(KeyValue::Text(name)) => match name.rsplit_once(".\"") {
                Some((_, quoted)) => self.lookup(quoted.trim_end_matches('"')),
                None => self.lookup(name),
            },
            _ => Err(DriverError::Decode("expected table name argument".into())),
        }
    }

    fn lookup(&self, name: &str) -> Result<&MemoryTable, DriverError> {
        self.tables
            .get(name)
            .ok_or_else(|| DriverError::Decode(format!("no such table {}", name)))
    }

    /// Rows selected by the innermost keyset query of `sql`
    fn selected(&self, sql: &str, args: &[KeyValue]) -> Result<Vec<(i64, u32)>, DriverError> {
        let name = match self.dialect {
            Dialect::MySql => between(sql, "FROM `", "`"),
            Dialect::Postgres => between(sql, "FROM \"public\".\"", "\""),
        }
        .ok_or_else(|| DriverError::Decode("no table in query".into()))?;
        let table = self.lookup(name)?;

        let after = match args.first() {
            None => None,
            Some(KeyValue::Int(k)) => Some(*k),
            Some(KeyValue::Text(k)) => Some(
                k.parse::<i64>()
                    .map_err(|e| DriverError::Decode(format!("bad cursor {:?}: {}", k, e)))?,
            ),
            Some(other) => {
                return Err(DriverError::Decode(format!("unexpected cursor {}", other)))
            }
        };

        let limit = match sql.find("LIMIT ") {
            Some(pos) => {
                let digits: String = sql[pos + 6..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits
                    .parse::<usize>()
                    .map_err(|e| DriverError::Decode(e.to_string()))?
            }
            None => usize::MAX,
        };

        Ok(table
            .rows
            .iter()
            .filter(|(k, _)| after.map_or(true, |a| **k > a))
            .take(limit)
            .map(|(k, p)| (*k, *p))
            .collect())
    }
}

fn between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(&haystack[from..from + len])
}

#[async_trait]
impl SqlSession for MemorySession {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn current_schema(&self) -> Option<&str> {
        match self.dialect {
            Dialect::MySql => None,
            Dialect::Postgres => Some("public"),
        }
    }

    async fn query_text(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Vec<Vec<Option<String>>>, DriverError> {
        self.record(sql)?;

        if sql.contains("information_schema.tables") || sql.contains("pg_tables") {
            return Ok(self.tables.keys().map(|name| vec![Some(name.clone())]).collect());
        }

        let table = self.table_arg(args)?;
        if sql.contains("information_schema.columns") {
            return Ok(table
                .columns
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let (data_type, udt_name) = match (i, self.dialect) {
                        (0, Dialect::MySql) => ("bigint", "bigint"),
                        (0, Dialect::Postgres) => ("bigint", "int8"),
                        (_, _) => ("varchar", "varchar"),
                    };
                    vec![
                        Some(name.clone()),
                        Some(data_type.to_string()),
                        Some(udt_name.to_string()),
                    ]
                })
                .collect());
        }
        if sql.contains("key_column_usage") || sql.contains("pg_index") {
            return Ok(match (table.keyed, table.columns.first()) {
                (true, Some(pk)) => vec![vec![Some(pk.clone())]],
                _ => Vec::new(),
            });
        }

        Err(DriverError::Decode(format!("unsupported query: {}", sql)))
    }

    async fn query_count(&mut self, sql: &str, args: &[KeyValue]) -> Result<u64, DriverError> {
        self.record(sql)?;
        Ok(self.selected(sql, args)?.len() as u64)
    }

    async fn query_digest(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<DigestParts, DriverError> {
        self.record(sql)?;
        let mut sums = [0u64; 4];
        for (key, payload) in self.selected(sql, args)? {
            for (sum, part) in sums.iter_mut().zip(MemoryTable::row_parts(key, payload)) {
                *sum += part;
            }
        }
        Ok(sums)
    }

    async fn query_keys(
        &mut self,
        sql: &str,
        args: &[KeyValue],
    ) -> Result<Option<Vec<KeyValue>>, DriverError> {
        self.record(sql)?;
        let rows = self.selected(sql, args)?;
        match self.dialect {
            Dialect::MySql => Ok(rows.last().map(|(key, _)| vec![KeyValue::Int(*key)])),
            Dialect::Postgres => {
                // An unqualified ORDER BY name binds to the ::text output
                // column, which sorts keys as strings.
                let outer = sql.rsplit_once(") AS q1").map_or("", |(_, tail)| tail);
                let key = if outer.contains("ORDER BY \"") {
                    rows.iter().map(|(key, _)| key.to_string()).max()
                } else {
                    rows.last().map(|(key, _)| key.to_string())
                };
                Ok(key.map(|k| vec![KeyValue::Text(k)]))
            }
        }
    }
}
