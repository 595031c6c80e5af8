// ABOUTME: Table comparator orchestrating source and target checksums
// ABOUTME: Matches tables, filters exclusions, compares counts then paginated digests

use super::cursor::PageCursor;
use super::schema::{TableInfo, TableMap};
use super::TableSource;
use crate::config::CompareOptions;
use crate::error::{CompareError, Result};
use indicatif::ProgressBar;
use serde::Serialize;

/// Verdict for a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// No rows on either side
    Empty,
    Match { rows: u64, pages: u64 },
    CountMismatch { source_rows: u64, target_rows: u64 },
    ChecksumMismatch {
        rows: u64,
        page: u64,
        source_digest: String,
        target_digest: String,
    },
}

impl TableOutcome {
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            TableOutcome::CountMismatch { .. } | TableOutcome::ChecksumMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Result of one comparison run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    /// Source-side names of tables whose count or digest differs
    pub mismatches: Vec<String>,
    /// Source tables skipped by an exclude pattern
    pub excluded: Vec<String>,
    pub tables: Vec<TableReport>,
}

impl ComparisonResult {
    pub fn is_match(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares every source table against its target counterpart.
///
/// Tables are processed one at a time. Within a table, each page is computed
/// on the source, then on the target, and compared before the next page is
/// requested.
pub struct Comparator {
    options: CompareOptions,
    progress: ProgressBar,
}

impl Comparator {
    pub fn new(options: CompareOptions) -> Self {
        Self {
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-table progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn compare<S, T>(&self, source: &mut S, target: &mut T) -> Result<ComparisonResult>
    where
        S: TableSource + ?Sized,
        T: TableSource + ?Sized,
    {
        self.options.validate()?;

        tracing::info!("Listing source tables...");
        let source_tables = source.list_tables().await?;
        tracing::info!("Listing target tables...");
        let target_tables = target.list_tables().await?;

        let mut result = ComparisonResult::default();
        let mut pairs = Vec::new();
        for (key, table) in &source_tables {
            if self.options.is_excluded(key) {
                tracing::debug!("Excluding table {}", table.name);
                result.excluded.push(table.name.clone());
                continue;
            }
            pairs.push((table, counterpart(&target_tables, key, table)?));
        }

        tracing::info!(
            "Comparing {} tables ({} excluded, page size {})",
            pairs.len(),
            result.excluded.len(),
            self.options.page_size
        );
        self.progress.set_length(pairs.len() as u64);

        for (source_table, target_table) in pairs {
            let outcome = self
                .compare_table(source, target, source_table, target_table)
                .await?;

            match &outcome {
                TableOutcome::Empty => tracing::info!("  ✓ {}: empty", source_table.name),
                TableOutcome::Match { rows, pages } => tracing::info!(
                    "  ✓ {}: match ({} rows, {} pages)",
                    source_table.name,
                    rows,
                    pages
                ),
                TableOutcome::CountMismatch {
                    source_rows,
                    target_rows,
                } => tracing::warn!(
                    "  ✗ {}: row count differs: source={}, target={}",
                    source_table.name,
                    source_rows,
                    target_rows
                ),
                TableOutcome::ChecksumMismatch {
                    page,
                    source_digest,
                    target_digest,
                    ..
                } => tracing::warn!(
                    "  ✗ {}: checksum differs on page {}: source={}, target={}",
                    source_table.name,
                    page,
                    source_digest,
                    target_digest
                ),
            }

            if outcome.is_mismatch() {
                result.mismatches.push(source_table.name.clone());
            }
            result.tables.push(TableReport {
                table: source_table.name.clone(),
                outcome,
            });

            self.progress.inc(1);
            self.progress
                .set_message(format!("Compared {}", source_table.name));
        }

        self.progress.finish_and_clear();
        Ok(result)
    }

    async fn compare_table<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        source_table: &TableInfo,
        target_table: &TableInfo,
    ) -> Result<TableOutcome>
    where
        S: TableSource + ?Sized,
        T: TableSource + ?Sized,
    {
        // counts first, they are cheap compared to checksums
        let source_rows = source.count_rows(source_table).await?;
        let target_rows = target.count_rows(target_table).await?;

        if source_rows != target_rows {
            return Ok(TableOutcome::CountMismatch {
                source_rows,
                target_rows,
            });
        }
        if source_rows == 0 {
            return Ok(TableOutcome::Empty);
        }

        let mut source_cursor = PageCursor::first(self.options.page_size);
        let mut target_cursor = PageCursor::first(self.options.page_size);
        let mut page = 0;

        loop {
            page += 1;

            let (source_digest, next_source) =
                source.checksum_page(source_table, &source_cursor).await?;
            let (target_digest, next_target) =
                target.checksum_page(target_table, &target_cursor).await?;

            tracing::debug!(
                "{} page {}: source={} target={}",
                source_table.name,
                page,
                source_digest,
                target_digest
            );

            if source_digest != target_digest {
                return Ok(TableOutcome::ChecksumMismatch {
                    rows: source_rows,
                    page,
                    source_digest: source_digest.to_string(),
                    target_digest: target_digest.to_string(),
                });
            }

            if next_source.limit() != next_target.limit() {
                return Err(CompareError::Sync {
                    table: source_table.name.clone(),
                    source_limit: next_source.limit(),
                    target_limit: next_target.limit(),
                });
            }

            if next_source.is_exhausted() {
                return Ok(TableOutcome::Match {
                    rows: source_rows,
                    pages: page,
                });
            }

            source_cursor = next_source;
            target_cursor = next_target;
        }
    }
}

fn counterpart<'a>(target_tables: &'a TableMap, key: &str, table: &TableInfo) -> Result<&'a TableInfo> {
    target_tables
        .get(key)
        .ok_or_else(|| CompareError::Precondition {
            table: table.name.clone(),
        })
}
