// ABOUTME: Table comparison engine
// ABOUTME: Schema introspection, paginated checksums and source/target reconciliation

pub mod checksum;
pub mod comparator;
pub mod cursor;
pub mod dialect;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use comparator::{Comparator, ComparisonResult, TableOutcome, TableReport};
pub use cursor::{PageCursor, PageDigest};
pub use dialect::{Dialect, PaginationClause};
pub use schema::{ColumnInfo, TableInfo, TableMap};

use crate::database::SqlSession;
use crate::error::Result;
use async_trait::async_trait;

/// One side of a comparison, as seen by the [`Comparator`]
#[async_trait]
pub trait TableSource: Send {
    async fn list_tables(&mut self) -> Result<TableMap>;

    async fn count_rows(&mut self, table: &TableInfo) -> Result<u64>;

    async fn checksum_page(
        &mut self,
        table: &TableInfo,
        cursor: &PageCursor,
    ) -> Result<(PageDigest, PageCursor)>;
}

#[async_trait]
impl<S: SqlSession> TableSource for S {
    async fn list_tables(&mut self) -> Result<TableMap> {
        schema::list_tables(self).await
    }

    async fn count_rows(&mut self, table: &TableInfo) -> Result<u64> {
        checksum::count_rows(self, table).await
    }

    async fn checksum_page(
        &mut self,
        table: &TableInfo,
        cursor: &PageCursor,
    ) -> Result<(PageDigest, PageCursor)> {
        checksum::checksum_page(self, table, cursor).await
    }
}
