// ABOUTME: Paginated checksum engine for a single table on a single connection
// ABOUTME: Counts rows and digests keyset pages server-side, advancing the cursor

use super::cursor::{PageCursor, PageDigest};
use super::schema::TableInfo;
use crate::database::SqlSession;
use crate::error::{CompareError, Result};

/// Count every row of `table`
pub async fn count_rows<S: SqlSession + ?Sized>(session: &mut S, table: &TableInfo) -> Result<u64> {
    let dialect = session.dialect();
    let sql = dialect.count_query(&dialect.table_ref(session.current_schema(), &table.name));

    let count = session
        .query_count(&sql, &[])
        .await
        .map_err(|e| CompareError::query(&table.name, "could not count rows", e))?;

    tracing::debug!("Table {} has {} rows", table.name, count);
    Ok(count)
}

/// Compute the digest of the page described by `cursor` and the cursor for
/// the page after it.
///
/// The next cursor is [`PageCursor::Exhausted`] once no rows remain.
/// Otherwise its limit is the number of rows actually left (capped at the
/// current limit), so a table that shrinks during the scan still terminates.
pub async fn checksum_page<S: SqlSession + ?Sized>(
    session: &mut S,
    table: &TableInfo,
    cursor: &PageCursor,
) -> Result<(PageDigest, PageCursor)> {
    let limit = cursor.limit();
    if limit == 0 {
        return Err(CompareError::invalid_query(
            &table.name,
            "checksum requested with an exhausted cursor",
        ));
    }
    if table.columns.is_empty() {
        return Err(CompareError::invalid_query(&table.name, "table has no columns"));
    }

    let dialect = session.dialect();
    let schema = session.current_schema().map(str::to_string);
    let table_ref = dialect.table_ref(schema.as_deref(), &table.name);
    let keys = table.key_columns();

    let pagination = dialect
        .pagination_clause(&keys, cursor.last_keys())
        .map_err(|e| CompareError::invalid_query(&table.name, e.to_string()))?;

    let sql = dialect.render_checksum_query(
        schema.as_deref(),
        &table.name,
        &dialect.column_hash_expression(&table.columns),
        &pagination.with_limit(limit),
    );
    tracing::debug!("Checksum query for {}: {}", table.name, sql);

    let parts = session
        .query_digest(&sql, &pagination.args)
        .await
        .map_err(|e| CompareError::query(&table.name, "could not select checksum", e))?;
    let digest = PageDigest::new(parts);

    // Rows covered by this page; fewer than the limit means it was the last.
    let page_rows = session
        .query_count(
            &dialect.page_count_query(&table_ref, &keys, &pagination, limit),
            &pagination.args,
        )
        .await
        .map_err(|e| CompareError::query(&table.name, "could not count page rows", e))?;

    if page_rows < limit {
        return Ok((digest, PageCursor::Exhausted));
    }

    if keys.is_empty() {
        // Without a key there is no stable order to resume from.
        let total = count_rows(session, table).await?;
        if total > limit {
            return Err(CompareError::invalid_query(
                &table.name,
                format!(
                    "table has no primary key and {} rows do not fit in a page of {}",
                    total, limit
                ),
            ));
        }
        return Ok((digest, PageCursor::Exhausted));
    }

    let last = session
        .query_keys(
            &dialect.last_key_query(&table_ref, &keys, &pagination, limit),
            &pagination.args,
        )
        .await
        .map_err(|e| CompareError::query(&table.name, "could not select cursors", e))?;

    let last = match last {
        Some(last) => last,
        None => return Ok((digest, PageCursor::Exhausted)),
    };

    let next = dialect
        .pagination_clause(&keys, Some(&last))
        .map_err(|e| CompareError::invalid_query(&table.name, e.to_string()))?;

    let remaining = session
        .query_count(
            &dialect.page_count_query(&table_ref, &keys, &next, limit),
            &next.args,
        )
        .await
        .map_err(|e| CompareError::query(&table.name, "could not count remaining rows", e))?;

    if remaining == 0 {
        return Ok((digest, PageCursor::Exhausted));
    }

    Ok((
        digest,
        PageCursor::After {
            keys: last,
            limit: remaining,
        },
    ))
}
