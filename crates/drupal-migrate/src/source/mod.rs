//! Source plugins and the paging cursor that iterates them.
//!
//! SQL-backed sources describe their legacy query with [`SelectQuery`] and
//! delegate paging to [`fetch_page`], which wraps the query so that ordering,
//! `LIMIT/OFFSET` and the high-water condition apply to its output columns.

mod authmap;
mod embedded;
mod field;
mod filter_format;
#[cfg(test)]
pub(crate) mod fixtures;
mod legacy_db;
mod metatag;
mod node_type;
mod path;
mod query;
mod taxonomy;

use std::collections::VecDeque;

use tracing::debug;

use crate::core::identifier::quote;
use crate::core::row::Row;
use crate::core::schema::IdSchema;
use crate::core::traits::{HighWater, PageRequest, Source};
use crate::core::value::Value;
use crate::db::Record;
use crate::error::Result;

pub use authmap::AuthmapSource;
pub use embedded::EmbeddedDataSource;
pub use field::{FieldGroupSource, FieldInstancePerViewModeSource};
pub use filter_format::FilterFormatSource;
pub use legacy_db::LegacyDb;
pub use metatag::MetatagFieldInstanceSource;
pub use node_type::NodeTypeSource;
pub use path::UrlAliasSource;
pub use query::{JoinKind, Operator, SelectQuery};
pub use taxonomy::{TermSource, VocabularySource};

/// Default number of raw records fetched per page.
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Options for iterating a source.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Raw records per page.
    pub batch_size: u64,
    /// Only yield records newer than this mark.
    pub high_water: Option<HighWater>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            high_water: None,
        }
    }
}

/// Lazy, restartable iterator over the prepared rows of a source.
///
/// Each row is keyed by the source's ID schema, frozen and hashed before it
/// is yielded. Fan-out rows from one raw record are buffered and yielded in
/// order before the next record is prepared.
pub struct SourceCursor<'a, S: Source + ?Sized> {
    source: &'a S,
    options: CursorOptions,
    ids: IdSchema,
    offset: u64,
    page: VecDeque<Record>,
    ready: VecDeque<Row>,
    exhausted: bool,
    checked: bool,
}

impl<'a, S: Source + ?Sized> SourceCursor<'a, S> {
    /// Create a cursor positioned before the first row.
    pub fn new(source: &'a S, options: CursorOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        Self {
            ids: source.ids(),
            source,
            options: CursorOptions {
                batch_size,
                ..options
            },
            offset: 0,
            page: VecDeque::new(),
            ready: VecDeque::new(),
            exhausted: false,
            checked: false,
        }
    }

    /// Restart iteration from the first row.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.page.clear();
        self.ready.clear();
        self.exhausted = false;
    }

    /// The next prepared row, or `None` when the source is exhausted.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.ready.pop_front() {
                return Ok(Some(row));
            }

            let record = match self.page.pop_front() {
                Some(record) => record,
                None => {
                    if !self.fill_page().await? {
                        return Ok(None);
                    }
                    continue;
                }
            };

            for mut row in self.source.prepare_row(Row::from_record(record)).await? {
                row.assign_ids(&self.ids)?;
                row.freeze();
                row.rehash();
                self.ready.push_back(row);
            }
        }
    }

    async fn fill_page(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.checked {
            self.source.check_requirements().await?;
            self.checked = true;
        }

        let request = PageRequest {
            offset: self.offset,
            limit: self.options.batch_size,
            high_water: self.options.high_water.clone(),
        };
        let records = self.source.fetch(&request).await?;
        debug!(
            "{}: fetched {} records at offset {}",
            self.source.plugin_id(),
            records.len(),
            self.offset
        );

        self.offset += records.len() as u64;
        if (records.len() as u64) < self.options.batch_size {
            self.exhausted = true;
        }
        if records.is_empty() {
            return Ok(false);
        }
        self.page.extend(records);
        Ok(true)
    }
}

/// Fetch one page of a legacy query, ordered by `order` columns.
pub async fn fetch_page(
    db: &LegacyDb,
    query: &SelectQuery,
    order: &[&str],
    request: &PageRequest,
) -> Result<Vec<Record>> {
    let (inner, mut params) = query.to_sql()?;
    let mut sql = format!("SELECT * FROM ({}) AS source_rows", inner);

    if let Some(mark) = &request.high_water {
        sql.push_str(&format!(" WHERE {} > ?", quote(&mark.property)?));
        params.push(mark.value.clone());
    }

    let order = if order.is_empty() {
        "1".to_string()
    } else {
        order.iter().map(|c| quote(c)).collect::<Result<Vec<_>>>()?.join(", ")
    };
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order));
    params.push(Value::Int(request.limit as i64));
    params.push(Value::Int(request.offset as i64));

    db.fetch(&sql, &params).await
}

/// `COUNT(*)` of a legacy query, for sources whose `prepare_row` never
/// skips or fans out.
pub async fn count_query(db: &LegacyDb, query: &SelectQuery) -> Result<u64> {
    let (inner, params) = query.to_sql()?;
    let sql = format!("SELECT COUNT(*) AS n FROM ({}) AS source_rows", inner);
    let rows = db.fetch(&sql, &params).await?;
    Ok(rows
        .first()
        .and_then(|r| r.get("n"))
        .and_then(Value::as_i64)
        .unwrap_or_default()
        .max(0) as u64)
}

/// Collect every row of a source. Intended for small sources and tests.
pub async fn collect_rows<S: Source + ?Sized>(source: &S) -> Result<Vec<Row>> {
    let mut cursor = SourceCursor::new(source, CursorOptions::default());
    let mut rows = Vec::new();
    while let Some(row) = cursor.next().await? {
        rows.push(row);
    }
    Ok(rows)
}
