//! Provider-agnostic repositories over a shared session.
//!
//! Every repository takes an `Arc<dyn Session>`, so the same code runs
//! against any of the three providers.

mod authors;
mod books;
mod user_books;

pub use authors::AuthorRepository;
pub use books::BookRepository;
pub use user_books::UserBookRepository;

use crate::session::{Row, Session, SqlValue, Statement};
use crate::Result;
use std::collections::BTreeMap;

/// Run a single-row `COUNT(*) AS total` style statement.
async fn scalar_count(session: &dyn Session, statement: &Statement, column: &str) -> Result<i64> {
    let rows = session.execute(statement).await?;
    match rows.first() {
        Some(row) => Ok(row.get::<Option<i64>>(column)?.unwrap_or(0)),
        None => Ok(0),
    }
}

/// Fold `(key, count)` rows into an ordered map.
fn grouped_counts(rows: &[Row], key: &str) -> Result<BTreeMap<String, i64>> {
    let mut counts = BTreeMap::new();
    for row in rows {
        let name: String = row.get(key)?;
        let count: i64 = row.get("count")?;
        counts.insert(name, count);
    }
    Ok(counts)
}

/// `ORDER BY` clause with NULLs last and a stable id tie-break.
fn order_by(column: &str, direction: crate::SortDirection, id_column: &str) -> String {
    format!(
        " ORDER BY {} {} NULLS LAST, {} ASC",
        column,
        direction.as_sql(),
        id_column
    )
}

/// Trimmed, non-empty text filter.
fn text_filter(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn id_statement(sql: String, id: i64) -> Statement {
    Statement::new(sql).bind(SqlValue::from(id))
}
