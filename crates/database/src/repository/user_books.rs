//! Shelf entries: which users want to read, are reading or have read a book

use super::{id_statement, scalar_count};
use crate::models::{NewUserBook, ReadingStatus, ShelfStats, UserBook, UserBookEntry, UserBookUpdate};
use crate::projection::{user_book_entry_columns, USER_BOOK_COLUMNS, USER_BOOK_ENTRY_FROM};
use crate::query::{Assignments, Conditions, Page, Pagination};
use crate::session::{decode_all, decode_first, Session, Statement};
use crate::{DbError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct UserBookRepository {
    session: Arc<dyn Session>,
}

impl UserBookRepository {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<UserBook>> {
        let sql = format!("SELECT {} FROM user_books ub WHERE ub.id = $1", USER_BOOK_COLUMNS);
        let rows = self.session.execute(&id_statement(sql, id)).await?;
        decode_first(rows)
    }

    /// A user's shelf, most recently touched first
    pub async fn list_for_user(
        &self,
        user_id: i64,
        status: Option<ReadingStatus>,
        pagination: Pagination,
    ) -> Result<Page<UserBookEntry>> {
        let mut conditions = Conditions::new();
        conditions.push("ub.user_id = {}", user_id);
        if let Some(status) = status {
            conditions.push("ub.status = {}", status.as_str());
        }
        let where_sql = conditions.where_sql();

        let count = Statement::new(format!(
            "SELECT COUNT(*) AS total FROM {}{}",
            USER_BOOK_ENTRY_FROM, where_sql
        ))
        .with_params(conditions.params());
        let total = scalar_count(self.session.as_ref(), &count, "total").await?;

        let limit = conditions.bind_extra(pagination.limit());
        let offset = conditions.bind_extra(pagination.offset());
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY ub.updated_at DESC, ub.id DESC LIMIT {} OFFSET {}",
            user_book_entry_columns(),
            USER_BOOK_ENTRY_FROM,
            where_sql,
            limit,
            offset
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(conditions.params()))
            .await?;
        Ok(Page::new(decode_all(rows)?, total, pagination))
    }

    /// Put a book on a user's shelf. Starting in `reading` or `read` stamps
    /// the matching timestamps.
    pub async fn create(&self, entry: &NewUserBook) -> Result<UserBook> {
        let sql = format!(
            "INSERT INTO user_books AS ub
             (user_id, book_id, status, rating, notes, started_at, finished_at)
             VALUES ($1, $2, $3, $4, $5,
                     CASE WHEN $3 IN ('reading', 'read') THEN now() END,
                     CASE WHEN $3 = 'read' THEN now() END)
             RETURNING {}",
            USER_BOOK_COLUMNS
        );
        let statement = Statement::new(sql)
            .bind(entry.user_id)
            .bind(entry.book_id)
            .bind(entry.status.as_str())
            .bind(entry.rating)
            .bind(entry.notes.clone());
        let rows = self.session.execute(&statement).await?;
        decode_first(rows)?.ok_or_else(|| DbError::Decode("INSERT returned no row".into()))
    }

    /// Partial update. Moving to `reading` sets `started_at` and moving to
    /// `read` sets `finished_at`, each only if not already set.
    pub async fn update(&self, id: i64, update: &UserBookUpdate) -> Result<Option<UserBook>> {
        let mut sets = Assignments::new();
        if let Some(status) = update.status {
            let p = sets.bind_extra(status.as_str());
            sets.raw(&format!("status = {}", p));
            sets.raw(&format!(
                "started_at = COALESCE(ub.started_at, CASE WHEN {} IN ('reading', 'read') THEN now() END)",
                p
            ));
            sets.raw(&format!(
                "finished_at = COALESCE(ub.finished_at, CASE WHEN {} = 'read' THEN now() END)",
                p
            ));
        }
        if let Some(rating) = update.rating {
            sets.set("rating", rating);
        }
        if let Some(notes) = &update.notes {
            sets.set("notes", notes.clone());
        }
        sets.raw("updated_at = now()");

        let id_placeholder = sets.bind_extra(id);
        let sql = format!(
            "UPDATE user_books AS ub SET {} WHERE ub.id = {} RETURNING {}",
            sets.sql(),
            id_placeholder,
            USER_BOOK_COLUMNS
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(sets.params()))
            .await?;
        decode_first(rows)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .session
            .execute(&id_statement(
                "DELETE FROM user_books WHERE id = $1 RETURNING id".to_string(),
                id,
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Shelf size, per-status counts and average personal rating
    pub async fn stats(&self, user_id: i64) -> Result<ShelfStats> {
        let totals = self
            .session
            .execute(&id_statement(
                "SELECT COUNT(*) AS total, AVG(rating) AS average_rating
                 FROM user_books WHERE user_id = $1"
                    .to_string(),
                user_id,
            ))
            .await?;
        let (total, average_rating) = match totals.first() {
            Some(row) => (
                row.get::<Option<i64>>("total")?.unwrap_or(0),
                row.get::<Option<f64>>("average_rating")?,
            ),
            None => (0, None),
        };

        let statuses = self
            .session
            .execute(&id_statement(
                "SELECT status, COUNT(*) AS count
                 FROM user_books WHERE user_id = $1
                 GROUP BY status"
                    .to_string(),
                user_id,
            ))
            .await?;
        let mut by_status = BTreeMap::new();
        for row in &statuses {
            by_status.insert(row.get::<ReadingStatus>("status")?, row.get::<i64>("count")?);
        }

        Ok(ShelfStats {
            user_id,
            total,
            by_status,
            average_rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use crate::{Provider, Row, SqlValue};
    use serde_json::json;

    const TS: &str = "2024-03-01T12:00:00+00:00";

    fn entry_row(id: i64, status: &str) -> Row {
        Row::new()
            .with("id", id)
            .with("user_id", 10)
            .with("book_id", 1)
            .with("status", status)
            .with("rating", json!(null))
            .with("notes", json!(null))
            .with("started_at", TS)
            .with("finished_at", json!(null))
            .with("created_at", TS)
            .with("updated_at", TS)
    }

    fn repo() -> (Arc<ScriptedSession>, UserBookRepository) {
        let session = Arc::new(ScriptedSession::new(Provider::EdgeHttp));
        (session.clone(), UserBookRepository::new(session))
    }

    #[tokio::test]
    async fn test_list_for_user_nests_book_and_author() {
        let (session, shelf) = repo();
        session.push_rows(vec![Row::new().with("total", 1)]);
        session.push_rows(vec![entry_row(1, "reading").with(
            "book",
            json!({
                "id": 1, "title": "X", "author_id": 7, "isbn": null, "genre": "Fiction",
                "published_year": null, "rating": null, "description": null,
                "created_at": TS, "updated_at": TS,
                "author": {
                    "id": 7, "name": "Ada", "bio": null, "nationality": null,
                    "birth_year": null, "created_at": TS, "updated_at": TS
                }
            }),
        )]);

        let page = shelf
            .list_for_user(10, Some(ReadingStatus::Reading), Pagination::default())
            .await
            .unwrap();
        let entry = &page.items[0];
        assert_eq!(entry.entry.status, ReadingStatus::Reading);
        assert_eq!(entry.book.book.title, "X");
        assert_eq!(entry.book.author.name, "Ada");

        let count = &session.statements()[0];
        assert!(count.sql.ends_with("WHERE ub.user_id = $1 AND ub.status = $2"));
        assert_eq!(count.params, vec![SqlValue::from(10_i64), SqlValue::from("reading")]);
    }

    #[tokio::test]
    async fn test_status_change_stamps_timestamps() {
        let (session, shelf) = repo();
        session.push_rows(vec![entry_row(4, "read")]);

        let update = UserBookUpdate {
            status: Some(ReadingStatus::Read),
            ..Default::default()
        };
        let entry = shelf.update(4, &update).await.unwrap().unwrap();
        assert_eq!(entry.status, ReadingStatus::Read);

        let statement = &session.statements()[0];
        assert!(statement.sql.contains("status = $1"));
        assert!(statement.sql.contains("COALESCE(ub.started_at"));
        assert!(statement.sql.contains("COALESCE(ub.finished_at, CASE WHEN $1 = 'read'"));
        assert!(statement.sql.contains("WHERE ub.id = $2"));
    }

    #[tokio::test]
    async fn test_rating_only_update_leaves_timestamps() {
        let (session, shelf) = repo();
        let update = UserBookUpdate {
            rating: Some(Some(4.0)),
            ..Default::default()
        };
        assert!(shelf.update(4, &update).await.unwrap().is_none());
        assert!(!session.statements()[0].sql.contains("started_at = "));
    }

    #[tokio::test]
    async fn test_stats_groups_by_status() {
        let (session, shelf) = repo();
        session.push_rows(vec![Row::new().with("total", 3).with("average_rating", json!(null))]);
        session.push_rows(vec![
            Row::new().with("status", "read").with("count", 2),
            Row::new().with("status", "want_to_read").with("count", 1),
        ]);

        let stats = shelf.stats(10).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get(&ReadingStatus::Read), Some(&2));
        assert_eq!(stats.by_status.get(&ReadingStatus::Reading), None);
        assert_eq!(stats.average_rating, None);
    }
}
