//! Book queries

use super::{grouped_counts, id_statement, order_by, scalar_count, text_filter};
use crate::models::{Book, BookFilter, BookSort, BookStats, BookUpdate, BookWithAuthor, NewBook};
use crate::projection::{book_with_author_columns, BOOK_COLUMNS, BOOK_WITH_AUTHOR_FROM};
use crate::query::{Assignments, Conditions, Page, Pagination, SortDirection};
use crate::session::{decode_all, decode_first, Session, Statement};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct BookRepository {
    session: Arc<dyn Session>,
}

impl BookRepository {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    /// Get a book by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Book>> {
        let sql = format!("SELECT {} FROM books b WHERE b.id = $1", BOOK_COLUMNS);
        let rows = self.session.execute(&id_statement(sql, id)).await?;
        decode_first(rows)
    }

    /// Get a book with its author nested
    pub async fn find_with_author(&self, id: i64) -> Result<Option<BookWithAuthor>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE b.id = $1",
            book_with_author_columns(),
            BOOK_WITH_AUTHOR_FROM
        );
        let rows = self.session.execute(&id_statement(sql, id)).await?;
        decode_first(rows)
    }

    /// Filtered, paginated search over books joined with their authors
    pub async fn search(
        &self,
        filter: &BookFilter,
        pagination: Pagination,
        sort: BookSort,
        direction: SortDirection,
    ) -> Result<Page<BookWithAuthor>> {
        let mut conditions = Self::conditions(filter);
        let where_sql = conditions.where_sql();

        let count = Statement::new(format!(
            "SELECT COUNT(*) AS total FROM {}{}",
            BOOK_WITH_AUTHOR_FROM, where_sql
        ))
        .with_params(conditions.params());
        let total = scalar_count(self.session.as_ref(), &count, "total").await?;

        let limit = conditions.bind_extra(pagination.limit());
        let offset = conditions.bind_extra(pagination.offset());
        let sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            book_with_author_columns(),
            BOOK_WITH_AUTHOR_FROM,
            where_sql,
            order_by(Self::sort_column(sort), direction, "b.id"),
            limit,
            offset
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(conditions.params()))
            .await?;

        debug!(total, page = pagination.normalized().page, "Book search");
        Ok(Page::new(decode_all(rows)?, total, pagination))
    }

    /// Create a new book
    pub async fn create(&self, book: &NewBook) -> Result<Book> {
        let sql = format!(
            "INSERT INTO books AS b
             (title, author_id, isbn, genre, published_year, rating, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            BOOK_COLUMNS
        );
        let statement = Statement::new(sql)
            .bind(&book.title)
            .bind(book.author_id)
            .bind(book.isbn.clone())
            .bind(book.genre.clone())
            .bind(book.published_year)
            .bind(book.rating)
            .bind(book.description.clone());
        let rows = self.session.execute(&statement).await?;
        decode_first(rows)?.ok_or_else(|| crate::DbError::Decode("INSERT returned no row".into()))
    }

    /// Apply a partial update; `None` if the book does not exist
    pub async fn update(&self, id: i64, update: &BookUpdate) -> Result<Option<Book>> {
        let mut sets = Assignments::new();
        if let Some(title) = &update.title {
            sets.set("title", title);
        }
        if let Some(author_id) = update.author_id {
            sets.set("author_id", author_id);
        }
        if let Some(isbn) = &update.isbn {
            sets.set("isbn", isbn.clone());
        }
        if let Some(genre) = &update.genre {
            sets.set("genre", genre.clone());
        }
        if let Some(year) = update.published_year {
            sets.set("published_year", year);
        }
        if let Some(rating) = update.rating {
            sets.set("rating", rating);
        }
        if let Some(description) = &update.description {
            sets.set("description", description.clone());
        }
        sets.raw("updated_at = now()");

        let id_placeholder = sets.bind_extra(id);
        let sql = format!(
            "UPDATE books AS b SET {} WHERE b.id = {} RETURNING {}",
            sets.sql(),
            id_placeholder,
            BOOK_COLUMNS
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(sets.params()))
            .await?;
        decode_first(rows)
    }

    /// Delete a book; `false` if it did not exist
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .session
            .execute(&id_statement(
                "DELETE FROM books WHERE id = $1 RETURNING id".to_string(),
                id,
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Totals, per-genre counts and rating average
    pub async fn stats(&self) -> Result<BookStats> {
        let totals = self
            .session
            .execute(&Statement::new(
                "SELECT COUNT(*) AS total, COUNT(rating) AS rated, AVG(rating) AS average_rating
                 FROM books",
            ))
            .await?;
        let (total, rated, average_rating) = match totals.first() {
            Some(row) => (
                row.get::<Option<i64>>("total")?.unwrap_or(0),
                row.get::<Option<i64>>("rated")?.unwrap_or(0),
                row.get::<Option<f64>>("average_rating")?,
            ),
            None => (0, 0, None),
        };

        let genres = self
            .session
            .execute(&Statement::new(
                "SELECT COALESCE(genre, 'Uncategorized') AS genre, COUNT(*) AS count
                 FROM books GROUP BY 1 ORDER BY 1",
            ))
            .await?;

        Ok(BookStats {
            total,
            by_genre: grouped_counts(&genres, "genre")?,
            average_rating,
            rated,
        })
    }

    /// Highest rated books, newest first among equal ratings
    pub async fn featured(&self, limit: u32) -> Result<Vec<BookWithAuthor>> {
        let sql = format!(
            "SELECT {} FROM {}
             WHERE b.rating IS NOT NULL
             ORDER BY b.rating DESC, b.created_at DESC, b.id DESC
             LIMIT $1",
            book_with_author_columns(),
            BOOK_WITH_AUTHOR_FROM
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).bind(i64::from(limit.max(1))))
            .await?;
        decode_all(rows)
    }

    fn conditions(filter: &BookFilter) -> Conditions {
        let mut c = Conditions::new();
        if let Some(title) = text_filter(&filter.title) {
            c.push_contains(&["b.title"], title);
        }
        if let Some(author_id) = filter.author_id {
            c.push("b.author_id = {}", author_id);
        }
        if let Some(name) = text_filter(&filter.author_name) {
            c.push_contains(&["a.name"], name);
        }
        if let Some(genre) = text_filter(&filter.genre) {
            c.push("LOWER(b.genre) = LOWER({})", genre);
        }
        if let Some(min) = filter.min_rating {
            c.push("b.rating >= {}", min);
        }
        if let Some(after) = filter.published_after {
            c.push("b.published_year >= {}", after);
        }
        if let Some(before) = filter.published_before {
            c.push("b.published_year <= {}", before);
        }
        if let Some(term) = text_filter(&filter.query) {
            c.push_contains(&["b.title", "b.description", "a.name"], term);
        }
        c
    }

    fn sort_column(sort: BookSort) -> &'static str {
        match sort {
            BookSort::Title => "b.title",
            BookSort::Rating => "b.rating",
            BookSort::PublishedYear => "b.published_year",
            BookSort::CreatedAt => "b.created_at",
        }
    }
}
