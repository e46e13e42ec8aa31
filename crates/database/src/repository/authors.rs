//! Author queries

use super::{grouped_counts, id_statement, order_by, scalar_count, text_filter};
use crate::models::{Author, AuthorBookCount, AuthorFilter, AuthorSort, AuthorStats, AuthorUpdate, NewAuthor};
use crate::projection::AUTHOR_COLUMNS;
use crate::query::{Assignments, Conditions, Page, Pagination, SortDirection};
use crate::session::{decode_all, decode_first, Session, Statement};
use crate::{DbError, IntegrityRefusal, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of authors listed in [`AuthorStats::most_productive`].
pub const MOST_PRODUCTIVE_LIMIT: u32 = 5;

#[derive(Clone)]
pub struct AuthorRepository {
    session: Arc<dyn Session>,
}

impl AuthorRepository {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    /// Get an author by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Author>> {
        let sql = format!("SELECT {} FROM authors a WHERE a.id = $1", AUTHOR_COLUMNS);
        let rows = self.session.execute(&id_statement(sql, id)).await?;
        decode_first(rows)
    }

    /// Filtered, paginated author search
    pub async fn search(
        &self,
        filter: &AuthorFilter,
        pagination: Pagination,
        sort: AuthorSort,
        direction: SortDirection,
    ) -> Result<Page<Author>> {
        let mut conditions = Conditions::new();
        if let Some(name) = text_filter(&filter.name) {
            conditions.push_contains(&["a.name"], name);
        }
        if let Some(nationality) = text_filter(&filter.nationality) {
            conditions.push("LOWER(a.nationality) = LOWER({})", nationality);
        }
        let where_sql = conditions.where_sql();

        let count = Statement::new(format!("SELECT COUNT(*) AS total FROM authors a{}", where_sql))
            .with_params(conditions.params());
        let total = scalar_count(self.session.as_ref(), &count, "total").await?;

        let sort_column = match sort {
            AuthorSort::Name => "a.name",
            AuthorSort::BirthYear => "a.birth_year",
            AuthorSort::CreatedAt => "a.created_at",
        };
        let limit = conditions.bind_extra(pagination.limit());
        let offset = conditions.bind_extra(pagination.offset());
        let sql = format!(
            "SELECT {} FROM authors a{}{} LIMIT {} OFFSET {}",
            AUTHOR_COLUMNS,
            where_sql,
            order_by(sort_column, direction, "a.id"),
            limit,
            offset
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(conditions.params()))
            .await?;
        Ok(Page::new(decode_all(rows)?, total, pagination))
    }

    /// Create a new author
    pub async fn create(&self, author: &NewAuthor) -> Result<Author> {
        let sql = format!(
            "INSERT INTO authors AS a (name, bio, nationality, birth_year)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            AUTHOR_COLUMNS
        );
        let statement = Statement::new(sql)
            .bind(&author.name)
            .bind(author.bio.clone())
            .bind(author.nationality.clone())
            .bind(author.birth_year);
        let rows = self.session.execute(&statement).await?;
        decode_first(rows)?.ok_or_else(|| DbError::Decode("INSERT returned no row".into()))
    }

    /// Apply a partial update; `None` if the author does not exist
    pub async fn update(&self, id: i64, update: &AuthorUpdate) -> Result<Option<Author>> {
        let mut sets = Assignments::new();
        if let Some(name) = &update.name {
            sets.set("name", name);
        }
        if let Some(bio) = &update.bio {
            sets.set("bio", bio.clone());
        }
        if let Some(nationality) = &update.nationality {
            sets.set("nationality", nationality.clone());
        }
        if let Some(birth_year) = update.birth_year {
            sets.set("birth_year", birth_year);
        }
        sets.raw("updated_at = now()");

        let id_placeholder = sets.bind_extra(id);
        let sql = format!(
            "UPDATE authors AS a SET {} WHERE a.id = {} RETURNING {}",
            sets.sql(),
            id_placeholder,
            AUTHOR_COLUMNS
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).with_params(sets.params()))
            .await?;
        decode_first(rows)
    }

    /// Delete an author that no book references.
    ///
    /// The guard and the delete are one statement; a book inserted
    /// concurrently is caught by the `RESTRICT` foreign key instead.
    /// Returns `Ok(false)` when the author does not exist and
    /// [`DbError::IntegrityRefusal`] while books still reference it.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let deleted = self
            .session
            .execute(&id_statement(
                "DELETE FROM authors a
                 WHERE a.id = $1
                   AND NOT EXISTS (SELECT 1 FROM books b WHERE b.author_id = a.id)
                 RETURNING a.id"
                    .to_string(),
                id,
            ))
            .await?;
        if !deleted.is_empty() {
            info!(author_id = id, "Deleted author");
            return Ok(true);
        }

        let rows = self
            .session
            .execute(&id_statement(
                "SELECT EXISTS (SELECT 1 FROM authors WHERE id = $1) AS present,
                        (SELECT COUNT(*) FROM books WHERE author_id = $1) AS dependents"
                    .to_string(),
                id,
            ))
            .await?;
        let Some(row) = rows.first() else {
            return Ok(false);
        };
        let present: bool = row.get::<Option<bool>>("present")?.unwrap_or(false);
        let dependents: i64 = row.get::<Option<i64>>("dependents")?.unwrap_or(0);

        if present && dependents > 0 {
            warn!(author_id = id, dependents, "Refusing to delete author with books");
            return Err(DbError::IntegrityRefusal(IntegrityRefusal {
                entity: "author",
                id,
                dependent_entity: "book",
                dependents,
            }));
        }
        Ok(false)
    }

    /// Authors ranked by number of books, then name, then id
    pub async fn most_productive(&self, limit: u32) -> Result<Vec<AuthorBookCount>> {
        let sql = format!(
            "SELECT {}, COUNT(b.id) AS book_count
             FROM authors a LEFT JOIN books b ON b.author_id = a.id
             GROUP BY a.id
             ORDER BY book_count DESC, a.name ASC, a.id ASC
             LIMIT $1",
            AUTHOR_COLUMNS
        );
        let rows = self
            .session
            .execute(&Statement::new(sql).bind(i64::from(limit.max(1))))
            .await?;
        decode_all(rows)
    }

    /// Totals, per-nationality counts and the most productive authors
    pub async fn stats(&self) -> Result<AuthorStats> {
        let total = scalar_count(
            self.session.as_ref(),
            &Statement::new("SELECT COUNT(*) AS total FROM authors"),
            "total",
        )
        .await?;

        let nationalities = self
            .session
            .execute(&Statement::new(
                "SELECT COALESCE(nationality, 'Unknown') AS nationality, COUNT(*) AS count
                 FROM authors GROUP BY 1 ORDER BY 1",
            ))
            .await?;

        Ok(AuthorStats {
            total,
            by_nationality: grouped_counts(&nationalities, "nationality")?,
            most_productive: self.most_productive(MOST_PRODUCTIVE_LIMIT).await?,
        })
    }
}
