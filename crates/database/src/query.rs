//! Predicate building, pagination and ordering shared by the repositories.

use crate::session::SqlValue;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Page number and size clamped to valid bounds.
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.normalized().per_page)
    }

    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let p = pagination.normalized();
        let total_pages = if total <= 0 {
            0
        } else {
            ((total - 1) / i64::from(p.per_page) + 1) as u32
        };
        Self {
            items,
            total,
            page: p.page,
            per_page: p.per_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// `AND`-joined predicate with positional parameters. Only filters that are
/// pushed appear in the generated clause.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause; every `{}` in `template` becomes the placeholder for
    /// `value`.
    pub fn push(&mut self, template: &str, value: impl Into<SqlValue>) -> &mut Self {
        let placeholder = self.next_placeholder();
        self.clauses.push(template.replace("{}", &placeholder));
        self.params.push(value.into());
        self
    }

    /// Add a case-insensitive substring match on any of `columns`.
    pub fn push_contains(&mut self, columns: &[&str], term: &str) -> &mut Self {
        let placeholder = self.next_placeholder();
        let alternatives: Vec<String> = columns
            .iter()
            .map(|c| format!("{} ILIKE {} ESCAPE '\\'", c, placeholder))
            .collect();
        let clause = if alternatives.len() == 1 {
            alternatives.into_iter().next().unwrap_or_default()
        } else {
            format!("({})", alternatives.join(" OR "))
        };
        self.clauses.push(clause);
        self.params.push(format!("%{}%", escape_like(term)).into());
        self
    }

    /// Placeholder the next bound value will use.
    pub fn next_placeholder(&self) -> String {
        format!("${}", self.params.len() + 1)
    }

    /// ` WHERE ...`, or an empty string when nothing was pushed.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<SqlValue> {
        self.params.clone()
    }

    /// Bind a trailing value that is not part of the predicate, such as
    /// LIMIT or OFFSET, and return its placeholder.
    pub fn bind_extra(&mut self, value: impl Into<SqlValue>) -> String {
        let placeholder = self.next_placeholder();
        self.params.push(value.into());
        placeholder
    }
}

/// `SET` list for partial updates.
#[derive(Debug, Clone, Default)]
pub struct Assignments {
    sets: Vec<String>,
    params: Vec<SqlValue>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = $n`
    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        let placeholder = self.bind_extra(value);
        self.sets.push(format!("{} = {}", column, placeholder));
        self
    }

    /// Assignment without a parameter, such as `updated_at = now()`.
    pub fn raw(&mut self, assignment: &str) -> &mut Self {
        self.sets.push(assignment.to_string());
        self
    }

    /// Bind a value and return its placeholder.
    pub fn bind_extra(&mut self, value: impl Into<SqlValue>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    pub fn sql(&self) -> String {
        self.sets.join(", ")
    }

    pub fn params(&self) -> Vec<SqlValue> {
        self.params.clone()
    }
}

/// Escape LIKE metacharacters so user input matches literally.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
