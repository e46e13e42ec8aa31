//! Database models for Bookbase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A book author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
    pub nationality: Option<String>,
    pub birth_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A book; `author_id` always points at an existing author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    /// 0.0 to 5.0
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A book joined with its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookWithAuthor {
    #[serde(flatten)]
    pub book: Book,
    pub author: Author,
}

/// Where a book sits on a user's shelf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    WantToRead,
    Reading,
    Read,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Read => "read",
        }
    }
}

/// A user's relationship to a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBook {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub status: ReadingStatus,
    pub rating: Option<f64>,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shelf entry with the book and its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBookEntry {
    #[serde(flatten)]
    pub entry: UserBook,
    pub book: BookWithAuthor,
}

/// Input for creating a new author
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAuthor {
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub birth_year: Option<i32>,
}

/// Partial author update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub nationality: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_year: Option<Option<i32>>,
}

/// Input for creating a new book
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author_id: i64,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial book update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub isbn: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub genre: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub published_year: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub rating: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

/// Input for putting a book on a user's shelf
#[derive(Debug, Clone, Deserialize)]
pub struct NewUserBook {
    pub user_id: i64,
    pub book_id: i64,
    #[serde(default = "default_status")]
    pub status: ReadingStatus,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_status() -> ReadingStatus {
    ReadingStatus::WantToRead
}

/// Partial shelf entry update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserBookUpdate {
    #[serde(default)]
    pub status: Option<ReadingStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub rating: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

/// Book search filters; unset filters are left out of the query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
    /// Substring of the title
    pub title: Option<String>,
    pub author_id: Option<i64>,
    /// Substring of the author's name
    pub author_name: Option<String>,
    pub genre: Option<String>,
    pub min_rating: Option<f64>,
    pub published_after: Option<i32>,
    pub published_before: Option<i32>,
    /// Substring of title, description or author name
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    Title,
    Rating,
    PublishedYear,
    #[default]
    CreatedAt,
}

/// Author search filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorFilter {
    pub name: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorSort {
    #[default]
    Name,
    BirthYear,
    CreatedAt,
}

/// Aggregate book statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStats {
    pub total: i64,
    pub by_genre: BTreeMap<String, i64>,
    pub average_rating: Option<f64>,
    pub rated: i64,
}

/// An author with the number of books they wrote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorBookCount {
    #[serde(flatten)]
    pub author: Author,
    pub book_count: i64,
}

/// Aggregate author statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorStats {
    pub total: i64,
    pub by_nationality: BTreeMap<String, i64>,
    pub most_productive: Vec<AuthorBookCount>,
}

/// Aggregate statistics for one user's shelf
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfStats {
    pub user_id: i64,
    pub total: i64,
    pub by_status: BTreeMap<ReadingStatus, i64>,
    pub average_rating: Option<f64>,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
