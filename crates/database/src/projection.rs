//! Named row shapes reused by every query that needs them.
//!
//! Aliases are fixed: `a` for authors, `b` for books, `ub` for user_books.

pub const AUTHOR_COLUMNS: &str =
    "a.id, a.name, a.bio, a.nationality, a.birth_year, a.created_at, a.updated_at";

pub const BOOK_COLUMNS: &str = "b.id, b.title, b.author_id, b.isbn, b.genre, b.published_year, \
     b.rating, b.description, b.created_at, b.updated_at";

pub const USER_BOOK_COLUMNS: &str = "ub.id, ub.user_id, ub.book_id, ub.status, ub.rating, ub.notes, \
     ub.started_at, ub.finished_at, ub.created_at, ub.updated_at";

/// Books with their author; the inner join drops books whose author is
/// missing rather than returning them without one.
pub const BOOK_WITH_AUTHOR_FROM: &str = "books b INNER JOIN authors a ON a.id = b.author_id";

pub const USER_BOOK_ENTRY_FROM: &str = "user_books ub \
     INNER JOIN books b ON b.id = ub.book_id \
     INNER JOIN authors a ON a.id = b.author_id";

/// Author row as a JSON object.
pub const AUTHOR_JSON: &str = "json_build_object(\
     'id', a.id, 'name', a.name, 'bio', a.bio, 'nationality', a.nationality, \
     'birth_year', a.birth_year, 'created_at', a.created_at, 'updated_at', a.updated_at)";

/// `SELECT` list for the book-with-author shape.
pub fn book_with_author_columns() -> String {
    format!("{}, {} AS author", BOOK_COLUMNS, AUTHOR_JSON)
}

/// `SELECT` list for a shelf entry with its book and author nested.
pub fn user_book_entry_columns() -> String {
    format!(
        "{}, json_build_object(\
         'id', b.id, 'title', b.title, 'author_id', b.author_id, 'isbn', b.isbn, \
         'genre', b.genre, 'published_year', b.published_year, 'rating', b.rating, \
         'description', b.description, 'created_at', b.created_at, 'updated_at', b.updated_at, \
         'author', {}) AS book",
        USER_BOOK_COLUMNS, AUTHOR_JSON
    )
}
