//! Bundled schema migrations

use crate::ledger::MigrationFile;

/// Migrations shipped with the crate, in apply order.
pub fn bundled_migrations() -> Vec<MigrationFile> {
    vec![MigrationFile::new("0001_baseline", BASELINE)]
}

const BASELINE: &str = r#"
-- Authors table
CREATE TABLE IF NOT EXISTS authors (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    bio TEXT,
    nationality TEXT,
    birth_year INTEGER,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
--> statement-breakpoint

-- Books table; an author cannot be deleted while books reference it
CREATE TABLE IF NOT EXISTS books (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    author_id BIGINT NOT NULL REFERENCES authors(id) ON DELETE RESTRICT,
    isbn TEXT UNIQUE,
    genre TEXT,
    published_year INTEGER,
    rating DOUBLE PRECISION CHECK (rating IS NULL OR (rating >= 0 AND rating <= 5)),
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
--> statement-breakpoint

-- Shelf entries
CREATE TABLE IF NOT EXISTS user_books (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    book_id BIGINT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'want_to_read'
        CHECK (status IN ('want_to_read', 'reading', 'read')),
    rating DOUBLE PRECISION CHECK (rating IS NULL OR (rating >= 0 AND rating <= 5)),
    notes TEXT,
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE(user_id, book_id)
);
--> statement-breakpoint

CREATE INDEX IF NOT EXISTS idx_books_author ON books(author_id);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_books_rating ON books(rating DESC, created_at DESC);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_authors_name ON authors(name);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_user_books_user ON user_books(user_id, status);
"#;
