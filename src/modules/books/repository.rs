//! SQL access for the `books` table. Every function runs on the caller's
//! connection so handlers control the transaction boundary.
//!
//! Mutations lead with their write statement. A transaction that reads first
//! and writes later cannot upgrade its lock while another connection writes,
//! and SQLite fails it immediately instead of waiting.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::models::{BookRecord, SearchBooks, UpdateBook};

const COLUMNS: &str = "id, title, author, year, genre, isbn, available, description, embedding";

pub async fn insert(conn: &mut SqliteConnection, record: &BookRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO books (id, title, author, year, genre, isbn, available, description, embedding,
                            title_fold, author_fold, genre_fold, isbn_fold)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id)
    .bind(&record.title)
    .bind(&record.author)
    .bind(record.year)
    .bind(&record.genre)
    .bind(&record.isbn)
    .bind(record.available)
    .bind(&record.description)
    .bind(&record.embedding)
    .bind(fold(&record.title))
    .bind(fold(&record.author))
    .bind(record.genre.as_deref().map(fold))
    .bind(record.isbn.as_deref().map(fold))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<BookRecord>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM books");
    sqlx::query_as(&sql).fetch_all(conn).await
}

pub async fn fetch_one(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<BookRecord>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM books WHERE id = ?");
    sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Write the supplied fields of `changes` and return the updated row.
///
/// `None` means no row has this id. `title` and `author` are only written
/// when they carry a value.
pub async fn update(
    conn: &mut SqliteConnection,
    id: Uuid,
    changes: &UpdateBook,
) -> Result<Option<BookRecord>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE books SET ");
    let mut touched = false;
    {
        let mut set = query.separated(", ");
        if let Some(Some(title)) = &changes.title {
            set.push("title = ").push_bind_unseparated(title.clone());
            set.push("title_fold = ").push_bind_unseparated(fold(title));
            touched = true;
        }
        if let Some(Some(author)) = &changes.author {
            set.push("author = ").push_bind_unseparated(author.clone());
            set.push("author_fold = ").push_bind_unseparated(fold(author));
            touched = true;
        }
        if let Some(year) = changes.year {
            set.push("year = ").push_bind_unseparated(year);
            touched = true;
        }
        if let Some(genre) = &changes.genre {
            set.push("genre = ").push_bind_unseparated(genre.clone());
            set.push("genre_fold = ")
                .push_bind_unseparated(genre.as_deref().map(fold));
            touched = true;
        }
        if let Some(isbn) = &changes.isbn {
            set.push("isbn = ").push_bind_unseparated(isbn.clone());
            set.push("isbn_fold = ")
                .push_bind_unseparated(isbn.as_deref().map(fold));
            touched = true;
        }
        if let Some(description) = &changes.description {
            set.push("description = ")
                .push_bind_unseparated(description.clone());
            touched = true;
        }
    }

    if !touched {
        return fetch_one(conn, id).await;
    }

    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {COLUMNS}"));
    query.build_query_as::<BookRecord>().fetch_optional(conn).await
}

/// Set `available` to `target` only if it currently differs.
///
/// `None` means the row is missing or already in the target state.
pub async fn set_available(
    conn: &mut SqliteConnection,
    id: Uuid,
    target: bool,
) -> Result<Option<BookRecord>, sqlx::Error> {
    let sql = format!(
        "UPDATE books SET available = ? WHERE id = ? AND available <> ? RETURNING {COLUMNS}"
    );
    sqlx::query_as(&sql)
        .bind(target)
        .bind(id)
        .bind(target)
        .fetch_optional(conn)
        .await
}

/// Returns false when no row had this id.
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Conjunctive filter scan. Text filters are case-insensitive substring
/// matches against the folded columns, with `%` and `_` taken literally.
pub async fn search(
    conn: &mut SqliteConnection,
    filter: &SearchBooks,
) -> Result<Vec<BookRecord>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {COLUMNS} FROM books WHERE 1 = 1"));

    let text_filters = [
        ("title_fold", &filter.title),
        ("author_fold", &filter.author),
        ("genre_fold", &filter.genre),
        ("isbn_fold", &filter.isbn),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            query
                .push(" AND ")
                .push(column)
                .push(" LIKE ")
                .push_bind(contains_pattern(&fold(value)))
                .push(" ESCAPE '\\'");
        }
    }

    if let Some(year) = filter.year {
        query.push(" AND year = ").push_bind(year);
    }
    if let Some(available) = filter.available {
        query.push(" AND available = ").push_bind(available);
    }

    query.build_query_as::<BookRecord>().fetch_all(conn).await
}

/// Unicode lowercase form stored beside each searchable column.
fn fold(value: &str) -> String {
    value.to_lowercase()
}

fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
