use libris_genai::GenAiError;
use libris_http::error::AppError;
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Book, BookRecord, CreateBook, SearchBooks, UpdateBook};
use super::{repository, BooksState};

#[derive(Debug, Error)]
pub enum BookError {
    #[error("book {0} not found")]
    NotFound(Uuid),

    #[error("book is already checked out")]
    AlreadyCheckedOut,

    #[error("book is already checked in")]
    AlreadyCheckedIn,

    #[error("invalid book input")]
    Invalid(Vec<serde_json::Value>),

    #[error("generator failed: {0}")]
    Generator(#[from] GenAiError),

    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::NotFound(_) => AppError::not_found("Book not found"),
            BookError::AlreadyCheckedOut => {
                AppError::bad_request("already_checked_out", "Book is already checked out")
            }
            BookError::AlreadyCheckedIn => {
                AppError::bad_request("already_checked_in", "Book is already checked in")
            }
            BookError::Invalid(details) => AppError::validation(details, "Invalid book"),
            BookError::Generator(e) => {
                tracing::warn!(error = %e, "book generator failed");
                AppError::upstream("Description or embedding generation failed")
            }
            BookError::Store(e) => AppError::Internal(anyhow::Error::new(e).context("book store")),
        }
    }
}

/// Fill defaults, generate what is missing, then insert in one transaction.
///
/// Generation happens before the transaction opens; a generator failure
/// writes nothing.
pub async fn create(state: &BooksState, input: CreateBook) -> Result<Book, BookError> {
    let new_book = input.into_new_book().map_err(BookError::Invalid)?;

    let description = match new_book.description {
        Some(description) => description,
        None => {
            tracing::debug!(
                generator = state.generator.name(),
                title = %new_book.title,
                "generating book description"
            );
            state
                .generator
                .describe_book(&new_book.title, &new_book.author, &new_book.genre)
                .await?
        }
    };
    let embedding = state.generator.embed(&description).await?;

    let record = BookRecord {
        id: Uuid::now_v7(),
        title: new_book.title,
        author: new_book.author,
        year: new_book.year,
        genre: Some(new_book.genre),
        isbn: Some(new_book.isbn),
        available: true,
        description: Some(description),
        embedding: Json(embedding),
    };

    let mut tx = state.db.begin().await?;
    repository::insert(&mut tx, &record).await?;
    tx.commit().await?;

    tracing::info!(book_id = %record.id, "book created");
    Ok(record.into())
}

pub async fn list(state: &BooksState) -> Result<Vec<Book>, BookError> {
    let mut tx = state.db.begin().await?;
    let records = repository::fetch_all(&mut tx).await?;
    tx.commit().await?;
    Ok(records.into_iter().map(Book::from).collect())
}

pub async fn get(state: &BooksState, id: Uuid) -> Result<Book, BookError> {
    let mut tx = state.db.begin().await?;
    let record = repository::fetch_one(&mut tx, id)
        .await?
        .ok_or(BookError::NotFound(id))?;
    tx.commit().await?;
    Ok(record.into())
}

pub async fn search(state: &BooksState, filter: &SearchBooks) -> Result<Vec<Book>, BookError> {
    let mut tx = state.db.begin().await?;
    let records = repository::search(&mut tx, filter).await?;
    tx.commit().await?;
    Ok(records.into_iter().map(Book::from).collect())
}

/// Apply only the supplied fields. Description and embedding are never regenerated.
pub async fn update(state: &BooksState, id: Uuid, update: UpdateBook) -> Result<Book, BookError> {
    update.validate().map_err(BookError::Invalid)?;

    let mut tx = state.db.begin().await?;
    let record = repository::update(&mut tx, id, &update)
        .await?
        .ok_or(BookError::NotFound(id))?;
    tx.commit().await?;

    tracing::info!(book_id = %id, "book updated");
    Ok(record.into())
}

pub async fn delete(state: &BooksState, id: Uuid) -> Result<(), BookError> {
    let mut tx = state.db.begin().await?;
    if !repository::delete(&mut tx, id).await? {
        return Err(BookError::NotFound(id));
    }
    tx.commit().await?;

    tracing::info!(book_id = %id, "book deleted");
    Ok(())
}

pub async fn checkout(state: &BooksState, id: Uuid) -> Result<Book, BookError> {
    set_availability(state, id, false).await
}

pub async fn checkin(state: &BooksState, id: Uuid) -> Result<Book, BookError> {
    set_availability(state, id, true).await
}

/// Flip `available` to `target`, refusing when it is already there.
async fn set_availability(state: &BooksState, id: Uuid, target: bool) -> Result<Book, BookError> {
    let mut tx = state.db.begin().await?;
    let Some(record) = repository::set_available(&mut tx, id, target).await? else {
        return Err(match repository::fetch_one(&mut tx, id).await? {
            None => BookError::NotFound(id),
            Some(_) if target => BookError::AlreadyCheckedIn,
            Some(_) => BookError::AlreadyCheckedOut,
        });
    };
    tx.commit().await?;

    tracing::info!(book_id = %id, available = target, "book availability changed");
    Ok(record.into())
}
