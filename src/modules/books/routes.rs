use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use libris_http::error::AppError;
use uuid::Uuid;

use super::models::{Book, CreateBook, Deleted, SearchBooks, UpdateBook};
use super::{service, BooksState};

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/", get(list_books).post(create_book))
        .route("/books/search", get(search_books))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/books/{id}/checkout", post(checkout_book))
        .route("/books/{id}/checkin", post(checkin_book))
        .with_state(state)
}

type BookId = Result<Path<Uuid>, PathRejection>;

async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let Json(input) = payload?;
    let book = service::create(&state, input).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn list_books(State(state): State<BooksState>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(service::list(&state).await?))
}

async fn search_books(
    State(state): State<BooksState>,
    filter: Result<Query<SearchBooks>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(service::search(&state, &filter).await?))
}

async fn get_book(State(state): State<BooksState>, id: BookId) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    Ok(Json(service::get(&state, id).await?))
}

async fn update_book(
    State(state): State<BooksState>,
    id: BookId,
    payload: Result<Json<UpdateBook>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    let Json(update) = payload?;
    Ok(Json(service::update(&state, id, update).await?))
}

async fn delete_book(State(state): State<BooksState>, id: BookId) -> Result<Json<Deleted>, AppError> {
    let Path(id) = id?;
    service::delete(&state, id).await?;
    Ok(Json(Deleted::book()))
}

async fn checkout_book(State(state): State<BooksState>, id: BookId) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    Ok(Json(service::checkout(&state, id).await?))
}

async fn checkin_book(State(state): State<BooksState>, id: BookId) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    Ok(Json(service::checkin(&state, id).await?))
}
