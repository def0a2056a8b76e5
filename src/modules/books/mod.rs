pub mod models;
pub mod repository;
pub mod routes;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use libris_db::Database;
use libris_genai::TextGenerator;
use libris_kernel::{InitCtx, Migration, Module};
use serde_json::json;

/// Dependencies shared by every books handler.
#[derive(Clone)]
pub struct BooksState {
    pub db: Database,
    pub generator: Arc<dyn TextGenerator>,
}

/// Book catalog module: CRUD, checkout/checkin, and search over `books`.
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(db: Database, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            state: BooksState { db, generator },
        }
    }

    pub(crate) fn schema() -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    id          BLOB PRIMARY KEY NOT NULL,
                    title       TEXT NOT NULL CHECK (title <> ''),
                    author      TEXT NOT NULL CHECK (author <> ''),
                    year        INTEGER,
                    genre       TEXT,
                    isbn        TEXT,
                    available   BOOLEAN NOT NULL DEFAULT 1,
                    description TEXT,
                    embedding   TEXT NOT NULL DEFAULT '[]',
                    -- lowercase copies searched by /books/search
                    title_fold  TEXT NOT NULL,
                    author_fold TEXT NOT NULL,
                    genre_fold  TEXT,
                    isbn_fold   TEXT
                );
                CREATE INDEX IF NOT EXISTS books_author_idx ON books (author);
                "#,
        }]
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            generator = self.state.generator.name(),
            dimensions = self.state.generator.dimensions(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        Self::schema()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn book_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Book" }
            }
        }
    })
}

fn book_list_response() -> serde_json::Value {
    json!({
        "description": "List of books",
        "content": {
            "application/json": {
                "schema": {
                    "type": "array",
                    "items": { "$ref": "#/components/schemas/Book" }
                }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "string", "format": "uuid" }
    })
}

fn json_body(schema: &str) -> serde_json::Value {
    json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{}", schema) }
            }
        }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let search_parameters: Vec<serde_json::Value> = [
        ("title", "string"),
        ("author", "string"),
        ("genre", "string"),
        ("isbn", "string"),
        ("year", "integer"),
        ("available", "boolean"),
    ]
    .into_iter()
    .map(|(name, ty)| json!({"name": name, "in": "query", "required": false, "schema": {"type": ty}}))
    .collect();

    json!({
        "paths": {
            "/books/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "responses": { "200": book_list_response() }
                },
                "post": {
                    "summary": "Create a book, generating a description if none is given",
                    "tags": ["Books"],
                    "requestBody": json_body("CreateBook"),
                    "responses": {
                        "201": book_response("Created book"),
                        "422": error_response("Validation error"),
                        "502": error_response("Description or embedding generation failed")
                    }
                }
            },
            "/books/search": {
                "get": {
                    "summary": "Search books; all supplied filters must match",
                    "tags": ["Books"],
                    "parameters": search_parameters,
                    "responses": { "200": book_list_response() }
                }
            },
            "/books/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": book_response("Book"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Update the supplied fields of a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": json_body("UpdateBook"),
                    "responses": {
                        "200": book_response("Updated book"),
                        "404": error_response("Book not found"),
                        "422": error_response("Validation error")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": {
                            "description": "Deleted",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "detail": { "type": "string" } }
                                    }
                                }
                            }
                        },
                        "404": error_response("Book not found")
                    }
                }
            },
            "/books/{id}/checkout": {
                "post": {
                    "summary": "Check a book out",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": book_response("Checked-out book"),
                        "400": error_response("Book is already checked out"),
                        "404": error_response("Book not found")
                    }
                }
            },
            "/books/{id}/checkin": {
                "post": {
                    "summary": "Check a book in",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": book_response("Checked-in book"),
                        "400": error_response("Book is already checked in"),
                        "404": error_response("Book not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "year": { "type": ["integer", "null"] },
                        "genre": { "type": ["string", "null"] },
                        "isbn": { "type": ["string", "null"] },
                        "description": { "type": ["string", "null"] },
                        "available": { "type": "boolean" }
                    },
                    "required": ["id", "title", "author", "available"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "year": { "type": "integer" },
                        "genre": { "type": "string", "default": models::DEFAULT_GENRE },
                        "isbn": { "type": "string", "default": models::DEFAULT_ISBN },
                        "description": { "type": "string" }
                    },
                    "required": ["title", "author"]
                },
                "UpdateBook": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "year": { "type": ["integer", "null"] },
                        "genre": { "type": ["string", "null"] },
                        "isbn": { "type": ["string", "null"] },
                        "description": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}

/// Create a new instance of the books module
pub fn create_module(db: Database, generator: Arc<dyn TextGenerator>) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(db, generator))
}
