use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use libris_app::app::{apply_migrations, build_registry};
use libris_db::Database;
use libris_genai::{GenAiError, LocalGenerator, TextGenerator};
use libris_kernel::settings::Settings;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const DIMENSIONS: usize = 16;

struct Harness {
    router: Router,
    db: Database,
}

async fn harness_with(generator: Arc<dyn TextGenerator>) -> Harness {
    let db = Database::connect_in_memory().await.unwrap();
    harness_on(db, generator).await
}

async fn harness_on(db: Database, generator: Arc<dyn TextGenerator>) -> Harness {
    let registry = build_registry(&db, generator);
    apply_migrations(&registry, &db).await.unwrap();
    let router = libris_http::build_router(&registry, &Settings::default());
    Harness { router, db }
}

async fn harness() -> Harness {
    harness_with(Arc::new(LocalGenerator::new(DIMENSIONS))).await
}

async fn send_to(
    router: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

impl Harness {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send_to(self.router.clone(), method, uri, body).await
    }

    async fn create(&self, body: Value) -> Value {
        let (status, book) = self.send(Method::POST, "/books/", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{book}");
        book
    }

    async fn stored_embedding(&self, id: &str) -> Vec<f32> {
        let id = Uuid::parse_str(id).unwrap();
        let raw: String = sqlx::query_scalar("SELECT embedding FROM books WHERE id = ?")
            .bind(id)
            .fetch_one(self.db.pool())
            .await
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    async fn count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}

/// Generator whose every call fails, as an unreachable provider would.
struct DownGenerator;

#[async_trait]
impl TextGenerator for DownGenerator {
    fn name(&self) -> &'static str {
        "down"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn describe_book(&self, _: &str, _: &str, _: &str) -> Result<String, GenAiError> {
        Err(GenAiError::Request {
            message: "connection refused".into(),
        })
    }

    async fn embed(&self, _: &str) -> Result<Vec<f32>, GenAiError> {
        Err(GenAiError::Request {
            message: "connection refused".into(),
        })
    }
}

#[tokio::test]
async fn create_fills_defaults_and_generates_description() {
    let h = harness().await;
    let book = h.create(json!({"title": "Dune", "author": "Herbert"})).await;

    assert_eq!(book["genre"], "general");
    assert_eq!(book["isbn"], "000-0000000000");
    assert_eq!(book["available"], true);
    assert!(!book["description"].as_str().unwrap().is_empty());
    assert!(book.get("embedding").is_none());

    let embedding = h.stored_embedding(book["id"].as_str().unwrap()).await;
    assert_eq!(embedding.len(), DIMENSIONS);
}

#[tokio::test]
async fn create_keeps_supplied_description() {
    let h = harness().await;
    let book = h
        .create(json!({
            "title": "Dune",
            "author": "Herbert",
            "year": 1965,
            "genre": "science fiction",
            "description": "Spice and sandworms."
        }))
        .await;

    assert_eq!(book["description"], "Spice and sandworms.");
    assert_eq!(book["genre"], "science fiction");
    assert_eq!(book["year"], 1965);
    assert_eq!(
        h.stored_embedding(book["id"].as_str().unwrap()).await.len(),
        DIMENSIONS
    );
}

#[tokio::test]
async fn create_without_author_is_rejected_before_generation() {
    let h = harness_with(Arc::new(DownGenerator)).await;

    let (status, body) = h
        .send(Method::POST, "/books/", Some(json!({"title": "Dune"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, body) = h
        .send(
            Method::POST,
            "/books/",
            Some(json!({"title": "Dune", "author": "  "})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "author");
    assert_eq!(h.count().await, 0);
}

#[tokio::test]
async fn generator_failure_writes_nothing() {
    let h = harness_with(Arc::new(DownGenerator)).await;

    let (status, body) = h
        .send(
            Method::POST,
            "/books/",
            Some(json!({"title": "Dune", "author": "Herbert"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_error");

    // A supplied description still needs an embedding
    let (status, _) = h
        .send(
            Method::POST,
            "/books/",
            Some(json!({"title": "Dune", "author": "Herbert", "description": "Spice."})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(h.count().await, 0);
}

#[tokio::test]
async fn get_list_and_delete() {
    let h = harness().await;
    let dune = h.create(json!({"title": "Dune", "author": "Herbert"})).await;
    h.create(json!({"title": "Emma", "author": "Austen"})).await;
    let id = dune["id"].as_str().unwrap();

    let (status, fetched) = h.send(Method::GET, &format!("/books/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, dune);

    let (status, all) = h.send(Method::GET, "/books/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, ack) = h.send(Method::DELETE, &format!("/books/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({"detail": "Book deleted successfully"}));

    let (status, _) = h.send(Method::GET, &format!("/books/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, all) = h.send(Method::GET, "/books", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = harness().await;
    let missing = format!("/books/{}", Uuid::now_v7());

    for (method, uri) in [
        (Method::GET, missing.clone()),
        (Method::DELETE, missing.clone()),
        (Method::POST, format!("{missing}/checkout")),
        (Method::POST, format!("{missing}/checkin")),
    ] {
        let (status, body) = h.send(method.clone(), &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(body["error"]["code"], "not_found");
    }

    let (status, _) = h
        .send(Method::PUT, &missing, Some(json!({"title": "Ghost"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_id_is_a_validation_error() {
    let h = harness().await;
    let (status, body) = h.send(Method::GET, "/books/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["source"], "path");
}

#[tokio::test]
async fn checkout_checkin_state_machine() {
    let h = harness().await;
    let book = h.create(json!({"title": "Dune", "author": "Herbert"})).await;
    let id = book["id"].as_str().unwrap();
    let checkout = format!("/books/{id}/checkout");
    let checkin = format!("/books/{id}/checkin");

    let (status, body) = h.send(Method::POST, &checkin, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "already_checked_in");

    let (status, body) = h.send(Method::POST, &checkout, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (status, body) = h.send(Method::POST, &checkout, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "already_checked_out");

    let (status, body) = h.send(Method::POST, &checkin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn partial_update_touches_only_supplied_fields() {
    let h = harness().await;
    let book = h
        .create(json!({
            "title": "Dune",
            "author": "Herbert",
            "year": 1965,
            "isbn": "978-0441013593"
        }))
        .await;
    let id = book["id"].as_str().unwrap();
    h.send(Method::POST, &format!("/books/{id}/checkout"), None)
        .await;
    let embedding_before = h.stored_embedding(id).await;

    let (status, updated) = h
        .send(
            Method::PUT,
            &format!("/books/{id}"),
            Some(json!({"title": "Dune Messiah"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Dune Messiah");
    assert_eq!(updated["author"], "Herbert");
    assert_eq!(updated["year"], 1965);
    assert_eq!(updated["genre"], "general");
    assert_eq!(updated["isbn"], "978-0441013593");
    assert_eq!(updated["available"], false);
    assert_eq!(updated["description"], book["description"]);

    let (status, cleared) = h
        .send(
            Method::PUT,
            &format!("/books/{id}"),
            Some(json!({"description": null, "year": null})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["description"], Value::Null);
    assert_eq!(cleared["year"], Value::Null);
    assert_eq!(h.stored_embedding(id).await, embedding_before);
}

#[tokio::test]
async fn update_rejects_availability_and_blank_title() {
    let h = harness().await;
    let book = h.create(json!({"title": "Dune", "author": "Herbert"})).await;
    let uri = format!("/books/{}", book["id"].as_str().unwrap());

    let (status, _) = h
        .send(Method::PUT, &uri, Some(json!({"available": false})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = h.send(Method::PUT, &uri, Some(json!({"title": ""}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "title");

    let (_, unchanged) = h.send(Method::GET, &uri, None).await;
    assert_eq!(unchanged, book);
}

#[tokio::test]
async fn search_composes_filters() {
    let h = harness().await;
    let nineteen = h
        .create(json!({"title": "Nineteen Eighty-Four", "author": "George Orwell", "year": 1949}))
        .await;
    let farm = h
        .create(json!({"title": "Animal Farm", "author": "George Orwell", "year": 1945}))
        .await;
    h.create(json!({"title": "Brave New World", "author": "Aldous Huxley", "year": 1932, "genre": "dystopia"}))
        .await;
    h.send(
        Method::POST,
        &format!("/books/{}/checkout", farm["id"].as_str().unwrap()),
        None,
    )
    .await;

    let (status, hits) = h
        .send(Method::GET, "/books/search?author=Orwell&available=true", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], nineteen["id"]);

    let (_, hits) = h.send(Method::GET, "/books/search?author=orwell", None).await;
    assert_eq!(hits.as_array().unwrap().len(), 2);

    let (_, hits) = h.send(Method::GET, "/books/search?genre=DYSTOP&year=1932", None).await;
    assert_eq!(hits.as_array().unwrap().len(), 1);

    let (_, hits) = h.send(Method::GET, "/books/search?year=1932&author=Orwell", None).await;
    assert!(hits.as_array().unwrap().is_empty());

    let (_, hits) = h.send(Method::GET, "/books/search", None).await;
    assert_eq!(hits.as_array().unwrap().len(), 3);

    let (status, _) = h.send(Method::GET, "/books/search?year=soon", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn openapi_lists_book_routes() {
    let h = harness().await;
    let (status, doc) = h.send(Method::GET, "/docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/books/{id}/checkout"]["post"].is_object());
    assert!(doc["components"]["schemas"]["Book"].is_object());
}

#[tokio::test]
async fn search_matches_accented_titles_regardless_of_case() {
    let h = harness().await;
    let elan = h
        .create(json!({"title": "Élan Vital", "author": "Bergson"}))
        .await;

    for query in ["title=%C3%A9lan", "title=%C3%89LAN", "author=BERGSON"] {
        let (status, hits) = h
            .send(Method::GET, &format!("/books/search?{query}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let hits = hits.as_array().unwrap();
        assert_eq!(hits.len(), 1, "{query}");
        assert_eq!(hits[0]["id"], elan["id"]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_on_a_file_store_all_complete() {
    let path = std::env::temp_dir().join(format!("libris-concurrency-{}.db", Uuid::now_v7()));
    let db = Database::connect(&format!("sqlite://{}", path.display()), 5)
        .await
        .unwrap();
    let h = harness_on(db, Arc::new(LocalGenerator::new(DIMENSIONS))).await;

    let mut ids = Vec::new();
    for n in 0..40 {
        let book = h
            .create(json!({"title": format!("Volume {n}"), "author": "Anonymous"}))
            .await;
        ids.push(book["id"].as_str().unwrap().to_string());
    }

    let mut tasks = tokio::task::JoinSet::new();
    for (n, id) in ids.iter().enumerate() {
        let router = h.router.clone();
        let (method, uri, body) = if n % 2 == 0 {
            (Method::POST, format!("/books/{id}/checkout"), None)
        } else {
            (
                Method::PUT,
                format!("/books/{id}"),
                Some(json!({"genre": "serial"})),
            )
        };
        tasks.spawn(async move { send_to(router, method, &uri, body).await });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.unwrap();
        if status != StatusCode::OK {
            failures.push((status, body));
        }
    }
    assert!(failures.is_empty(), "{failures:?}");

    let (_, out) = h
        .send(Method::GET, "/books/search?available=false", None)
        .await;
    assert_eq!(out.as_array().unwrap().len(), 20);
    let (_, serial) = h.send(Method::GET, "/books/search?genre=serial", None).await;
    assert_eq!(serial.as_array().unwrap().len(), 20);

    // Racing checkins of one checked-out book: exactly one wins
    let contested = format!("/books/{}/checkin", ids[0]);
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let router = h.router.clone();
        let uri = contested.clone();
        tasks.spawn(async move { send_to(router, Method::POST, &uri, None).await.0 });
    }
    let mut statuses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        statuses.push(joined.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::BAD_REQUEST)
            .count(),
        9
    );

    h.db.close().await;
    let _ = std::fs::remove_file(&path);
}
