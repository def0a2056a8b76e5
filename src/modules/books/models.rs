use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use sqlx::types::Json;
use uuid::Uuid;

pub const DEFAULT_GENRE: &str = "general";
pub const DEFAULT_ISBN: &str = "000-0000000000";

/// A row of the `books` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BookRecord {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub available: bool,
    pub description: Option<String>,
    pub embedding: Json<Vec<f32>>,
}

/// Book as returned to clients. The embedding is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier for the book
    pub id: Uuid,
    /// Title of the book
    pub title: String,
    /// Author of the book
    pub author: String,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    /// False while the book is checked out
    pub available: bool,
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            author: record.author,
            year: record.year,
            genre: record.genre,
            isbn: record.isbn,
            description: record.description,
            available: record.available,
        }
    }
}

/// Request model for creating a new book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    /// Generated when absent or blank.
    #[serde(default)]
    pub description: Option<String>,
}

/// Validated creation input with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: Option<i32>,
    pub genre: String,
    pub isbn: String,
    pub description: Option<String>,
}

impl CreateBook {
    /// Validate required fields and apply the genre/isbn defaults.
    ///
    /// Blank optional strings count as absent.
    pub fn into_new_book(self) -> Result<NewBook, Vec<serde_json::Value>> {
        let mut details = Vec::new();
        require_text("title", Some(&self.title), &mut details);
        require_text("author", Some(&self.author), &mut details);
        if !details.is_empty() {
            return Err(details);
        }

        Ok(NewBook {
            title: self.title,
            author: self.author,
            year: self.year,
            genre: non_blank(self.genre).unwrap_or_else(|| DEFAULT_GENRE.to_string()),
            isbn: non_blank(self.isbn).unwrap_or_else(|| DEFAULT_ISBN.to_string()),
            description: non_blank(self.description),
        })
    }
}

/// Partial update. Each field is tri-state: absent leaves the stored value
/// alone, `null` clears it, a value replaces it.
///
/// `available` is not accepted; it only changes through checkout/checkin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBook {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub author: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub year: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub genre: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub isbn: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

/// Marks a field as supplied, keeping an explicit `null` as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateBook {
    pub fn validate(&self) -> Result<(), Vec<serde_json::Value>> {
        let mut details = Vec::new();
        if let Some(title) = &self.title {
            require_text("title", title.as_ref(), &mut details);
        }
        if let Some(author) = &self.author {
            require_text("author", author.as_ref(), &mut details);
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(details)
        }
    }
}

/// Search filters from the query string. Absent or blank filters are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchBooks {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub year: Option<i32>,
    pub available: Option<bool>,
}

/// Acknowledgment returned by delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deleted {
    pub detail: String,
}

impl Deleted {
    pub fn book() -> Self {
        Self {
            detail: "Book deleted successfully".to_string(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require_text(field: &str, value: Option<&String>, details: &mut Vec<serde_json::Value>) {
    match value {
        None => details.push(json!({"field": field, "error": "must not be null"})),
        Some(v) if v.trim().is_empty() => {
            details.push(json!({"field": field, "error": "must not be empty"}))
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BookRecord {
        BookRecord {
            id: Uuid::now_v7(),
            title: "Nineteen Eighty-Four".into(),
            author: "Orwell".into(),
            year: Some(1949),
            genre: Some("dystopia".into()),
            isbn: Some("978-0451524935".into()),
            available: false,
            description: Some("Big Brother is watching.".into()),
            embedding: Json(vec![0.5, 0.5]),
        }
    }

    #[test]
    fn defaults_fill_missing_genre_and_isbn() {
        let new_book = CreateBook {
            title: "Dune".into(),
            author: "Herbert".into(),
            ..Default::default()
        }
        .into_new_book()
        .unwrap();

        assert_eq!(new_book.genre, DEFAULT_GENRE);
        assert_eq!(new_book.isbn, DEFAULT_ISBN);
        assert_eq!(new_book.description, None);
    }

    #[test]
    fn blank_optionals_count_as_absent() {
        let new_book = CreateBook {
            title: "Dune".into(),
            author: "Herbert".into(),
            genre: Some("  ".into()),
            isbn: Some(String::new()),
            description: Some(String::new()),
            ..Default::default()
        }
        .into_new_book()
        .unwrap();

        assert_eq!(new_book.genre, DEFAULT_GENRE);
        assert_eq!(new_book.isbn, DEFAULT_ISBN);
        assert_eq!(new_book.description, None);
    }

    #[test]
    fn blank_title_and_author_are_rejected() {
        let details = CreateBook {
            title: " ".into(),
            author: String::new(),
            ..Default::default()
        }
        .into_new_book()
        .unwrap_err();

        assert_eq!(details.len(), 2);
        assert_eq!(details[0]["field"], "title");
        assert_eq!(details[1]["field"], "author");
    }

    #[test]
    fn update_distinguishes_absent_from_null() {
        let update: UpdateBook = serde_json::from_str(r#"{"year": null, "genre": "satire"}"#).unwrap();

        assert_eq!(update.title, None);
        assert_eq!(update.year, Some(None));
        assert_eq!(update.genre, Some(Some("satire".to_string())));
        assert_eq!(update.isbn, None);
    }

    #[test]
    fn update_rejects_availability() {
        let result = serde_json::from_str::<UpdateBook>(r#"{"available": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_cannot_clear_title() {
        let update: UpdateBook = serde_json::from_str(r#"{"title": null}"#).unwrap();
        let details = update.validate().unwrap_err();
        assert_eq!(details[0]["field"], "title");
        assert_eq!(details[0]["error"], "must not be null");
    }

    #[test]
    fn output_omits_embedding() {
        let value = serde_json::to_value(Book::from(record())).unwrap();
        assert!(value.get("embedding").is_none());
        assert_eq!(value["available"], false);
    }
}
