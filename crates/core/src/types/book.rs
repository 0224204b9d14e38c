//! Catalog books.

use serde::{Deserialize, Serialize};

use super::id::BookId;
use super::price::Price;

/// Placeholder image service used when a book has no cover of its own.
const PLACEHOLDER_COVER_BASE: &str = "https://picsum.photos/seed";

/// A book as served by the remote store.
///
/// Books are owned by the remote store; the storefront never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl Book {
    /// Cover image URL, falling back to a placeholder seeded by the book id.
    #[must_use]
    pub fn cover_url(&self, width: u32, height: u32) -> String {
        match self.cover_image.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => placeholder_cover(self.id, width, height),
        }
    }
}

/// Deterministic placeholder cover for a book id.
#[must_use]
pub fn placeholder_cover(id: BookId, width: u32, height: u32) -> String {
    format!("{PLACEHOLDER_COVER_BASE}/{id}/{width}/{height}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_remote_shape() {
        let json = r#"{
            "id": 3,
            "title": "The Rust Book",
            "author": "Klabnik",
            "price": 39.5,
            "description": "Learn Rust",
            "coverImage": "https://img.example/3.jpg"
        }"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.id, BookId::new(3));
        assert_eq!(book.price, Price::from_cents(3950).unwrap());
        assert_eq!(book.cover_url(400, 200), "https://img.example/3.jpg");
    }

    #[test]
    fn test_optional_fields_absent() {
        let json = r#"{"id": 9, "title": "T", "author": "A", "price": 10}"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert!(book.description.is_none());
        assert_eq!(
            book.cover_url(800, 1000),
            "https://picsum.photos/seed/9/800/1000"
        );
    }

    #[test]
    fn test_negative_price_rejected() {
        let json = r#"{"id": 1, "title": "T", "author": "A", "price": -1}"#;
        assert!(serde_json::from_str::<Book>(json).is_err());
    }
}
