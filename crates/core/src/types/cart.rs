//! Cart snapshots and cart lines.
//!
//! A cart line duplicates the book's title, author and price at the moment it
//! was added; those fields are not re-synced if the book changes later.

use serde::{Deserialize, Deserializer, Serialize};

use super::book::{Book, placeholder_cover};
use super::id::{BookId, CartItemId};
use super::price::Price;

/// Version of the `POST /cart` request body.
///
/// Sent alongside every request so the remote store can reject bodies it does
/// not understand.
pub const CART_SCHEMA_VERSION: u32 = 1;

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Cart line id. Removal is keyed on this, never on the book id.
    pub id: CartItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<BookId>,
    pub title: String,
    pub author: String,
    pub price: Price,
    /// Always at least 1; absent or zero quantities read as 1.
    #[serde(default = "default_quantity", deserialize_with = "deserialize_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

fn deserialize_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let quantity = Option::<u32>::deserialize(deserializer)?;
    Ok(quantity.filter(|q| *q > 0).unwrap_or_else(default_quantity))
}

impl CartItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }

    /// Cover image for the line, derived from the referenced book.
    #[must_use]
    pub fn cover_url(&self, width: u32, height: u32) -> Option<String> {
        self.book_id.map(|id| placeholder_cover(id, width, height))
    }
}

/// A snapshot of the remote cart.
///
/// On the wire this is a plain JSON array of lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create a cart snapshot from its lines.
    #[must_use]
    pub const fn new(items: Vec<CartItem>) -> Self {
        Self { items }
    }

    /// The lines in the cart, in server order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Total number of books (sum of line quantities).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First line referencing `book_id`, if any.
    #[must_use]
    pub fn line_for_book(&self, book_id: BookId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.book_id == Some(book_id))
    }

    /// Whether a line with this id is present.
    #[must_use]
    pub fn contains_line(&self, id: CartItemId) -> bool {
        self.items.iter().any(|item| item.id == id)
    }
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        Self::new(items)
    }
}

/// Body of `POST /cart`, schema version [`CART_SCHEMA_VERSION`].
///
/// The book is resolved before the request is built, so the line carries the
/// title, author and price the customer saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub price: Price,
    pub quantity: u32,
}

impl CartLineRequest {
    /// A single-copy line for `book`.
    #[must_use]
    pub fn for_book(book: &Book) -> Self {
        Self {
            book_id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            price: book.price,
            quantity: 1,
        }
    }
}
