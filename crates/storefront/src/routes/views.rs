//! Display data shared by page and fragment templates.
//!
//! Templates receive pre-formatted strings; no price math happens in askama.

use bookstore_core::{Book, Cart, CartItem, Price};

/// Currency symbol the remote store prices in.
const CURRENCY: &str = "¥";

/// Shown when a book has no description.
const NO_DESCRIPTION: &str = "No description yet.";

/// Format a price for display.
#[must_use]
pub fn format_price(price: Price) -> String {
    format!("{CURRENCY}{price}")
}

/// Book display data for templates.
#[derive(Clone)]
pub struct BookView {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub price: String,
    pub description: String,
    /// Wide cover for listing cards.
    pub card_cover: String,
    /// Tall cover for the detail page.
    pub cover: String,
}

impl From<&Book> for BookView {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.as_i64(),
            title: book.title.clone(),
            author: book.author.clone(),
            price: format_price(book.price),
            description: book
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(NO_DESCRIPTION)
                .to_string(),
            card_cover: book.cover_url(400, 200),
            cover: book.cover_url(800, 1000),
        }
    }
}

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub id: i64,
    pub book_id: Option<i64>,
    pub title: String,
    pub author: String,
    pub price: String,
    pub quantity: u32,
    pub line_total: String,
    pub cover: Option<String>,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id.as_i64(),
            book_id: item.book_id.map(|id| id.as_i64()),
            title: item.title.clone(),
            author: item.author.clone(),
            price: format_price(item.price),
            quantity: item.quantity,
            line_total: format_price(item.line_total()),
            cover: item.cover_url(800, 1000),
        }
    }
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total: String,
    pub item_count: u32,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::from(&Cart::default())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().iter().map(CartItemView::from).collect(),
            total: format_price(cart.total()),
            item_count: cart.item_count(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use bookstore_core::{BookId, CartItemId};

    use super::*;

    fn book(description: Option<&str>) -> Book {
        Book {
            id: BookId::new(5),
            title: "Fortress Besieged".to_string(),
            author: "Qian Zhongshu".to_string(),
            price: Price::from_cents(4250).unwrap(),
            description: description.map(String::from),
            cover_image: None,
        }
    }

    #[test]
    fn test_book_view() {
        let view = BookView::from(&book(None));
        assert_eq!(view.price, "¥42.50");
        assert_eq!(view.description, NO_DESCRIPTION);
        assert_eq!(view.card_cover, "https://picsum.photos/seed/5/400/200");
        assert_eq!(view.cover, "https://picsum.photos/seed/5/800/1000");

        let view = BookView::from(&book(Some("A satire.")));
        assert_eq!(view.description, "A satire.");
    }

    #[test]
    fn test_cart_view_totals() {
        let cart = Cart::new(vec![
            CartItem {
                id: CartItemId::new(1),
                book_id: Some(BookId::new(5)),
                title: "Fortress Besieged".to_string(),
                author: "Qian Zhongshu".to_string(),
                price: Price::from_cents(1000).unwrap(),
                quantity: 2,
            },
            CartItem {
                id: CartItemId::new(2),
                book_id: None,
                title: "Unknown".to_string(),
                author: "Anonymous".to_string(),
                price: Price::from_cents(550).unwrap(),
                quantity: 1,
            },
        ]);

        let view = CartView::from(&cart);
        assert_eq!(view.item_count, 3);
        assert_eq!(view.total, "¥25.50");
        assert_eq!(view.items[0].line_total, "¥20.00");
        assert!(view.items[1].cover.is_none());
        assert!(CartView::empty().is_empty());
    }
}
