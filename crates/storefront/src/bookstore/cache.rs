//! Cache key and value types for bookstore API responses.

use bookstore_core::{Book, BookId, Cart};

/// Cache key for books and the cart.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Books,
    Book(BookId),
    Cart,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Books(Vec<Book>),
    Book(Box<Book>),
    Cart(Cart),
}

impl CacheValue {
    #[must_use]
    pub fn as_books(&self) -> Option<&[Book]> {
        match self {
            Self::Books(books) => Some(books.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_book(&self) -> Option<&Book> {
        match self {
            Self::Book(book) => Some(book.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_cart(&self) -> Option<&Cart> {
        match self {
            Self::Cart(cart) => Some(cart),
            _ => None,
        }
    }
}
