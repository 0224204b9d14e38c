//! Core types for the bookstore.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod book;
pub mod cart;
pub mod id;
pub mod price;
pub mod shipping;

pub use book::{Book, placeholder_cover};
pub use cart::{CART_SCHEMA_VERSION, Cart, CartItem, CartLineRequest};
pub use id::*;
pub use price::{Price, PriceError};
pub use shipping::{ShippingError, ShippingInfo};
