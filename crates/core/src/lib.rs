//! Bookstore Core - Shared domain types.
//!
//! This crate provides the types exchanged with the remote bookstore API and
//! rendered by the storefront:
//! - [`Book`] - A catalog entry owned by the remote store
//! - [`Cart`] / [`CartItem`] - Cart snapshots and their lines
//! - [`CartLineRequest`] - The versioned body of an add-to-cart request
//! - [`ShippingInfo`] - Checkout shipping details
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no HTTP
//! clients, no caching. This keeps it lightweight and allows it to be used
//! anywhere.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
