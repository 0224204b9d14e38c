//! `BookStore` caching and cart invalidation against the fake API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use bookstore_core::{BookId, CartItemId, Price};
use bookstore_integration_tests::{FakeBookstore, test_cache_config};
use bookstore_storefront::bookstore::{ApiError, BookStore, BookstoreClient};
use bookstore_storefront::config::CacheConfig;
use bookstore_storefront::query::QueryStatus;

fn store_for(fake: &FakeBookstore, cache: &CacheConfig) -> BookStore {
    let client = BookstoreClient::new(&fake.api_config()).unwrap();
    BookStore::new(client, cache)
}

fn cart_gets(fake: &FakeBookstore) -> usize {
    fake.hits().get_cart.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_subscriber_sees_cart_after_add() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    let mut subscription = store.subscribe_cart();
    assert!(store.cart().await.unwrap().is_empty());

    store.add_to_cart(BookId::new(5)).await.unwrap();

    let refreshed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = subscription.changed().await.unwrap();
            if state.status == QueryStatus::Success
                && let Some(data) = state.data
                && let Some(cart) = data.as_cart()
                && cart.line_for_book(BookId::new(5)).is_some()
            {
                return cart.clone();
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(refreshed.item_count(), 1);
    assert_eq!(refreshed.total(), Price::from_cents(1999).unwrap());
}

#[tokio::test]
async fn test_read_after_add_never_returns_pre_mutation_cart() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    assert!(store.cart().await.unwrap().is_empty());
    store.add_to_cart(BookId::new(1)).await.unwrap();

    let cart = store.cart().await.unwrap();
    assert_eq!(cart.item_count(), 1);
}

#[tokio::test]
async fn test_failed_remove_leaves_cache_untouched() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    let before = store.cart().await.unwrap();
    let gets = cart_gets(&fake);

    let result = store.remove_from_cart(CartItemId::new(99)).await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
    assert_eq!(store.cached_cart(), Some(before));
    assert!(!store.cart_state().is_stale);
    assert_eq!(cart_gets(&fake), gets);
}

#[tokio::test]
async fn test_add_then_remove_restores_totals() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    let empty = store.cart().await.unwrap();
    assert_eq!(empty.item_count(), 0);

    let cart = store.add_to_cart(BookId::new(3)).await.unwrap();
    assert_eq!(cart.item_count(), 1);
    assert_eq!(cart.total().to_string(), "45.00");

    let line_id = cart.items()[0].id;
    store.remove_from_cart(line_id).await.unwrap();

    let cart = store.cart().await.unwrap();
    assert_eq!(cart.item_count(), 0);
    assert_eq!(cart.total(), Price::ZERO);
}

#[tokio::test]
async fn test_concurrent_cart_reads_share_one_request() {
    let fake = FakeBookstore::start().await;
    fake.faults().cart_delay_ms.store(100, Ordering::SeqCst);
    let store = store_for(&fake, &test_cache_config());

    let (a, b, c) = tokio::join!(store.cart(), store.cart(), store.cart());

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(cart_gets(&fake), 1);
}

#[tokio::test]
async fn test_fresh_book_reads_are_cached() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    let first = store.book(BookId::new(2)).await.unwrap();
    let second = store.book(BookId::new(2)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fake.hits().get_book.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_double_failure_keeps_last_good_cart() {
    let fake = FakeBookstore::start().await;
    let store = store_for(&fake, &test_cache_config());

    store.add_to_cart(BookId::new(2)).await.unwrap();
    let good = store.cart().await.unwrap();

    fake.faults().fail_cart_gets.store(2, Ordering::SeqCst);
    store.invalidate_cart();
    let gets = cart_gets(&fake);

    let result = store.cart().await;

    assert!(result.is_err());
    assert_eq!(cart_gets(&fake), gets + 2, "one attempt plus one retry");
    assert_eq!(store.cached_cart(), Some(good.clone()));
    assert!(store.cart_state().is_error());

    // The error sticks until the entry is invalidated again.
    store.invalidate_cart();
    assert_eq!(store.cart().await.unwrap(), good);
}

#[tokio::test]
async fn test_idle_entry_is_evicted_then_refetched_once() {
    let fake = FakeBookstore::start().await;
    let cache = CacheConfig {
        idle_timeout: Duration::from_millis(50),
        ..test_cache_config()
    };
    let store = store_for(&fake, &cache);

    store.cart().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.cache().evict_idle(), 1);
    assert!(store.cached_cart().is_none());

    store.cart().await.unwrap();
    store.cart().await.unwrap();
    assert_eq!(cart_gets(&fake), 2);
}

#[tokio::test]
async fn test_subscribed_cart_survives_eviction() {
    let fake = FakeBookstore::start().await;
    let cache = CacheConfig {
        idle_timeout: Duration::from_millis(50),
        ..test_cache_config()
    };
    let store = store_for(&fake, &cache);

    let _subscription = store.subscribe_cart();
    store.cart().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.cache().evict_idle(), 0);
    assert!(store.cached_cart().is_some());
}
