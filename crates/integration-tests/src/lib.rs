//! Integration tests for the bookstore storefront.
//!
//! Tests run against [`FakeBookstore`], an in-process axum server that speaks
//! the remote bookstore API on an ephemeral port. Nothing outside the test
//! process is required.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bookstore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `remote_client` - `BookstoreClient` against the fake API
//! - `cart_invalidation` - `BookStore` caching and cart invalidation
//! - `storefront_routes` - the full router via `tower::ServiceExt::oneshot`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use bookstore_core::{
    Book, BookId, CART_SCHEMA_VERSION, CartItem, CartItemId, CartLineRequest, Price,
};
use bookstore_storefront::bookstore::SCHEMA_HEADER;
use bookstore_storefront::config::{BookstoreApiConfig, CacheConfig, StorefrontConfig};
use tokio::task::JoinHandle;
use url::Url;

/// Path prefix the fake API is mounted under.
const API_PREFIX: &str = "/api";

/// Per-endpoint request counters.
#[derive(Debug, Default)]
pub struct Hits {
    pub list_books: AtomicUsize,
    pub get_book: AtomicUsize,
    pub get_cart: AtomicUsize,
    pub add_line: AtomicUsize,
    pub remove_line: AtomicUsize,
}

/// Failure and latency switches.
#[derive(Debug, Default)]
pub struct Faults {
    /// Fail this many upcoming `GET /cart` calls with 500.
    pub fail_cart_gets: AtomicUsize,
    /// Fail this many upcoming `GET /books` calls with 503.
    pub fail_book_lists: AtomicUsize,
    /// Answer `GET /books` with a body that is not JSON.
    pub malformed_books: AtomicBool,
    /// Answer 409 when a line for the same book already exists.
    pub reject_duplicates: AtomicBool,
    /// Delay every `GET /cart` by this many milliseconds.
    pub cart_delay_ms: AtomicU64,
}

#[derive(Debug)]
struct Data {
    books: Vec<Book>,
    cart: Vec<CartItem>,
    next_line_id: i64,
}

#[derive(Debug)]
struct Shared {
    data: Mutex<Data>,
    hits: Hits,
    faults: Faults,
}

/// An in-process bookstore API.
///
/// The server stops when the value is dropped.
pub struct FakeBookstore {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeBookstore {
    /// Start a fake API seeded with [`sample_books`] and an empty cart.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let shared = Arc::new(Shared {
            data: Mutex::new(Data {
                books: sample_books(),
                cart: Vec::new(),
                next_line_id: 1,
            }),
            hits: Hits::default(),
            faults: Faults::default(),
        });

        let api = Router::new()
            .route("/books", get(list_books))
            .route("/books/{id}", get(get_book))
            .route("/cart", get(get_cart).post(add_line))
            .route("/cart/{id}", delete(remove_line))
            .layer(middleware::from_fn(require_schema))
            .with_state(Arc::clone(&shared));
        let app = Router::new().nest(API_PREFIX, api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake bookstore");
        let addr = listener.local_addr().expect("fake bookstore address");

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, shared, task }
    }

    /// Base URL of the API, ending in `/`.
    ///
    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}{API_PREFIX}/", self.addr)).expect("fake bookstore url")
    }

    #[must_use]
    pub fn api_config(&self) -> BookstoreApiConfig {
        BookstoreApiConfig {
            base_url: self.base_url(),
            token: None,
            timeout: Duration::from_secs(2),
        }
    }

    /// Storefront configuration pointing at this fake with short cache timings.
    #[must_use]
    pub fn storefront_config(&self, cache: CacheConfig) -> StorefrontConfig {
        StorefrontConfig {
            host: std::net::IpAddr::from([127, 0, 0, 1]),
            port: 0,
            api: self.api_config(),
            cache,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[must_use]
    pub fn hits(&self) -> &Hits {
        &self.shared.hits
    }

    #[must_use]
    pub fn faults(&self) -> &Faults {
        &self.shared.faults
    }

    /// Current server-side cart lines.
    #[must_use]
    pub fn cart_lines(&self) -> Vec<CartItem> {
        self.shared.lock().cart.clone()
    }
}

impl Drop for FakeBookstore {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Books every fake starts with (ids 1 through 5).
///
/// # Panics
///
/// Never; the sample prices are non-negative.
#[must_use]
pub fn sample_books() -> Vec<Book> {
    [
        (1, "Fortress Besieged", "Qian Zhongshu", 3900),
        (2, "Rickshaw Boy", "Lao She", 2850),
        (3, "The Three-Body Problem", "Liu Cixin", 4500),
        (4, "To Live", "Yu Hua", 2500),
        (5, "Border Town", "Shen Congwen", 1999),
    ]
    .into_iter()
    .map(|(id, title, author, cents)| Book {
        id: BookId::new(id),
        title: title.to_string(),
        author: author.to_string(),
        price: Price::from_cents(cents).expect("sample price"),
        description: (id % 2 == 1).then(|| format!("{title} by {author}.")),
        cover_image: None,
    })
    .collect()
}

/// Cache configuration with timings short enough for tests.
#[must_use]
pub fn test_cache_config() -> CacheConfig {
    CacheConfig {
        books_stale: Duration::from_secs(60),
        cart_stale: Duration::from_secs(60),
        idle_timeout: Duration::from_secs(60),
        retry_delay: Duration::from_millis(10),
        sweep_interval: Duration::from_secs(60),
        background_refetch: false,
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn require_schema(request: Request, next: Next) -> Response {
    let version = request
        .headers()
        .get(SCHEMA_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());

    if version != Some(CART_SCHEMA_VERSION) {
        return (StatusCode::BAD_REQUEST, "unsupported schema version").into_response();
    }
    next.run(request).await
}

/// Decrement `counter` if positive; returns whether it was.
fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn list_books(State(shared): State<Arc<Shared>>) -> Response {
    shared.hits.list_books.fetch_add(1, Ordering::SeqCst);

    if take_fault(&shared.faults.fail_book_lists) {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    if shared.faults.malformed_books.load(Ordering::SeqCst) {
        return "<html>not json</html>".into_response();
    }

    Json(shared.lock().books.clone()).into_response()
}

async fn get_book(State(shared): State<Arc<Shared>>, Path(id): Path<i64>) -> Response {
    shared.hits.get_book.fetch_add(1, Ordering::SeqCst);

    let book = shared
        .lock()
        .books
        .iter()
        .find(|b| b.id == BookId::new(id))
        .cloned();

    match book {
        Some(book) => Json(book).into_response(),
        None => (StatusCode::NOT_FOUND, "no such book").into_response(),
    }
}

async fn get_cart(State(shared): State<Arc<Shared>>) -> Response {
    shared.hits.get_cart.fetch_add(1, Ordering::SeqCst);

    let delay = shared.faults.cart_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if take_fault(&shared.faults.fail_cart_gets) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "cart store offline").into_response();
    }

    Json(shared.lock().cart.clone()).into_response()
}

async fn add_line(
    State(shared): State<Arc<Shared>>,
    Json(line): Json<CartLineRequest>,
) -> Response {
    shared.hits.add_line.fetch_add(1, Ordering::SeqCst);

    let mut data = shared.lock();
    let duplicate = data.cart.iter().any(|item| item.book_id == Some(line.book_id));
    if duplicate && shared.faults.reject_duplicates.load(Ordering::SeqCst) {
        return (StatusCode::CONFLICT, "book already in cart").into_response();
    }

    let item = CartItem {
        id: CartItemId::new(data.next_line_id),
        book_id: Some(line.book_id),
        title: line.title,
        author: line.author,
        price: line.price,
        quantity: line.quantity.max(1),
    };
    data.next_line_id += 1;
    data.cart.push(item.clone());

    (StatusCode::CREATED, Json(item)).into_response()
}

async fn remove_line(State(shared): State<Arc<Shared>>, Path(id): Path<i64>) -> Response {
    shared.hits.remove_line.fetch_add(1, Ordering::SeqCst);

    let mut data = shared.lock();
    let Some(index) = data.cart.iter().position(|item| item.id == CartItemId::new(id)) else {
        return (StatusCode::NOT_FOUND, "no such cart line").into_response();
    };

    let removed = data.cart.remove(index);
    Json(serde_json::json!({ "removed": removed.id })).into_response()
}
