//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use super::RetryQuery;
use super::views::BookView;
use crate::middleware::RequestId;
use crate::state::AppState;

/// Home page template.
///
/// When the listing cannot be loaded, `error` is set and `books` holds the
/// last listing that did load, if any.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub books: Vec<BookView>,
    pub error: Option<String>,
    pub request_id: String,
}

/// Display the book listing.
#[instrument(skip(state, request_id))]
pub async fn home(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<RetryQuery>,
) -> impl IntoResponse {
    let store = state.store();
    if query.retry {
        store.invalidate_books();
    }

    let (books, error) = match store.books().await {
        Ok(books) => (books, None),
        Err(e) => {
            tracing::error!("Failed to fetch books: {e}");
            (
                store.cached_books().unwrap_or_default(),
                Some("The book list could not be loaded.".to_string()),
            )
        }
    };

    HomeTemplate {
        books: books.iter().map(BookView::from).collect(),
        error,
        request_id: request_id.0,
    }
}
