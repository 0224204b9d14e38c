//! Book detail route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use bookstore_core::BookId;
use tracing::instrument;

use super::{ErrorPage, RetryQuery};
use super::views::BookView;
use crate::middleware::RequestId;
use crate::state::AppState;

/// Book detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "books/show.html")]
pub struct BookShowTemplate {
    pub book: BookView,
}

/// Display one book.
///
/// A non-numeric id is treated like an unknown book.
#[instrument(skip(state, request_id))]
pub async fn show(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
    Query(query): Query<RetryQuery>,
) -> Response {
    let Ok(id) = id.parse::<i64>() else {
        return ErrorPage::new(
            crate::error::AppError::NotFound(format!("book {id}")),
            request_id,
        )
        .into_response();
    };

    let id = BookId::new(id);
    if query.retry {
        state.store().invalidate_book(id);
    }

    match state.store().book(id).await {
        Ok(book) => BookShowTemplate {
            book: BookView::from(&book),
        }
        .into_response(),
        Err(e) => ErrorPage::new(e, request_id)
            .retry(format!("/books/{id}"))
            .into_response(),
    }
}
