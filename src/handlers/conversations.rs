//! Conversation lookup endpoints.
//!
//! `GET /api/v1/conversations` lists stored conversations, optionally
//! filtered with `?active=true|false`; `GET /api/v1/conversations/{id}`
//! returns a single record or a structured 404.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub active: Option<bool>,
}

pub async fn list_conversations(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let conversations = state.store.list(query.active).await?;
    debug!(
        count = conversations.len(),
        active = ?query.active,
        "Listing conversations"
    );

    Ok(HttpResponse::Ok().json(json!({
        "count": conversations.len(),
        "conversations": conversations,
    })))
}

pub async fn get_conversation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();

    match state.store.get(&conversation_id).await? {
        Some(conversation) => Ok(HttpResponse::Ok().json(conversation)),
        None => Err(AppError::unknown_conversation(&conversation_id)),
    }
}
