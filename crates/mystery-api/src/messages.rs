use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use mystery_db::models::{AppendOutcome, MessageRow};
use mystery_db::parse_timestamp;
use mystery_types::api::{ApiResponse, ReplyRequest, SendMessageRequest};
use mystery_types::models::Message;

use crate::auth::{AppState, with_db};
use crate::error::ApiError;
use crate::middleware::Session;
use crate::validation;

/// POST /api/send-message: anonymous, no session required.
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let content = validation::message_content(&req.content)?;

    let message_id = Uuid::new_v4().to_string();
    let username = req.username;
    let outcome = with_db(&state, "Error sending message", move |db| {
        db.append_message(&username, &message_id, &content, chrono::Utc::now())
    })
    .await?;

    match outcome {
        AppendOutcome::Appended => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::ok("Message sent successfully")),
        )),
        AppendOutcome::UserNotFound => Err(ApiError::NotFound("User not found".into())),
        AppendOutcome::NotAccepting => Err(ApiError::Forbidden(
            "User is not accepting messages".into(),
        )),
    }
}

/// GET /api/get-messages: the caller's inbox, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = session.user_id.to_string();
    let rows = with_db(&state, "Internal server error", move |db| db.list_messages(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let messages = rows.into_iter().map(message_from_row).collect();
    Ok(Json(ApiResponse::with_messages(messages)))
}

/// POST /api/reply-message/{messageid}
pub async fn reply_message(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    Extension(session): Extension<Session>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(message_id) = path?;
    let message_id = validation::message_id(&message_id)?;
    let Json(req) = payload?;
    let reply = validation::reply(&req.reply)?;

    let uid = session.user_id.to_string();
    let mid = message_id.to_string();
    let found = with_db(&state, "Server error", move |db| {
        db.reply_to_message(&uid, &mid, &reply)
    })
    .await?;

    if !found {
        return Err(ApiError::NotFound("Message not found".into()));
    }

    info!("User {} replied to message {}", session.username, message_id);
    Ok(Json(ApiResponse::ok("Reply saved successfully")))
}

/// DELETE /api/delete-message/{messageid}
pub async fn delete_message(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(message_id) = path?;
    let message_id = validation::message_id(&message_id)?;

    let uid = session.user_id.to_string();
    let mid = message_id.to_string();
    let removed = with_db(&state, "Error deleting message", move |db| {
        db.delete_message(&uid, &mid)
    })
    .await?;

    if !removed {
        return Err(ApiError::NotFound(
            "Message not found or already deleted".into(),
        ));
    }

    info!("User {} deleted message {}", session.username, message_id);
    Ok(Json(ApiResponse::ok("Message deleted")))
}

/// GET /api/get-reply/{username}: public feed of answered messages.
pub async fn get_replies(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(username) = path?;
    let rows = with_db(&state, "Error fetching replies", move |db| {
        db.list_replied_messages(&username)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let messages = rows.into_iter().map(message_from_row).collect();
    Ok(Json(ApiResponse::with_messages(messages)))
}

fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|e| {
            warn!(
                "Corrupt created_at '{}' on message '{}': {}",
                row.created_at, row.id, e
            );
            chrono::DateTime::default()
        }),
        content: row.content,
        reply: row.reply,
    }
}
