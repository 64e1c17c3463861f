use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::info;

use mystery_types::api::{AcceptMessagesRequest, ApiResponse};

use crate::auth::{AppState, with_db};
use crate::error::ApiError;
use crate::middleware::Session;

pub async fn get_accept_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = session.user_id.to_string();
    let accepting = with_db(
        &state,
        "Error retrieving message acceptance status",
        move |db| db.get_accepting_messages(&uid),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse {
        success: true,
        ..Default::default()
    }
    .accepting(accepting)))
}

pub async fn set_accept_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<AcceptMessagesRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let accepting = req.accept_messages;

    let uid = session.user_id.to_string();
    let updated = with_db(
        &state,
        "Error updating message acceptance status",
        move |db| db.set_accepting_messages(&uid, accepting),
    )
    .await?;

    // The session can outlive the account it was issued for.
    if !updated {
        return Err(ApiError::NotFound(
            "Unable to find user to update message acceptance status".into(),
        ));
    }

    info!("User {} now accepting messages: {}", session.username, accepting);
    Ok(Json(
        ApiResponse::ok("Message acceptance status updated successfully").accepting(accepting),
    ))
}
