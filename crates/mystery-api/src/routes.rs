use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};

use mystery_types::api::ApiResponse;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{acceptance, messages, suggestions};

/// All API routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/sign-up", post(auth::sign_up))
        .route("/api/verify-code", post(auth::verify_code))
        .route("/api/check-username-unique", get(auth::check_username_unique))
        .route("/api/sign-in", post(auth::sign_in))
        .route("/api/send-message", post(messages::send_message))
        .route("/api/get-reply/{username}", get(messages::get_replies))
        .route("/api/suggest-messages", post(suggestions::suggest_messages))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route(
            "/api/accept-messages",
            get(acceptance::get_accept_messages).post(acceptance::set_accept_messages),
        )
        .route("/api/get-messages", get(messages::get_messages))
        .route("/api/reply-message/{messageid}", post(messages::reply_message))
        .route("/api/delete-message/{messageid}", delete(messages::delete_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok("ok"))
}
