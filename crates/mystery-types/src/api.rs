use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

// -- JWT Claims --

/// Session token claims issued at sign-in and checked by the REST auth
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Envelope --

/// Uniform response body: `{ success, message?, ...operation fields }`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_accepting_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            success: true,
            messages: Some(messages),
            ..Default::default()
        }
    }

    pub fn accepting(mut self, is_accepting_messages: bool) -> Self {
        self.is_accepting_messages = Some(is_accepting_messages);
        self
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyCodeRequest {
    pub username: String,
    pub code: String,
}

/// `identifier` is either an email address or a username.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessagesRequest {
    pub accept_messages: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRequest {
    pub reply: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_fields() {
        let body = serde_json::to_value(ApiResponse::failure("User not found")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "User not found" })
        );
    }

    #[test]
    fn envelope_uses_camel_case_flag() {
        let body = serde_json::to_value(ApiResponse::ok("updated").accepting(false)).unwrap();
        assert_eq!(body["isAcceptingMessages"], serde_json::json!(false));
    }

    #[test]
    fn accept_messages_request_rejects_non_boolean() {
        let parsed: Result<AcceptMessagesRequest, _> =
            serde_json::from_str(r#"{"acceptMessages":"yes"}"#);
        assert!(parsed.is_err());
    }
}
