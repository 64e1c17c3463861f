//! Input rules applied before anything touches the database.

use uuid::Uuid;

use crate::error::ApiError;

pub const USERNAME_MIN: usize = 2;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 6;
pub const MESSAGE_MAX: usize = 300;
pub const VERIFY_CODE_LEN: usize = 6;

pub fn username(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len < USERNAME_MIN {
        return Err(invalid("Username must be at least 2 characters"));
    }
    if len > USERNAME_MAX {
        return Err(invalid("Username must be no more than 20 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("Username must not contain special characters"));
    }
    Ok(())
}

pub fn email(address: &str) -> Result<(), ApiError> {
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid("Invalid email address"))
    }
}

pub fn password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(invalid("Password must be at least 6 characters"));
    }
    Ok(())
}

pub fn verify_code(code: &str) -> Result<(), ApiError> {
    if code.len() != VERIFY_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("Verification code must be 6 digits"));
    }
    Ok(())
}

/// Trimmed message body, 1..=300 characters.
pub fn message_content(content: &str) -> Result<String, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(invalid("Message content must not be empty"));
    }
    if content.chars().count() > MESSAGE_MAX {
        return Err(invalid("Message content must be no longer than 300 characters"));
    }
    Ok(content.to_string())
}

/// A reply can replace another reply but never blank one out.
pub fn reply(text: &str) -> Result<String, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("Reply must not be empty"));
    }
    Ok(text.to_string())
}

pub fn message_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| invalid("Invalid message id"))
}

fn invalid(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(username("alice_01").is_ok());
        assert!(username("a").is_err());
        assert!(username("abcdefghijklmnopqrstu").is_err());
        assert!(username("no spaces").is_err());
        assert!(username("dash-ed").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(email("a@b.co").is_ok());
        assert!(email("missing-at.example").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a@b@c").is_err());
        assert!(email("a b@c.d").is_err());
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(message_content("  hi  ").unwrap(), "hi");
        assert!(message_content("   ").is_err());
        assert!(message_content(&"x".repeat(MESSAGE_MAX)).is_ok());
        assert!(message_content(&"x".repeat(MESSAGE_MAX + 1)).is_err());
        // counted in characters, not bytes
        assert!(message_content(&"é".repeat(MESSAGE_MAX)).is_ok());
    }

    #[test]
    fn blank_reply_rejected() {
        assert!(reply("").is_err());
        assert!(reply(" \n").is_err());
        assert_eq!(reply(" thanks ").unwrap(), "thanks");
    }

    #[test]
    fn code_and_id_shapes() {
        assert!(verify_code("012345").is_ok());
        assert!(verify_code("12345").is_err());
        assert!(verify_code("12345a").is_err());
        assert!(message_id("not-a-uuid").is_err());
        assert!(message_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
