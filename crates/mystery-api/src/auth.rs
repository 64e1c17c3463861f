use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use mystery_db::Database;
use mystery_db::models::{NewUser, RegisterOutcome, VerifyOutcome};
use mystery_types::api::{
    ApiResponse, Claims, SignInRequest, SignUpRequest, UsernameQuery, VerifyCodeRequest,
};

use crate::error::ApiError;
use crate::mailer::VerificationMailer;
use crate::suggestions::SuggestionClient;
use crate::validation;

const VERIFY_CODE_TTL_HOURS: i64 = 1;
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub suggestions: SuggestionClient,
    pub mailer: Box<dyn VerificationMailer>,
}

/// Run a blocking database call off the async runtime. Any failure becomes
/// `ApiError::Internal` with `context` as the client-facing message.
pub(crate) async fn with_db<F, T>(
    state: &AppState,
    context: &'static str,
    f: F,
) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(ApiError::internal(context))?
        .map_err(ApiError::internal(context))
}

pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    validation::username(&req.username)?;
    validation::email(&req.email)?;
    validation::password(&req.password)?;

    let password_hash = hash_password(&req.password)
        .map_err(ApiError::internal("Error registering user"))?;
    let code = verification_code();
    let now = chrono::Utc::now();
    let expiry = now + chrono::Duration::hours(VERIFY_CODE_TTL_HOURS);

    let id = Uuid::new_v4().to_string();
    let (username, email, stored_code) = (req.username.clone(), req.email.clone(), code.clone());
    let outcome = with_db(&state, "Error registering user", move |db| {
        let new = NewUser {
            id: &id,
            username: &username,
            email: &email,
            password_hash: &password_hash,
            verify_code: &stored_code,
            verify_code_expiry: expiry,
        };
        db.register_user(&new, now)
    })
    .await?;

    match outcome {
        RegisterOutcome::UsernameTaken => {
            return Err(ApiError::Conflict("Username is already taken".into()));
        }
        RegisterOutcome::EmailTaken => {
            return Err(ApiError::Conflict("User already exists with this email".into()));
        }
        RegisterOutcome::Created | RegisterOutcome::Refreshed => {}
    }

    state
        .mailer
        .send_verification(&req.email, &req.username, &code)
        .map_err(ApiError::internal("Failed to send verification email"))?;

    info!("User {} registered ({:?})", req.username, outcome);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "User registered successfully. Please verify your account.",
        )),
    ))
}

pub async fn verify_code(
    State(state): State<AppState>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    validation::verify_code(&req.code)?;

    let username = req.username.clone();
    let outcome = with_db(&state, "Error verifying user", move |db| {
        db.verify_user(&username, &req.code, chrono::Utc::now())
    })
    .await?;

    match outcome {
        VerifyOutcome::Verified => {
            info!("User {} verified", req.username);
            Ok(Json(ApiResponse::ok("Account verified successfully")))
        }
        VerifyOutcome::Expired => Err(ApiError::Validation(
            "Verification code has expired, please sign up again to get a new code".into(),
        )),
        VerifyOutcome::IncorrectCode => {
            Err(ApiError::Validation("Incorrect verification code".into()))
        }
        VerifyOutcome::UserNotFound => Err(ApiError::NotFound("User not found".into())),
    }
}

pub async fn check_username_unique(
    State(state): State<AppState>,
    query: Result<Query<UsernameQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    validation::username(&query.username)?;

    let taken = with_db(&state, "Error checking username", move |db| {
        db.is_username_taken(&query.username, chrono::Utc::now())
    })
    .await?;

    if taken {
        return Err(ApiError::Conflict("Username is already taken".into()));
    }
    Ok(Json(ApiResponse::ok("Username is unique")))
}

pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let identifier = req.identifier.clone();
    let user = with_db(&state, "Error signing in", move |db| {
        db.get_user_by_identifier(&identifier)
    })
    .await?
    .ok_or_else(|| {
        ApiError::InvalidCredentials("No user found with this email or username".into())
    })?;

    if user.is_external() {
        return Err(ApiError::InvalidCredentials(
            "This account uses an external sign-in provider".into(),
        ));
    }
    if !user.is_verified {
        return Err(ApiError::InvalidCredentials(
            "Please verify your account before logging in".into(),
        ));
    }

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored hash for {} unreadable: {}", user.username, e))
        .map_err(ApiError::internal("Error signing in"))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials("Incorrect password".into()))?;

    let user_id: Uuid = user.id.parse().map_err(ApiError::internal("Error signing in"))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(ApiError::internal("Error signing in"))?;

    info!("User {} signed in", user.username);
    Ok(Json(ApiResponse {
        token: Some(token),
        ..ApiResponse::ok("Signed in successfully")
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Hash a password with Argon2id.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Six decimal digits.
fn verification_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}
