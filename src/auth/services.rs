use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::SessionUser,
        dto::{LoginRequest, LoginResponse, RegisterRequest},
        repo::StoreError,
        repo_types::{Role, User},
    },
    error::{ApiError, ApiResult},
    state::AppState,
    validation::{is_valid_email, required},
};

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates a user record. No token is issued; the client logs in separately.
pub async fn register(state: &AppState, payload: RegisterRequest) -> ApiResult<User> {
    let (Some(name), Some(email), Some(password)) = (
        required(payload.name),
        required(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::validation("Please enter all required fields"));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email format"));
    }

    let role = match required(payload.role) {
        None => Role::default(),
        Some(r) => r
            .parse::<Role>()
            .map_err(|_| ApiError::validation("Invalid role"))?,
    };

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let password_hash = state.passwords.hash(password).await?;
    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash,
        role,
        created_at: OffsetDateTime::now_utc(),
    };

    match state.users.insert(&user).await {
        Ok(()) => {}
        // Lost a race with a concurrent registration of the same email.
        Err(StoreError::Duplicate) => {
            warn!(email = %user.email, "email already registered");
            return Err(ApiError::Conflict("User already exists".into()));
        }
        Err(StoreError::Backend(e)) => return Err(e.into()),
    }

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok(user)
}

/// Unknown email and wrong password produce the same error after the same amount of work.
pub async fn login(state: &AppState, payload: LoginRequest) -> ApiResult<LoginResponse> {
    let (Some(email), Some(password)) = (
        required(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::validation("Please enter all required fields"));
    };
    let email = normalize_email(&email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        state.passwords.verify_dummy(password).await?;
        warn!(email = %email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !state
        .passwords
        .verify(password, user.password_hash.clone())
        .await?
    {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let session = SessionUser {
        id: user.id,
        role: user.role,
        name: user.name,
    };
    let token = state.jwt.sign(&session)?;

    info!(user_id = %session.id, role = %session.role, "user logged in");
    Ok(LoginResponse {
        token,
        user: session,
    })
}
