use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{delete, get, patch, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        CreateReferralRequest, CreatedResponse, ListQuery, NewReferral, ReferralView,
        ResumeUpload, UpdateStatusRequest,
    },
    repo_types::Referral,
    services,
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{AdminOnly, AuthUser, Authorized, UserOrAdmin},
    },
    config::ResumeMode,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/candidates", get(list_referrals))
}

pub fn write_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/candidates",
            post(create_referral).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/candidates/:id/status", patch(update_status))
        .route("/candidates/:id", delete(delete_referral))
}

fn content_type(req: &Request) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// POST /candidates
///
/// `url` mode takes JSON; `upload` mode takes multipart with an optional `resume` PDF.
#[instrument(skip(state, req))]
pub async fn create_referral(
    State(state): State<AppState>,
    Authorized(user, _): Authorized<UserOrAdmin>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let ct = content_type(&req);
    let input = match (state.config.uploads.mode, ct.starts_with("multipart/form-data")) {
        (ResumeMode::Upload, true) => {
            let mp = Multipart::from_request(req, &state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            read_multipart(mp).await?
        }
        (ResumeMode::Url, false) => {
            let Json(body) = Json::<CreateReferralRequest>::from_request(req, &state).await?;
            body.into()
        }
        (ResumeMode::Upload, false) => {
            return Err(ApiError::validation("Expected multipart/form-data"));
        }
        (ResumeMode::Url, true) => {
            return Err(ApiError::validation(
                "Resume uploads are disabled; send JSON with resumeUrl",
            ));
        }
    };

    let referral = services::create(&state, &user, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            msg: "Candidate referred successfully".into(),
            id: referral.id,
        }),
    ))
}

async fn read_multipart(mut mp: Multipart) -> ApiResult<NewReferral> {
    let mut input = NewReferral::default();
    while let Some(field) = mp.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && body.is_empty() {
                    continue;
                }
                input.resume = Some(ResumeUpload {
                    file_name,
                    content_type,
                    body,
                });
            }
            "name" => input.name = Some(field.text().await?),
            "email" => input.email = Some(field.text().await?),
            "phone" => input.phone = Some(field.text().await?),
            "jobTitle" => input.job_title = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(input)
}

/// GET /candidates?jobTitle=&status=
#[instrument(skip(state, query))]
pub async fn list_referrals(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ReferralView>>> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;
    Ok(Json(services::list(&state, query).await?))
}

/// PATCH /candidates/:id/status
#[instrument(skip(state, payload))]
pub async fn update_status(
    State(state): State<AppState>,
    Authorized(admin, _): Authorized<AdminOnly>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Referral>> {
    let Json(payload) = payload?;
    Ok(Json(services::update_status(&state, &id, payload.status).await?))
}

/// DELETE /candidates/:id
#[instrument(skip(state))]
pub async fn delete_referral(
    State(state): State<AppState>,
    Authorized(admin, _): Authorized<AdminOnly>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    services::delete(&state, &id).await?;
    Ok(Json(MessageResponse::new("Candidate deleted")))
}
