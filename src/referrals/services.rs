use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{ListQuery, NewReferral, ReferralView, Referrer, ResumeUpload},
    repo_types::{Referral, ReferralFilter, Status},
};
use crate::{
    auth::SessionUser,
    error::{ApiError, ApiResult},
    state::AppState,
    storage::{sanitize_filename, StorageError},
    validation::{is_valid_email, is_valid_phone, required},
};

const PDF_MIME: &str = "application/pdf";
const KEY_ATTEMPTS: usize = 4;

fn not_found() -> ApiError {
    ApiError::NotFound("Candidate not found".into())
}

/// Ids that don't parse can't name a stored record.
fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| not_found())
}

fn is_pdf(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME))
        .unwrap_or(false)
}

struct ValidReferral {
    name: String,
    email: String,
    phone: String,
    job_title: String,
    resume_url: String,
    resume: Option<ResumeUpload>,
}

/// Checks run in a fixed order and the first failure wins:
/// presence, email, phone, resume type.
fn validate(input: NewReferral) -> ApiResult<ValidReferral> {
    let phone = input.phone.filter(|p| !p.trim().is_empty());
    let (Some(name), Some(email), Some(phone), Some(job_title)) = (
        required(input.name),
        required(input.email),
        phone,
        required(input.job_title),
    ) else {
        return Err(ApiError::validation("All fields except resume are required"));
    };

    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email format"));
    }
    if !is_valid_phone(&phone) {
        return Err(ApiError::validation("Invalid phone number"));
    }
    if let Some(file) = &input.resume {
        if !is_pdf(&file.content_type) {
            return Err(ApiError::validation("Only PDF files are allowed"));
        }
    }

    Ok(ValidReferral {
        name,
        email,
        phone,
        job_title,
        resume_url: required(input.resume_url).unwrap_or_default(),
        resume: input.resume,
    })
}

/// `<millis>-<name>` first, then `<millis>-<short id>-<name>` when that key is taken.
fn resume_key(millis: i128, name: &str, attempt: usize) -> String {
    if attempt == 0 {
        format!("{millis}-{name}")
    } else {
        let tag = Uuid::new_v4().simple().to_string();
        format!("{millis}-{}-{name}", &tag[..8])
    }
}

/// Writes the file under a key no other upload holds. Returns `(key, public url)`.
async fn store_resume(
    state: &AppState,
    millis: i128,
    file: ResumeUpload,
) -> ApiResult<(String, String)> {
    let name = sanitize_filename(&file.file_name);
    for attempt in 0..KEY_ATTEMPTS {
        let key = resume_key(millis, &name, attempt);
        match state
            .storage
            .put_object(&key, file.body.clone(), PDF_MIME)
            .await
        {
            Ok(url) => return Ok((key, url)),
            Err(StorageError::Exists(_)) => continue,
            Err(StorageError::Backend(e)) => return Err(e.into()),
        }
    }
    Err(anyhow::anyhow!("no free storage key for {name:?} after {KEY_ATTEMPTS} attempts").into())
}

/// Persists a new `Pending` referral credited to `actor`.
pub async fn create(state: &AppState, actor: &SessionUser, input: NewReferral) -> ApiResult<Referral> {
    let valid = validate(input)?;
    let now = OffsetDateTime::now_utc();

    let (resume_key, resume_url) = match valid.resume {
        Some(file) => {
            let millis = now.unix_timestamp_nanos() / 1_000_000;
            let (key, url) = store_resume(state, millis, file).await?;
            (Some(key), url)
        }
        None => (None, valid.resume_url),
    };

    let referral = Referral {
        id: Uuid::new_v4(),
        name: valid.name,
        email: valid.email,
        phone: valid.phone,
        job_title: valid.job_title,
        status: Status::Pending,
        resume_url,
        resume_key,
        referred_by: Some(actor.id),
        created_at: now,
    };

    if let Err(e) = state.referrals.insert(&referral).await {
        if let Some(key) = &referral.resume_key {
            if let Err(cleanup) = state.storage.delete_object(key).await {
                error!(error = %cleanup, key = %key, "orphaned resume left behind");
            }
        }
        return Err(e.into());
    }

    info!(referral_id = %referral.id, referred_by = %actor.id, "candidate referred");
    Ok(referral)
}

fn filter_from(query: ListQuery) -> ApiResult<ReferralFilter> {
    let status = match required(query.status) {
        None => None,
        Some(s) => Some(
            s.parse::<Status>()
                .map_err(|_| ApiError::validation("Invalid status value"))?,
        ),
    };
    Ok(ReferralFilter {
        job_title: required(query.job_title),
        status,
    })
}

/// All referrals, newest first. Visible to every authenticated role.
pub async fn list(state: &AppState, query: ListQuery) -> ApiResult<Vec<ReferralView>> {
    let filter = filter_from(query)?;
    let referrals = state.referrals.list(&filter).await?;

    let mut referrers: HashMap<Uuid, Option<Referrer>> = HashMap::new();
    for id in referrals.iter().filter_map(|r| r.referred_by) {
        if referrers.contains_key(&id) {
            continue;
        }
        let who = state.users.find_by_id(id).await?.map(|u| Referrer {
            id: u.id,
            name: u.name,
            email: u.email,
        });
        referrers.insert(id, who);
    }

    Ok(referrals
        .into_iter()
        .map(|r| {
            let who = r
                .referred_by
                .and_then(|id| referrers.get(&id).cloned().flatten());
            ReferralView::new(r, who)
        })
        .collect())
}

pub async fn update_status(state: &AppState, id: &str, status: Option<String>) -> ApiResult<Referral> {
    let status = status
        .as_deref()
        .and_then(|s| s.parse::<Status>().ok())
        .ok_or_else(|| ApiError::validation("Invalid status value"))?;
    let id = parse_id(id)?;

    let updated = state
        .referrals
        .update_status(id, status)
        .await?
        .ok_or_else(not_found)?;
    info!(referral_id = %id, status = %status, "status updated");
    Ok(updated)
}

pub async fn delete(state: &AppState, id: &str) -> ApiResult<()> {
    let id = parse_id(id)?;
    let removed = state.referrals.delete(id).await?.ok_or_else(not_found)?;

    // Only files this server wrote are removed, and only once nothing else links them.
    if let Some(key) = removed.resume_key.as_deref() {
        if state.referrals.resume_key_in_use(key).await? {
            warn!(referral_id = %id, key, "resume still referenced; keeping file");
        } else if let Err(e) = state.storage.delete_object(key).await {
            warn!(error = %e, key, "failed to remove resume file");
        }
    }
    info!(referral_id = %id, "candidate deleted");
    Ok(())
}
