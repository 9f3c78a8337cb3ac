use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Referral, Status};

/// JSON body for creation in `url` mode.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub resume_url: Option<String>,
}

/// A resume file received through multipart upload, before validation.
#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Creation input after transport decoding; exactly one resume source may be set.
#[derive(Debug, Default)]
pub struct NewReferral {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub resume_url: Option<String>,
    pub resume: Option<ResumeUpload>,
}

impl From<CreateReferralRequest> for NewReferral {
    fn from(r: CreateReferralRequest) -> Self {
        Self {
            name: r.name,
            email: r.email,
            phone: r.phone,
            job_title: r.job_title,
            resume_url: r.resume_url,
            resume: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub msg: String,
    pub id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub job_title: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

/// Who referred a candidate, resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Referrer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Listing entry: the stored referral with `referredBy` expanded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub job_title: String,
    pub status: Status,
    pub resume_url: String,
    pub referred_by: Option<Referrer>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ReferralView {
    pub fn new(r: Referral, referred_by: Option<Referrer>) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            job_title: r.job_title,
            status: r.status,
            resume_url: r.resume_url,
            referred_by,
            created_at: r.created_at,
        }
    }
}
