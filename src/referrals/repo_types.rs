use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Review lifecycle of a referral. Nothing outside these three values is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Reviewed,
    Hired,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Pending, Status::Reviewed, Status::Hired];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Reviewed => "Reviewed",
            Status::Hired => "Hired",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match; "hired" is not a status.
impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown status {s:?}"))
    }
}

/// Stored candidate referral.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub job_title: String,
    pub status: Status,
    pub resume_url: String, // empty when no resume was given
    /// Storage key of a file this server wrote. Caller-supplied URLs never set it.
    #[serde(skip)]
    pub resume_key: Option<String>,
    pub referred_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct ReferralRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub job_title: String,
    pub status: String,
    pub resume_url: String,
    pub resume_key: Option<String>,
    pub referred_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<ReferralRow> for Referral {
    type Error = anyhow::Error;

    fn try_from(r: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            job_title: r.job_title,
            status: r.status.parse()?,
            resume_url: r.resume_url,
            resume_key: r.resume_key,
            referred_by: r.referred_by,
            created_at: r.created_at,
        })
    }
}

/// Listing filters. `None` means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct ReferralFilter {
    pub job_title: Option<String>,
    pub status: Option<Status>,
}

impl ReferralFilter {
    pub fn matches(&self, r: &Referral) -> bool {
        let title_ok = self.job_title.as_deref().map_or(true, |needle| {
            r.job_title.to_lowercase().contains(&needle.to_lowercase())
        });
        let status_ok = self.status.map_or(true, |s| r.status == s);
        title_ok && status_ok
    }
}
