use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{Referral, ReferralFilter, ReferralRow, Status};

/// Referral store. Single-record writes only; concurrent updates are last-write-wins.
#[async_trait]
pub trait ReferralRepo: Send + Sync {
    async fn insert(&self, referral: &Referral) -> anyhow::Result<()>;
    /// Newest first, ties broken by id descending.
    async fn list(&self, filter: &ReferralFilter) -> anyhow::Result<Vec<Referral>>;
    async fn update_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Referral>>;
    /// Returns the removed record, or `None` when nothing matched.
    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Referral>>;
    /// Whether any stored referral still points at the stored file `key`.
    async fn resume_key_in_use(&self, key: &str) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgReferralRepo {
    db: PgPool,
}

impl PgReferralRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferralRepo for PgReferralRepo {
    async fn insert(&self, r: &Referral) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candidates
                (id, name, email, phone, job_title, status, resume_url, resume_key, referred_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(r.id)
        .bind(&r.name)
        .bind(&r.email)
        .bind(&r.phone)
        .bind(&r.job_title)
        .bind(r.status.as_str())
        .bind(&r.resume_url)
        .bind(r.resume_key.as_deref())
        .bind(r.referred_by)
        .bind(r.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list(&self, filter: &ReferralFilter) -> anyhow::Result<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(
            r#"
            SELECT id, name, email, phone, job_title, status, resume_url, resume_key, referred_by, created_at
            FROM candidates
            WHERE ($1::text IS NULL OR strpos(lower(job_title), lower($1)) > 0)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(filter.job_title.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Referral::try_from).collect()
    }

    async fn update_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Referral>> {
        let row = sqlx::query_as::<_, ReferralRow>(
            r#"
            UPDATE candidates
               SET status = $2
             WHERE id = $1
            RETURNING id, name, email, phone, job_title, status, resume_url, resume_key, referred_by, created_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(Referral::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Referral>> {
        let row = sqlx::query_as::<_, ReferralRow>(
            r#"
            DELETE FROM candidates
             WHERE id = $1
            RETURNING id, name, email, phone, job_title, status, resume_url, resume_key, referred_by, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Referral::try_from).transpose()
    }

    async fn resume_key_in_use(&self, key: &str) -> anyhow::Result<bool> {
        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM candidates WHERE resume_key = $1)")
                .bind(key)
                .fetch_one(&self.db)
                .await?;
        Ok(in_use)
    }
}

#[derive(Clone, Default)]
pub struct MemoryReferralRepo {
    rows: Arc<RwLock<HashMap<Uuid, Referral>>>,
}

impl MemoryReferralRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<Referral> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ReferralRepo for MemoryReferralRepo {
    async fn insert(&self, r: &Referral) -> anyhow::Result<()> {
        let mut rows = self.rows.write().await;
        anyhow::ensure!(!rows.contains_key(&r.id), "duplicate referral id {}", r.id);
        rows.insert(r.id, r.clone());
        Ok(())
    }

    async fn list(&self, filter: &ReferralFilter) -> anyhow::Result<Vec<Referral>> {
        let mut out: Vec<Referral> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| Reverse((r.created_at, r.id)));
        Ok(out)
    }

    async fn update_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Referral>> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|r| {
            r.status = status;
            r.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Referral>> {
        Ok(self.rows.write().await.remove(&id))
    }

    async fn resume_key_in_use(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .any(|r| r.resume_key.as_deref() == Some(key)))
    }
}
