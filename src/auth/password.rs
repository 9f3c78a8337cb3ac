use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

/// Argon2id hashing with a configurable work factor.
///
/// Hashing is CPU bound, so the async entry points hop onto the blocking pool.
#[derive(Clone)]
pub struct PasswordPolicy {
    params: Params,
    // Verified against when the email is unknown, so both login failures cost the same.
    dummy_hash: Arc<str>,
}

impl PasswordPolicy {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let dummy_hash = hash_password(&params, "referral-tracker-placeholder")?;
        Ok(Self {
            params,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub async fn hash(&self, plain: String) -> anyhow::Result<String> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || hash_password(&params, &plain))
            .await
            .context("hash task panicked")?
    }

    pub async fn verify(&self, plain: String, hash: String) -> anyhow::Result<bool> {
        tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .context("verify task panicked")?
    }

    /// Burns one verification's worth of time and always reports a mismatch.
    pub async fn verify_dummy(&self, plain: String) -> anyhow::Result<bool> {
        let hash = self.dummy_hash.to_string();
        self.verify(plain, hash).await.map(|_| false)
    }
}

fn hasher(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

pub fn hash_password(params: &Params, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(params)
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Params are read back from the PHC string, so hashes made under an older work factor still verify.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
