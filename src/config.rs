use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 work factor. Defaults mirror `argon2::Params::default()`.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// How resumes reach the server. Exactly one variant is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    /// JSON body carrying a caller supplied `resumeUrl`.
    Url,
    /// `multipart/form-data` with an optional PDF in the `resume` field.
    Upload,
}

impl FromStr for ResumeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(ResumeMode::Url),
            "upload" => Ok(ResumeMode::Upload),
            other => anyhow::bail!("unknown RESUME_MODE {other:?}, expected \"url\" or \"upload\""),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub mode: ResumeMode,
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub uploads: UploadConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "referral-tracker".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "referral-tracker-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24),
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_parse("ARGON2_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS").unwrap_or(defaults.iterations),
            parallelism: env_parse("ARGON2_PARALLELISM").unwrap_or(defaults.parallelism),
        };

        let mode = match std::env::var("RESUME_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => ResumeMode::Url,
        };
        let uploads = UploadConfig {
            mode,
            dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            max_bytes: env_parse::<usize>("MAX_UPLOAD_MB").unwrap_or(5) * 1024 * 1024,
        };

        let port = env_parse("APP_PORT")
            .or_else(|| env_parse("PORT"))
            .unwrap_or(5000);

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            jwt,
            password,
            uploads,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
