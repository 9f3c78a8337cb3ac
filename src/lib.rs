pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod referrals;
pub mod state;
pub mod storage;
pub mod validation;

pub use app::build_app;
pub use state::AppState;
