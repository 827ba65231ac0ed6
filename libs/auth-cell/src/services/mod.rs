pub mod auth;

pub use auth::{ensure_bootstrap_admin, AuthService};
