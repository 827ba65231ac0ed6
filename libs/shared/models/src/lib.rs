pub mod appointment;
pub mod auth;
pub mod billing;
pub mod codes;
pub mod directory;
pub mod error;
pub mod response;
