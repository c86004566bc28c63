pub mod auth;
pub mod login;
pub mod registry;
