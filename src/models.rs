pub mod auth;
pub mod inventory;
pub mod session;
pub mod transfer;
