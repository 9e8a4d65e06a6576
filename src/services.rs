pub mod auth;
pub mod events;
pub mod history_service;
pub mod session_service;
pub mod sweeper;
pub mod transfer_service;
