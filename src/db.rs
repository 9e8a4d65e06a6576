pub mod user_repo;
pub use user_repo::{PgUserRepository, UserStore};
pub mod session_repo;
pub use session_repo::{PgSessionRepository, SessionStore};
pub mod inventory_repo;
pub use inventory_repo::{CompletionOutcome, InventoryStore, PgInventoryRepository};
pub mod transfer_repo;
pub use transfer_repo::{PgTransferRepository, TransferStore};
pub mod memory;
pub use memory::MemStore;
