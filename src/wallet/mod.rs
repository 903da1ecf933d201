pub mod stats;
pub mod sync;
pub mod types;
pub mod wallet_set;

pub use sync::SyncSession;
pub use types::*;
