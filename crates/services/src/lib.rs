#![forbid(unsafe_code)]

pub mod config;
pub mod conversation_store;
pub mod error;
pub mod ledger;
pub mod progress_store;

pub use tutor_core::Clock;

pub use config::{DEFAULT_TUTOR_LATENCY, LedgerConfig};
pub use conversation_store::ConversationStore;
pub use error::{LedgerError, LedgerInitError};
pub use ledger::{Ledger, LearnerOverview, PendingReply, Session};
pub use progress_store::ProgressStore;
