// ABOUTME: Consent lifecycle engine for Sammati
// ABOUTME: Requests, artifacts, the append-only history ledger and the state machine

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod hash;
pub mod history;
pub mod notice;
pub mod renewals;
pub mod requests;
pub mod types;

pub use artifacts::ArtifactStorage;
pub use engine::{ConsentEngine, EngineResult};
pub use error::EngineError;
pub use hash::consent_text_hash;
pub use history::HistoryStorage;
pub use notice::{NoticeCategory, NoticePurpose, NoticeView};
pub use renewals::RenewalStorage;
pub use requests::RequestStorage;
pub use types::*;
