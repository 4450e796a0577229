// ABOUTME: Data fiduciary records for Sammati
// ABOUTME: Lookup of webhook URLs and active flags; onboarding CRUD lives elsewhere

pub mod storage;
pub mod types;

pub use storage::FiduciaryStorage;
pub use types::{DataFiduciary, FiduciaryCreateInput};
