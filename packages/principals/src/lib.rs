// ABOUTME: Data principal registry for Sammati
// ABOUTME: Resolves external user identifiers to principal records with contact info

pub mod storage;
pub mod types;

pub use storage::PrincipalStorage;
pub use types::{DataPrincipal, PrincipalUpsertInput};
