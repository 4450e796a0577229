// ABOUTME: Versioned purpose store for Sammati
// ABOUTME: Purposes, their immutable version history and the current-version pointer

pub mod categories;
pub mod storage;
pub mod types;

pub use categories::CategoryStorage;
pub use storage::{PurposeStorage, PurposeStoreError};
pub use types::{
    Purpose, PurposeCategory, PurposeCreateInput, PurposeUpdateInput, PurposeVersion,
    PurposeWithVersion,
};
