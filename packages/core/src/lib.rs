// ABOUTME: Core constants and utilities for Sammati
// ABOUTME: Foundational package providing shared functionality across all Sammati packages

pub mod constants;
pub mod utils;

// Re-export constants
pub use constants::{
    BULK_VALIDATE_MAX_ITEMS, DEFAULT_REMINDER_WINDOW_DAYS, DEFAULT_REQUEST_TTL_MINUTES,
    MAX_REQUEST_TTL_MINUTES, MIN_REQUEST_TTL_MINUTES,
};

// Re-export utilities
pub use utils::new_id;
