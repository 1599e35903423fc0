//! Row types for the two table families this service touches:
//! platform-owned tables (integer keys, read-mostly) and admin-owned tables
//! (UUID keys, created and written by this dashboard).

pub mod audit;
pub mod content;
pub mod jobs;
pub mod staff;
pub mod system;
pub mod tokens;
pub mod user;
