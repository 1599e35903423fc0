pub mod activity;
pub mod auth;
pub mod content;
pub mod dashboard;
pub mod staff;
pub mod system;
pub mod tokens;
pub mod users;
