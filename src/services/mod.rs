pub mod audit;
pub mod tokens;
