//! Multi-chain swap execution: ranked quote candidates driven through
//! approval, signing, broadcast and confirmation with fallback.

pub mod approval;
pub mod chain;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod quote;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
