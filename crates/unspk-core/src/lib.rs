pub mod config;
pub mod error;
pub mod keys;
pub mod output;

pub use error::{UnspkError, UnspkResult};
