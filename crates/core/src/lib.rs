pub mod config;
pub mod error;

pub use config::Profile;
pub use error::*;
