pub mod config;
pub mod token;

pub use config::Config;
pub use token::TokenRequest;
