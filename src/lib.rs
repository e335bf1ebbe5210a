pub mod config;
pub mod drift;
pub mod output;
pub mod resource;
pub mod scanner;
pub mod session;
pub mod types;
