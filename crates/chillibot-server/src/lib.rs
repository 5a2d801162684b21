//! ChilliBot server
//!
//! LINE webhook receiver that answers text messages from a canned table and
//! diagnoses chilli plant photos with the vision model.

pub mod bot;
pub mod cli;
pub mod config;
pub mod line;
pub mod reply;
pub mod responder;
pub mod routes;
pub mod security;
pub mod staging;
pub mod webhook;

pub use bot::AppState;
pub use cli::Cli;
pub use config::BotConfig;
pub use routes::create_router;
