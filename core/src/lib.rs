pub mod bot;
pub mod chat;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod gateway;
pub mod ipc;
pub mod logging;
pub mod record;
pub mod session;
pub mod taunts;

pub use bot::Bot;
pub use config::Config;
pub use record::{Record, RecordStore};
pub use session::{SessionState, SessionTracker, Timing};
pub use taunts::TauntCatalog;
