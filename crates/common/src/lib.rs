pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{BotFileConfig, Config, PolicyConfig, TraderConfig};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use types::*;
