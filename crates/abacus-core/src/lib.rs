pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::AbacusConfig;
pub use error::{AbacusError, Result};
pub use events::SessionEvent;
pub use types::*;
