//! Configuration: mcphub's own settings, the application key-value store and
//! edits of agent configuration files.

pub mod agent_file;
pub mod parser;
pub mod paths;
pub mod settings;
pub mod store;

pub use agent_file::{AgentConfigFile, ConfigFormat};
pub use parser::{parse_settings, parse_settings_str, to_toml};
pub use settings::{AgentOverride, DetectionSettings, Settings, Timeouts};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
