//! Configuration loading and validation.
//!
//! Configuration is read from an INI file with three sections: `[fs]` for
//! the filesystem driver, `[gitlab]` for the remote endpoint and the set of
//! root groups/users, and `[git]` for the working copies and the sync
//! engine. Defaults cover every key; validation failures are fatal.

mod read_config;
mod types;

pub use read_config::{read_config, ConfigError, ConfigResult, ConfigSource, Result};
pub use types::{CloneMethod, Config, FsConfig, GitConfig, GitlabConfig, PullMethod};
