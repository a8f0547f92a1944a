//! Configuration inspection command.

use crate::cli::Result;
use crate::config::Config;

/// Print the resolved configuration after defaults, file, and overrides.
pub fn dump(config: &Config) -> Result<()> {
    println!("{:#?}", config);
    Ok(())
}
