//! `intake config`

use admissions_intake::config::IntakeConfig;
use anyhow::Result;
use clap::Args;

/// Print the effective configuration as TOML
#[derive(Debug, Args)]
pub struct ConfigCommand {
    /// Print the default configuration instead of the loaded one
    #[arg(long)]
    pub defaults: bool,
}

impl ConfigCommand {
    /// Prints the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be rendered as TOML.
    pub fn execute(&self, config: &IntakeConfig) -> Result<()> {
        let rendered = if self.defaults {
            IntakeConfig::default().to_toml()?
        } else {
            config.to_toml()?
        };
        print!("{rendered}");
        Ok(())
    }
}
