use crate::output::OutputFormat;
use anyhow::Result;
use hamtab_xtab_core::XtabConfig;

/// Print the effective configuration: TOML for humans (ready to save as a
/// config file), JSON otherwise.
pub fn execute(config: &XtabConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => print!("{}", toml::to_string_pretty(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
