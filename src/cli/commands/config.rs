//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{StrataError, StrataResult};
use crate::ui::{self, UiContext};

/// Keys accepted by `config set`
const VALID_KEYS: [&str; 9] = [
    "general.log_format",
    "server.listen",
    "server.dev",
    "server.max_age_secs",
    "cache.capacity",
    "cache.ttl_secs",
    "analyzer.engine",
    "analyzer.pull",
    "analyzer.top_inefficiencies",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> StrataResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut updated = config.clone();
            set_value(&mut updated, &key, &value)?;
            manager.save(&updated).await?;
            ui::step_ok_detail(
                &UiContext::detect(),
                &format!("Set {} = {}", key, value),
                &manager.path().display().to_string(),
            );
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> StrataResult<()> {
    let toml = toml::to_string_pretty(config)?;
    println!("{}", toml);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> StrataResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// Apply a dot-separated key to the configuration
fn set_value(config: &mut Config, key: &str, value: &str) -> StrataResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(StrataError::User(format!(
                    "Invalid log format: {}. Use text or json",
                    value
                )))
            }
        },

        ["server", "listen"] => config.server.listen = value.to_string(),
        ["server", "dev"] => config.server.dev = parse_bool(value)?,
        ["server", "max_age_secs"] => config.server.max_age_secs = parse_number(value)?,

        ["cache", "capacity"] => config.cache.capacity = parse_number(value)?,
        ["cache", "ttl_secs"] => config.cache.ttl_secs = parse_number(value)?,

        ["analyzer", "engine"] => config.analyzer.engine = value.to_string(),
        ["analyzer", "pull"] => config.analyzer.pull = parse_bool(value)?,
        ["analyzer", "top_inefficiencies"] => {
            config.analyzer.top_inefficiencies = parse_number(value)?
        }

        _ => {
            return Err(StrataError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> StrataResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(StrataError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> StrataResult<T> {
    value
        .parse()
        .map_err(|_| StrataError::User(format!("Invalid number: {}", value)))
}
