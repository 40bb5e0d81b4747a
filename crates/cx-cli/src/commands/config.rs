//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use cx_core::config;

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Print the config file location
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Get a config value by dotted key, e.g. `tunnel.local_port`
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'cf-expose config init' to create one");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let table: toml::Table =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let mut current: &toml::Value = &toml::Value::Table(table);
    for part in key.split('.') {
        match current.as_table().and_then(|t| t.get(part)) {
            Some(v) => current = v,
            None => {
                print_error(&format!("Key not found: {}", key));
                return Ok(());
            }
        }
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Array(a) => {
            for item in a {
                println!("{}", item);
            }
        }
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(current)?),
        other => println!("{}", other),
    }

    Ok(())
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Using built-in defaults:");
        println!();
        println!("{}", generate_default_config());
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = resolve_path(config_path);

    if let Some(config_dir) = config_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!("Failed to create config directory: {:?}", config_dir)
            })?;
            print_success(&format!("Created config directory: {:?}", config_dir));
        }
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, generate_default_config())
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    print_info(&format!(
        "Set {}, {} and {} in the environment or a .env file",
        config::ENV_API_TOKEN,
        config::ENV_ACCOUNT_ID,
        config::ENV_ZONE_ID
    ));

    Ok(())
}

/// Generate default configuration content
fn generate_default_config() -> String {
    r#"# cf-expose configuration

[tunnel]
# Zone the public hostname is created under
base_domain = "cfsedev.org"

# Port of the local HTTP service
local_port = 8000

# Tunnel names are "<prefix>-<unix timestamp>"
name_prefix = "cf-expose"

api_base_url = "https://api.cloudflare.com/client/v4"

# Per-request API timeout in seconds
api_timeout = 30

# Seconds the connector gets to exit after SIGTERM before it is killed
grace_period = 5

connector_program = "cloudflared"
connector_args = ["tunnel", "run", "--token"]

[tunnel.subdomain]
# "static" uses `name`; "random" picks a 4-letter prefix per run
mode = "static"
name = "apiparser"

[service]
# Command launching the local service, e.g. ["flask", "run", "--port=8000"].
# Leave empty when the service is started separately.
command = []

# Seconds to wait for the service port to accept connections
readiness_timeout = 30
poll_interval_ms = 250
"#
    .to_string()
}
