//! Connector installation probe
//!
//! Detects whether the `cloudflared` connector is installed and tells the
//! user how to install it when it is not.

use std::process::Command;

use crate::error::ConfigError;

/// Default connector executable name, resolved from `PATH`
pub const DEFAULT_CONNECTOR: &str = "cloudflared";

/// Check if the connector executable can be run
pub fn is_connector_installed(program: &str) -> bool {
    connector_version(program).is_some()
}

/// First line of `<program> --version`, if the program runs
pub fn connector_version(program: &str) -> Option<String> {
    let output = Command::new(program).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or_default().trim().to_string();
    Some(line)
}

/// Fail with [`ConfigError::ConnectorNotInstalled`] unless the connector runs
pub fn ensure_connector_installed(program: &str) -> Result<String, ConfigError> {
    connector_version(program).ok_or_else(|| ConfigError::ConnectorNotInstalled(program.to_string()))
}

/// Get platform-specific connector installation instructions
pub fn get_install_instructions() -> String {
    #[cfg(target_os = "macos")]
    {
        r#"cloudflared is not installed. Install it with:

    brew install cloudflared

Or download from: https://developers.cloudflare.com/cloudflare-one/connections/connect-networks/downloads/"#
            .to_string()
    }

    #[cfg(target_os = "linux")]
    {
        r#"cloudflared is not installed. Download the package for your distribution from:

    https://github.com/cloudflare/cloudflared/releases/latest

Debian/Ubuntu example:
    curl -L -o cloudflared.deb https://github.com/cloudflare/cloudflared/releases/latest/download/cloudflared-linux-amd64.deb
    sudo dpkg -i cloudflared.deb"#
            .to_string()
    }

    #[cfg(target_os = "windows")]
    {
        r#"cloudflared is not installed. Install it with:

    winget install --id Cloudflare.cloudflared"#
            .to_string()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        r#"cloudflared is not installed. Visit https://github.com/cloudflare/cloudflared/releases for downloads."#.to_string()
    }
}
