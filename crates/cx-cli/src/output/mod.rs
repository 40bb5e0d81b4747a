//! Output formatting utilities for the CLI
//!
//! Coloured status lines for the terminal and a table summarising what a
//! teardown removed.

use tabled::{settings::Style, Table, Tabled};

use cx_tunnel::{CleanupReport, TerminateOutcome};

/// Render a cleanup report as a two-column table
pub fn format_cleanup_report(report: &CleanupReport) -> String {
    if !report.performed {
        return "Cleanup already handled elsewhere".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "RESOURCE")]
        resource: &'static str,
        #[tabled(rename = "RESULT")]
        result: String,
    }

    let connector = match report.connector {
        None => "not running".to_string(),
        Some(TerminateOutcome::AlreadyExited) => "already exited".to_string(),
        Some(TerminateOutcome::Graceful(status)) => format!("stopped ({})", status),
        Some(TerminateOutcome::Killed) => "killed after grace period".to_string(),
    };

    let rows = vec![
        Row {
            resource: "connector",
            result: connector,
        },
        Row {
            resource: "dns record",
            result: deleted(report.dns_record_deleted),
        },
        Row {
            resource: "tunnel",
            result: deleted(report.tunnel_deleted),
        },
    ];

    let mut out = Table::new(rows).with(Style::rounded()).to_string();
    for failure in &report.failures {
        out.push_str(&format!("\nfailed: {}", failure));
    }
    out
}

fn deleted(flag: bool) -> String {
    if flag { "deleted" } else { "not found" }.to_string()
}

/// Print the public URL banner
pub fn print_url(url: &str) {
    use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        Print("\n  "),
        SetForegroundColor(Color::Green),
        SetAttribute(Attribute::Bold),
        Print(url),
        SetAttribute(Attribute::Reset),
        ResetColor,
        Print("\n\n")
    );
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
