// file: src/report/mod.rs
// version: 1.0.0
// guid: b2e61f84-03ac-47d5-8f2e-6c91d47a50b9

//! Final operator-facing output
//!
//! Everything printed here goes to stdout/stderr directly rather than the
//! log, so it survives a quiet run.

use crate::session::InstallSession;
use colored::Colorize;

/// Closing report after a successful bootstrap
pub fn print_success(session: &InstallSession) {
    println!();
    println!("{}", "Installation complete".green().bold());
    println!();
    for line in success_lines(session) {
        println!("  {line}");
    }
    println!();
}

/// Content of the success report, colour-free for assertions
pub fn success_lines(session: &InstallSession) -> Vec<String> {
    let fqdn = session
        .server_fqdn
        .as_deref()
        .unwrap_or("<server-fqdn>");
    let mut lines = vec![
        format!("Management console:  https://{fqdn}/mmc"),
        format!("Agent installers:    https://{fqdn}/downloads/"),
        format!(
            "Vault password file: {} (keep it safe; it unlocks every generated secret)",
            session.vault_password_file().display()
        ),
        format!("Inventory:           {}", session.inventory_path().display()),
    ];
    if let Some(public_ip) = &session.public_ip {
        lines.push(format!("Public address:      {public_ip}"));
    }
    lines.push(String::new());
    lines.push("Next steps:".to_string());
    lines.push("  1. Log in to the console with user 'root' and the generated password".to_string());
    lines.push("  2. Deploy the agent installers to the machines to manage".to_string());
    lines.push("  3. Back up the vault password file off this machine".to_string());
    lines
}

/// Diagnostic banner for a fatal stage failure
pub fn print_failure(stage: &str, error: &crate::BootstrapError) {
    eprintln!();
    eprintln!(
        "{} {}",
        "Installation failed during:".red().bold(),
        stage.red().bold()
    );
    eprintln!();
    eprintln!("  {error}");
    eprintln!();
    eprintln!(
        "  Fix the reported problem and rerun; pass {} to review every",
        "--interactive".yellow()
    );
    eprintln!("  parameter before the installation starts again.");
    eprintln!();
}
