// file: src/wizard/mod.rs
// version: 1.0.0
// guid: 4c7d9e13-6a2f-48b1-9c54-d08e3f61b7a4

//! Interactive prompts for the values the fact collector could not settle
//!
//! Every prompt pre-fills the value already on the session, so accepting the
//! defaults reproduces the non-interactive run.

use crate::session::InstallSession;
use crate::{BootstrapError, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

/// Walk the operator through the installation parameters
pub fn run(session: &mut InstallSession) -> Result<()> {
    let theme = ColorfulTheme::default();

    session.timezone = Input::with_theme(&theme)
        .with_prompt("Timezone")
        .default(session.timezone.clone())
        .interact_text()
        .map_err(wizard_error)?;

    // A default is only offered when discovery produced a value; with no
    // default, an empty answer re-prompts instead of being accepted.
    let mut interface_prompt = Input::with_theme(&theme).with_prompt("Network interface");
    if let Some(interface) = prompt_default(session.interface.as_deref()) {
        interface_prompt = interface_prompt.default(interface);
    }
    let interface: String = interface_prompt.interact_text().map_err(wizard_error)?;
    session.interface = Some(interface);

    let mut fqdn_prompt = Input::with_theme(&theme).with_prompt("Server FQDN");
    if let Some(fqdn) = prompt_default(session.server_fqdn.as_deref()) {
        fqdn_prompt = fqdn_prompt.default(fqdn);
    }
    let fqdn: String = fqdn_prompt.interact_text().map_err(wizard_error)?;
    session.server_fqdn = Some(fqdn);

    let has_public_ip = Confirm::with_theme(&theme)
        .with_prompt("Is the server reachable on a public IP?")
        .default(session.public_ip.is_some())
        .interact()
        .map_err(wizard_error)?;
    if has_public_ip {
        let mut ip_prompt = Input::with_theme(&theme).with_prompt("Public IP").validate_with(
            |value: &String| -> std::result::Result<(), String> {
                value
                    .parse::<std::net::IpAddr>()
                    .map(|_| ())
                    .map_err(|_| format!("'{value}' is not a valid IP address"))
            },
        );
        if let Some(ip) = prompt_default(session.public_ip.as_deref()) {
            ip_prompt = ip_prompt.default(ip);
        }
        let public_ip: String = ip_prompt.interact_text().map_err(wizard_error)?;
        session.public_ip = Some(public_ip);
    } else {
        session.public_ip = None;
    }

    let set_password = Confirm::with_theme(&theme)
        .with_prompt("Set the root application password yourself? (generated otherwise)")
        .default(session.root_password.is_some())
        .interact()
        .map_err(wizard_error)?;
    if set_password {
        let password = Password::with_theme(&theme)
            .with_prompt("Root application password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .map_err(wizard_error)?;
        session.root_password = Some(password);
    }

    Ok(())
}

fn wizard_error(err: dialoguer::Error) -> BootstrapError {
    BootstrapError::config(format!("interactive prompt failed: {err}"))
}

/// Default offered to a prompt: only a real discovered value qualifies
fn prompt_default(current: Option<&str>) -> Option<String> {
    current
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
