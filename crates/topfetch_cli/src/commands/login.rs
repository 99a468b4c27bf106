//! Force a fresh interactive authorization.

use chrono::{DateTime, Local};
use console::{Term, style};

use crate::commands::shared;
use crate::config::Config;

pub(crate) async fn handle_login(
    config: &Config,
    open_browser: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let is_tty = Term::stdout().is_term();
    let credentials = config.client_credentials()?;
    let auth = shared::authenticator(config, credentials, shared::transport()?)?;

    let record = auth
        .login(&shared::browser_prompt(open_browser, is_tty))
        .await?;

    let expires = DateTime::from_timestamp(record.expires_at as i64, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.expires_at.to_string());

    if is_tty {
        println!("\n{} Authorization complete", style("✓").green().bold());
        println!("  Access token expires: {}", expires);
        if record.refresh_token.is_none() {
            println!(
                "  {} No refresh token was issued; the next run will prompt again.",
                style("!").yellow()
            );
        }
    } else {
        tracing::info!(
            expires_at = %expires,
            has_refresh_token = record.refresh_token.is_some(),
            "Authorization complete"
        );
    }

    Ok(())
}
