//! Show what is stored locally, without touching the network.

use chrono::{DateTime, Local};
use console::style;

use topfetch::oauth::{ClientCredentials, CredentialStatus};

use crate::commands::shared;
use crate::config::Config;

pub(crate) fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match config.client_credentials() {
        Ok(credentials) => println!(
            "Client ID:     {} ({})",
            shared::mask(&credentials.client_id),
            style("configured").green()
        ),
        Err(_) => println!("Client ID:     {}", style("not configured").red()),
    }
    if config.spotify.refresh_token.is_some() {
        println!("Refresh token: supplied by configuration");
    }

    // Status only reads the store, so placeholder credentials are enough.
    let auth = shared::authenticator(
        config,
        ClientCredentials::new("", ""),
        shared::transport()?,
    )?;
    if let Some(path) = config.token_file() {
        println!("Token file:    {}", path.display());
    }

    for line in describe_status(&auth.status()?) {
        println!("{line}");
    }

    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    DateTime::from_timestamp(secs as i64, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn format_remaining(secs: u64) -> String {
    match (secs / 3600, (secs % 3600) / 60) {
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}

fn describe_status(status: &CredentialStatus) -> Vec<String> {
    match status {
        CredentialStatus::Missing => vec![format!(
            "Credentials:   {} (run `topfetch login`)",
            style("none stored").yellow()
        )],
        CredentialStatus::Stored {
            expires_at,
            expires_in,
            expired,
            has_refresh_token,
            scope,
        } => {
            let state = if *expired {
                style("expired".to_string()).yellow()
            } else {
                style(format!("valid for {}", format_remaining(*expires_in))).green()
            };
            vec![
                format!("Access token:  {} (expires {})", state, format_timestamp(*expires_at)),
                format!(
                    "Refresh token: {}",
                    if *has_refresh_token { "stored" } else { "none" }
                ),
                format!("Scope:         {}", scope.as_deref().unwrap_or("-")),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(59), "0m");
        assert_eq!(format_remaining(3599), "59m");
        assert_eq!(format_remaining(3 * 3600 + 120), "3h 2m");
    }

    #[test]
    fn test_describe_missing() {
        let lines = describe_status(&CredentialStatus::Missing);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("topfetch login"));
    }

    #[test]
    fn test_describe_stored() {
        let lines = describe_status(&CredentialStatus::Stored {
            expires_at: 1_700_000_000,
            expires_in: 0,
            expired: true,
            has_refresh_token: true,
            scope: Some("user-top-read".into()),
        });
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("expired"));
        assert!(lines[1].ends_with("stored"));
        assert!(lines[2].ends_with("user-top-read"));
    }
}
