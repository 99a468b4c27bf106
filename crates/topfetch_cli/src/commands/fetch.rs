//! Fetch top tracks and artists and write them to JSON files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::{Term, style};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value, json};

use topfetch::fetch::{FetchOutcome, FetchRequest, ItemType, TimeRange, TopItemsClient};
use topfetch::rate_limit::ApiRateLimiter;

use crate::commands::shared;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Resolved options for one fetch run (flags over config).
#[derive(Debug, Clone)]
pub(crate) struct FetchOptions {
    pub time_range: TimeRange,
    pub keep_markets: bool,
    pub output_dir: PathBuf,
    pub page_size: usize,
    pub concurrency: usize,
    pub max_items: Option<usize>,
    pub requests_per_second: Option<u32>,
    pub open_browser: bool,
}

pub(crate) async fn handle_fetch(
    options: FetchOptions,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let is_tty = Term::stdout().is_term();
    let transport = shared::transport()?;

    let credentials = config.client_credentials()?;
    if is_tty {
        println!(
            "{} Client ID: {}",
            style("✓").green(),
            shared::mask(&credentials.client_id)
        );
    }

    let auth = shared::authenticator(config, credentials, Arc::clone(&transport))?;
    let token = auth
        .access_token(&shared::browser_prompt(options.open_browser, is_tty))
        .await?;

    if is_tty {
        println!("{} Authenticated\n", style("✓").green());
    }

    let client = TopItemsClient::new(transport, token)
        .with_rate_limiter(options.requests_per_second.map(ApiRateLimiter::new));

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let request = |item_type| {
        FetchRequest::new(item_type, options.time_range)
            .with_page_size(options.page_size)
            .with_concurrency(options.concurrency)
            .with_max_items(options.max_items)
    };

    let tracks = client
        .fetch_all::<Value>(&request(ItemType::Tracks), Some(&callback))
        .await;
    let mut tracks = match tracks {
        Ok(outcome) => outcome,
        Err(e) => {
            reporter.finish();
            return Err(e.into());
        }
    };

    let artists = client
        .fetch_all::<Value>(&request(ItemType::Artists), Some(&callback))
        .await;
    reporter.finish();
    let artists = artists?;

    if !options.keep_markets {
        tracing::debug!("Removing available_markets from tracks");
        strip_markets(&mut tracks.items);
    }

    fs::create_dir_all(&options.output_dir)?;
    let tracks_path = options
        .output_dir
        .join(output_file_name(ItemType::Tracks, options.time_range));
    let artists_path = options
        .output_dir
        .join(output_file_name(ItemType::Artists, options.time_range));

    write_items(&tracks_path, &tracks.items)?;
    write_items(&artists_path, &artists.items)?;

    if is_tty {
        print_summary(
            options.time_range,
            (&tracks, &tracks_path),
            (&artists, &artists_path),
        );
    } else {
        tracing::info!(
            tracks = tracks.items.len(),
            artists = artists.items.len(),
            time_range = %options.time_range,
            tracks_file = %tracks_path.display(),
            artists_file = %artists_path.display(),
            "Fetch completed"
        );
    }

    for (item_type, outcome) in [(ItemType::Tracks, &tracks), (ItemType::Artists, &artists)] {
        if !outcome.is_complete() {
            let offsets: Vec<String> = outcome
                .failures
                .iter()
                .map(|f| f.offset.to_string())
                .collect();
            tracing::warn!(
                %item_type,
                missing = outcome.missing(),
                offsets = %offsets.join(", "),
                "Some pages could not be fetched; the saved file is incomplete"
            );
            if is_tty {
                println!(
                    "{} {} {} missing (failed offsets: {})",
                    style("⚠").yellow(),
                    outcome.missing(),
                    item_type,
                    offsets.join(", ")
                );
            }
        }
    }

    Ok(())
}

/// `top_tracks_short_term.json` and friends.
pub(crate) fn output_file_name(item_type: ItemType, time_range: TimeRange) -> String {
    format!("top_{}_{}.json", item_type, time_range)
}

/// Drop `available_markets` from each track and its album.
pub(crate) fn strip_markets(tracks: &mut [Value]) {
    for track in tracks.iter_mut().filter_map(Value::as_object_mut) {
        track.remove("available_markets");
        if let Some(album) = track.get_mut("album").and_then(Value::as_object_mut) {
            album.remove("available_markets");
        }
    }
}

/// Write `{"items": [...]}` as JSON indented by four spaces.
fn write_items(path: &Path, items: &[Value]) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = Vec::new();
    let mut ser = Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"    "));
    json!({ "items": items }).serialize(&mut ser)?;
    fs::write(path, body)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// `Name - Artist, Artist` for a track object.
fn describe_track(track: &Value) -> String {
    let name = track["name"].as_str().unwrap_or("?");
    let artists: Vec<&str> = track["artists"]
        .as_array()
        .map(|a| a.iter().filter_map(|x| x["name"].as_str()).collect())
        .unwrap_or_default();
    if artists.is_empty() {
        name.to_string()
    } else {
        format!("{} - {}", name, artists.join(", "))
    }
}

fn print_summary(
    time_range: TimeRange,
    (tracks, tracks_path): (&FetchOutcome<Value>, &Path),
    (artists, artists_path): (&FetchOutcome<Value>, &Path),
) {
    println!("\n{}", style("Fetch completed").green().bold());
    println!(
        "  Tracks:  {} fetched → {}",
        tracks.items.len(),
        tracks_path.display()
    );
    println!(
        "  Artists: {} fetched → {}",
        artists.items.len(),
        artists_path.display()
    );
    println!("  Period:  {} ({})", time_range, time_range.description());

    if !tracks.items.is_empty() {
        println!("\n{}", style("Top 5 tracks").bold());
        for (i, track) in tracks.items.iter().take(5).enumerate() {
            println!("  {}. {}", i + 1, describe_track(track));
        }
    }

    if !artists.items.is_empty() {
        println!("\n{}", style("Top 5 artists").bold());
        for (i, artist) in artists.items.iter().take(5).enumerate() {
            println!("  {}. {}", i + 1, artist["name"].as_str().unwrap_or("?"));
        }
    }
}
