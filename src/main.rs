// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use colored::Colorize;
use console::Emoji;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use scrapecast::{Config, ReqwestClient, RunOptions, RunSummary, config, run};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static BELL: Emoji<'_, '_> = Emoji("🔔 ", "[!] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Scrape an episode listing page and publish it as a podcast feed
#[derive(Parser, Debug)]
#[command(name = "scrapecast")]
#[command(version, about)]
struct Args {
    /// Path to the config file.
    ///
    /// By default, scrapecast looks for `scrapecast.toml` in the current directory, then in
    /// `/etc`. Built-in defaults are used when neither exists.
    #[arg(short, long = "config", env = "SCRAPECAST_CONFIG", value_hint(ValueHint::FilePath))]
    config_path: Option<PathBuf>,

    /// Where the episode store is saved between runs
    #[arg(long, env = "SCRAPECAST_STATE", value_hint(ValueHint::FilePath))]
    state_path: Option<PathBuf>,

    /// Where the feed document is written
    #[arg(long, env = "SCRAPECAST_FEED", value_hint(ValueHint::FilePath))]
    feed_path: Option<PathBuf>,

    /// File holding the cache purge token
    #[arg(long, env = "SCRAPECAST_TOKEN", value_hint(ValueHint::FilePath))]
    token_path: Option<PathBuf>,

    /// Do not purge the cache or ping the podcast directory
    #[arg(long)]
    no_notify: bool,

    /// Quiet mode - suppress the run summary
    #[arg(short, long)]
    quiet: bool,
}

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("SCRAPECAST_LOG")
                .from_env_lossy(),
        )
        .init();
}

fn load_config(args: &mut Args) -> Result<Config> {
    fn set_if_some<T>(dst: &mut T, v: Option<T>) {
        if let Some(v) = v {
            *dst = v;
        }
    }

    let search_paths = args
        .config_path
        .take()
        .into_iter()
        .chain(["./scrapecast.toml".into(), "/etc/scrapecast.toml".into()])
        .collect::<Vec<_>>();
    let mut config = config::load(&search_paths)?;

    set_if_some(&mut config.paths.state, args.state_path.take());
    set_if_some(&mut config.paths.feed, args.feed_path.take());
    set_if_some(&mut config.paths.token, args.token_path.take());

    Ok(config)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\n{MICROPHONE}{} {} episodes, {} in feed, {} new, {} failed",
        "scrapecast:".bold().magenta(),
        summary.total_episodes.to_string().cyan(),
        summary.renderable_episodes.to_string().cyan(),
        summary.new_episodes.len().to_string().yellow(),
        if summary.failed_episodes.is_empty() {
            "0".green()
        } else {
            summary.failed_episodes.len().to_string().red().bold()
        }
    );

    for id in &summary.new_episodes {
        println!("  {SUCCESS}{}", id.green());
    }

    if !summary.failed_episodes.is_empty() {
        println!("\n{}", "Failed episodes:".red().bold());
        for (id, error) in &summary.failed_episodes {
            println!("  {}{} - {}", CROSS, id.yellow(), error.dimmed());
        }
    }

    if summary.notified {
        println!("\n{BELL}{}", "Cache purged and directory pinged".green());
    }
}

async fn start(mut args: Args) -> Result<RunSummary> {
    let config = load_config(&mut args)?;
    let client = ReqwestClient::new();
    let options = RunOptions {
        notify: !args.no_notify,
    };

    let summary = run(&client, &config, &options)
        .await
        .context("Scrape run failed")?;

    if !args.quiet {
        print_summary(&summary);
    }

    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    match start(Args::parse()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
