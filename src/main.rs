// Module declarations
mod cli;
mod types;
mod util;
mod error;
mod config;
mod gemini;
mod keywords;
mod slack;
mod search;
mod resolver;
mod synth;
mod blocks;
mod controller;
mod bridge;

// Re-export all module items at crate root so cross-module references work
// through a single namespace.
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use gemini::*;
#[allow(unused_imports)]
pub(crate) use keywords::*;
#[allow(unused_imports)]
pub(crate) use slack::*;
#[allow(unused_imports)]
pub(crate) use search::*;
#[allow(unused_imports)]
pub(crate) use resolver::*;
#[allow(unused_imports)]
pub(crate) use synth::*;
#[allow(unused_imports)]
pub(crate) use blocks::*;
#[allow(unused_imports)]
pub(crate) use controller::*;
#[allow(unused_imports)]
pub(crate) use bridge::*;

use clap::Parser;

fn print_map_text(report: &MapReport) {
    println!("Keywords: {}", report.terms.join(", "));
    println!(
        "Evidence: {} messages, {} files",
        report.message_results, report.file_results
    );

    let map = &report.map;
    if map.is_empty() {
        println!("No clear experts or channels found for this topic.");
        return;
    }

    if !map.summary.is_empty() {
        println!("\nSummary: {}", map.summary);
    }
    if !map.experts.is_empty() {
        println!("\nExperts:");
        for expert in &map.experts {
            let id = if expert.user_id.is_empty() {
                String::new()
            } else {
                format!(" ({})", expert.user_id)
            };
            println!("  - {}{id}: {}", expert.name, expert.reason);
        }
    }
    if !map.channels.is_empty() {
        println!("\nChannels:");
        for channel in &map.channels {
            let id = if channel.channel_id.is_empty() {
                String::new()
            } else {
                format!(" ({})", channel.channel_id)
            };
            println!("  - {}{id}: {}", channel.name, channel.reason);
        }
    }
    if !map.files.is_empty() {
        println!("\nFiles:");
        for file in &map.files {
            println!("  - {} <{}>: {}", file.file_name, file.permalink, file.reason);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => {
            let config = BotConfig::from_env()?;
            run_bridge(config)?;
            Ok(())
        }

        Command::Keywords { text } => {
            let model = GeminiClient::from_env(DEFAULT_HTTP_TIMEOUT_MS)?;
            let terms = extract_keywords(&model, &text);
            if terms.is_empty() {
                eprintln!("No keywords extracted.");
                std::process::exit(1);
            }
            for term in terms {
                println!("{term}");
            }
            Ok(())
        }

        Command::Map {
            text,
            limit,
            files,
            json,
        } => {
            let model = GeminiClient::from_env(DEFAULT_HTTP_TIMEOUT_MS)?;
            let user_token = env_required("SLACK_USER_TOKEN")?;
            let agent = build_http_agent(DEFAULT_HTTP_TIMEOUT_MS);
            let search = SlackSearchClient::new(agent, user_token);
            let names = NameCache::new();

            let terms = extract_keywords(&model, &text);
            if terms.is_empty() {
                eprintln!("Could not extract search keywords from the message.");
                std::process::exit(1);
            }

            let evidence = gather_messages(&search, &names, &terms, limit)?;
            let file_evidence = if files {
                gather_files(&search, &names, &terms, FILE_CAP)?
            } else {
                Vec::new()
            };

            let map = synthesize(&model, &text, &evidence, &file_evidence);
            let map = backfill(map, &evidence);

            let report = MapReport {
                query: text,
                terms,
                message_results: evidence.len(),
                file_results: file_evidence.len(),
                map,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_map_text(&report);
            }
            Ok(())
        }
    }
}
