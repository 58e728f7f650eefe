use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchboard_core::{Query, RouteError, Router, RoutedAnswer, RoutingHistory};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod tools;

use config::SwitchboardConfig;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Switchboard - route questions to the agent best able to answer them")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Route a question and print the answer
    Ask {
        /// The question to route
        query: String,

        /// Session id echoed back with the answer
        #[arg(long)]
        session: Option<String>,

        /// Print the full routed answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a question would be scored, without running any tool
    Explain { query: String },

    /// List registered tools and their success/failure tallies
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Summarize routing history
    Analyze {
        #[arg(long)]
        json: bool,
    },

    /// Suggest a tool based on similar past requests
    Recommend { query: String },

    /// Tell the router whether an answer helped
    Feedback {
        /// The question that was asked
        query: String,

        /// Tool that answered it
        #[arg(long)]
        tool: String,

        #[arg(long, conflicts_with = "not_helpful")]
        helpful: bool,

        #[arg(long)]
        not_helpful: bool,

        /// Free-form comment stored with the feedback
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so answers and JSON on stdout stay clean
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Ask {
            query,
            session,
            json,
        } => cmd_ask(&cli.config, query, session, json).await,
        Commands::Explain { query } => cmd_explain(&cli.config, &query).await,
        Commands::Status { json } => cmd_status(&cli.config, json).await,
        Commands::Analyze { json } => cmd_analyze(&cli.config, json).await,
        Commands::Recommend { query } => cmd_recommend(&cli.config, &query).await,
        Commands::Feedback {
            query,
            tool,
            helpful,
            not_helpful,
            note,
        } => {
            if helpful == not_helpful {
                anyhow::bail!("Pass exactly one of --helpful or --not-helpful");
            }
            cmd_feedback(&cli.config, &query, &tool, helpful, note).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Switchboard initialized at {}", config_dir.display());
    println!("Edit {} to configure your tools.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

/// Router over the configured tools, seeded with saved history
fn build_router(cfg: &SwitchboardConfig) -> Result<Router> {
    let registry = tools::build_registry(cfg)?;
    let router = Router::new(registry, cfg.router.clone())?;
    if !cfg.history.enabled {
        return Ok(router);
    }
    let history = RoutingHistory::load(&cfg.history.resolved_path(), cfg.router.history_capacity);
    Ok(router.with_history(history))
}

fn save_history(cfg: &SwitchboardConfig, router: &Router) {
    if !cfg.history.enabled {
        return;
    }
    let path = cfg.history.resolved_path();
    if let Err(e) = router.save_history(&path) {
        warn!("Failed to save routing history to {}: {:#}", path.display(), e);
    }
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    text: String,
    session: Option<String>,
    json: bool,
) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;

    let mut query = Query::new(text);
    if let Some(session) = session {
        query = query.with_session(session);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, abandoning request...");
            ctrl_c.cancel();
        }
    });

    let result = router.route_with_cancel(query, &cancel).await;
    save_history(&cfg, &router);

    match result {
        Ok(answer) if json => println!("{}", serde_json::to_string_pretty(&answer)?),
        Ok(answer) => print_answer(&answer),
        Err(e @ RouteError::FallbackFailure(_)) => {
            eprintln!("I'm sorry, I couldn't process that request. Please try again.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_answer(answer: &RoutedAnswer) {
    println!("{}", answer.answer);
    println!();
    match &answer.fallback_reason {
        Some(reason) => println!(
            "[{} | fallback: {}]",
            answer.chosen_tool, reason
        ),
        None => println!(
            "[{} | confidence {:.2} | matched: {}]",
            answer.chosen_tool,
            answer.confidence,
            answer.matched_keywords.join(", ")
        ),
    }
}

async fn cmd_explain(config_path: &Option<PathBuf>, text: &str) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let candidates = router.candidates(text);

    if candidates.is_empty() {
        println!("No tool matched; the request would go to the fallback.");
        return Ok(());
    }
    println!(
        "{:<24} {:>10} {:>8} {:>7}  matched",
        "tool", "confidence", "bias", "viable"
    );
    for c in &candidates {
        println!(
            "{:<24} {:>10.2} {:>+8.3} {:>7}  {}",
            c.tool,
            c.confidence,
            c.bias,
            if c.viable { "yes" } else { "no" },
            c.matched_keywords.join(", ")
        );
    }
    Ok(())
}

async fn cmd_status(config_path: &Option<PathBuf>, json: bool) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let status = router.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    for tool in &status.tools {
        println!(
            "{}{} - {} ({} keywords, {} ok / {} failed)",
            tool.name,
            if tool.is_fallback { " [fallback]" } else { "" },
            tool.description,
            tool.keyword_count,
            tool.successes,
            tool.failures
        );
    }
    println!(
        "\n{} history entries, learning {}",
        status.history_entries,
        if status.learning_enabled { "on" } else { "off" }
    );
    Ok(())
}

async fn cmd_analyze(config_path: &Option<PathBuf>, json: bool) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let analysis = router.analyze();

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }
    if analysis.total_requests == 0 {
        println!("No routing history yet.");
        return Ok(());
    }
    println!("Requests:      {}", analysis.total_requests);
    println!("Success rate:  {:.1}%", analysis.success_rate * 100.0);
    println!("Fallback rate: {:.1}%", analysis.fallback_rate * 100.0);
    println!(
        "Feedback:      {} helpful / {} not helpful",
        analysis.helpful_feedback, analysis.unhelpful_feedback
    );
    println!("\nTool usage:");
    for (tool, usage) in &analysis.tool_usage {
        println!("  {:<24} {}", tool, serde_json::to_string(usage)?);
    }
    if !analysis.common_failures.is_empty() {
        println!("\nFailures:");
        for (cause, count) in &analysis.common_failures {
            println!("  {:<24} {}", cause, count);
        }
    }
    for suggestion in &analysis.suggestions {
        println!("\n* {}", suggestion);
    }
    Ok(())
}

async fn cmd_recommend(config_path: &Option<PathBuf>, text: &str) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let recommendations = router.recommendations(text);
    println!("{}", serde_json::to_string_pretty(&recommendations)?);
    Ok(())
}

async fn cmd_feedback(
    config_path: &Option<PathBuf>,
    query: &str,
    tool: &str,
    helpful: bool,
    note: Option<String>,
) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let ack = router.feedback(query, tool, helpful, note)?;
    save_history(&cfg, &router);

    println!("{}", ack.message);
    for suggestion in &ack.suggestions {
        println!("* {}", suggestion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "--debug",
            "ask",
            "show me ec2 instances",
            "--session",
            "s1",
            "--json",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Commands::Ask {
                query,
                session,
                json,
            } => {
                assert_eq!(query, "show me ec2 instances");
                assert_eq!(session.as_deref(), Some("s1"));
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_feedback_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "switchboard",
            "feedback",
            "q",
            "--tool",
            "general",
            "--helpful",
            "--not-helpful",
        ]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_history_survives_router_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: SwitchboardConfig = toml::from_str(
            r#"
[[tools]]
name = "aws_resource"
keywords = ["ec2 instances", "ec2"]
kind = "static"
text = "EC2 instances: i-0abc running"
"#,
        )
        .unwrap();
        cfg.history.path = dir.path().join("h.json").display().to_string();

        let router = build_router(&cfg).unwrap();
        let answer = router.route(Query::new("list ec2 instances")).await.unwrap();
        assert_eq!(answer.chosen_tool, "aws_resource");
        save_history(&cfg, &router);

        let reloaded = build_router(&cfg).unwrap();
        assert_eq!(reloaded.status().history_entries, 1);
        assert_eq!(
            reloaded
                .recommendations("list my ec2 instances")
                .recommended_tool
                .as_deref(),
            Some("aws_resource")
        );
    }
}
