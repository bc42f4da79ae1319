//! crosspost-post - Publish a stored post to all of its target platforms

use clap::Parser;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::{
    create_platforms, Config, CrosspostError, Database, MultiPlatformPoster, PostStatus, PostStore,
    PublishOutcome, Result,
};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "crosspost-post")]
#[command(version)]
#[command(about = "Publish a stored post to all of its target platforms", long_about = None)]
struct Cli {
    /// Id of the post to publish
    post_id: String,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();

    match run(&cli).await {
        Ok(outcome) => {
            if let Err(e) = print_outcome(&outcome, &cli.format) {
                eprintln!("Error: {}", e);
                std::process::exit(e.exit_code());
            }
            std::process::exit(if outcome.all_succeeded() { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<PublishOutcome> {
    let config = Config::load()?;
    let db = Arc::new(Database::new(&config.database.path).await?);

    let mut post = db
        .get_post(&cli.post_id)
        .await?
        .ok_or_else(|| CrosspostError::InvalidInput(format!("Post not found: {}", cli.post_id)))?;

    debug!(
        post_id = %post.id,
        status = %post.status,
        platforms = ?post.platforms,
        "Loaded post"
    );

    if matches!(post.status, PostStatus::Publishing | PostStatus::Published) {
        warn!(post_id = %post.id, status = %post.status, "Refusing to republish post");
        return Err(CrosspostError::InvalidInput(format!(
            "Post {} is already {}",
            post.id, post.status
        )));
    }

    let poster = MultiPlatformPoster::new(create_platforms(&config)?, db.clone(), db);
    Ok(poster.publish_outcome(&mut post).await)
}

fn print_outcome(outcome: &PublishOutcome, format: &str) -> Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(outcome)
            .map_err(|e| CrosspostError::InvalidInput(format!("JSON serialization failed: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    for result in &outcome.results {
        match (&result.external_post_id, result.success) {
            (Some(id), true) => println!("{}:{}", result.platform, id),
            _ => eprintln!("{}: {}", result.platform, result.message),
        }
    }
    Ok(())
}
