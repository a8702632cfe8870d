//! # guildcfg Entry Point
//!
//! Operator CLI for schema migrations and guild settings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guildcfg::{
    cache::GuildCache,
    commands::slowmode,
    config::ConfigLoader,
    db, telemetry,
};

#[derive(Parser)]
#[command(name = "guildcfg")]
#[command(about = "Schema migrations and per-guild settings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply every pending migration
    Migrate,
    /// Roll back the most recently applied migrations
    Rollback {
        /// How many migrations to roll back
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Roll back every applied migration
    Reset,
    /// List migrations and when they were applied
    Status,
    /// Print a guild's channels document
    Show {
        guild: String,
    },
    /// Run the slowmode command for a guild channel
    Slowmode {
        guild: String,
        channel: String,
        /// `off`, or `<limit> <decay>`
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(profile = %config.profile, "configuration: {}", redacted_json);
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&db).await.context("running migrations")?;
            println!("Migrations complete.");
        }
        Command::Rollback { steps } => {
            let rolled_back = db::rollback(&db, steps)
                .await
                .context("rolling back migrations")?;
            print_rolled_back(&rolled_back);
        }
        Command::Reset => {
            let rolled_back = db::reset(&db).await.context("resetting migrations")?;
            print_rolled_back(&rolled_back);
        }
        Command::Status => {
            let status = db::migration_status(&db)
                .await
                .context("reading migration status")?;
            for unit in status {
                let applied = unit
                    .applied_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "pending".to_string());
                println!("{:<48} {}", unit.name, applied);
            }
        }
        Command::Show { guild } => {
            let ready = db::run_migrations(&db).await.context("running migrations")?;
            let cache = GuildCache::new(db, ready);
            let settings = cache
                .get(&guild)
                .await
                .with_context(|| format!("loading guild {guild}"))?;
            let document = settings
                .channels_to_json()
                .context("serializing channels")?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Slowmode {
            guild,
            channel,
            args,
        } => {
            let ready = db::run_migrations(&db).await.context("running migrations")?;
            let cache = GuildCache::new(db, ready);
            let reply = slowmode::execute(&cache, &guild, &channel, &args).await?;
            println!("{reply}");
        }
    }

    Ok(())
}

fn print_rolled_back(names: &[String]) {
    if names.is_empty() {
        println!("Nothing to roll back.");
    }
    for name in names {
        println!("Rolled back {name}");
    }
}
