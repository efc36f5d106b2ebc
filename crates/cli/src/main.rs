use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use centime_core::{BudgetEntry, Money, TxnKind};
use centime_import::StatementProfiles;
use centime_pipeline::{IngestionPipeline, PipelineConfig};
use centime_storage::{
    create_db, delete_budget, delete_rule, get_budgets, get_rules, processed_files,
    resolve_budget, upsert_budget,
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "centime", version, about = "Statement ingestion and budget tracking")]
struct Cli {
    /// SQLite database file, created on first use
    #[arg(long, global = true, default_value = "centime.db")]
    db: PathBuf,

    /// Owner whose data the command operates on
    #[arg(long, global = true, default_value_t = 1)]
    owner: i64,

    /// TOML file overriding the built-in statement profiles
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every recognized statement CSV in a folder
    Ingest {
        folder: PathBuf,

        /// Re-process files already marked as processed
        #[arg(long)]
        force: bool,
    },

    /// Budget planning commands
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },

    /// Categorization rule commands
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Totals per kind for a year or a single month
    Summary {
        year: i32,

        #[arg(long)]
        month: Option<u8>,
    },

    /// List processed statement files
    Files,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    /// Create or update a budget entry (yearly when --month is omitted)
    Set {
        year: i32,
        kind: TxnKind,
        category: String,
        amount: Decimal,

        #[arg(long)]
        month: Option<u8>,

        /// Skip the yearly/monthly reconciliation pass
        #[arg(long)]
        no_propagate: bool,
    },

    /// Effective budget per (kind, category) for a period
    Show {
        year: i32,

        #[arg(long)]
        month: Option<u8>,
    },

    /// Stored budget rows, optionally restricted to a year
    List {
        #[arg(long)]
        year: Option<i32>,
    },

    /// Delete a budget row by id
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// List stored rules in match order
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,
    },

    /// Re-run the active rules over every stored transaction
    Apply,

    /// Delete a rule by id
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let pool = create_db(&cli.db)
        .await
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    let profiles = match &cli.profiles {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading profiles {}", path.display()))?;
            StatementProfiles::from_toml(&content)?
        }
        None => StatementProfiles::default(),
    };
    let pipeline = IngestionPipeline::new(
        pool.clone(),
        PipelineConfig { profiles, rule_cache_ttl: Duration::from_secs(60) },
    );

    match cli.command {
        Command::Ingest { folder, force } => {
            let stats = pipeline.run(cli.owner, &folder, force).await?;
            println!(
                "{} ledger + {} card statement(s): {} transaction(s), {} inserted, {} duplicate(s), {} error(s)",
                stats.ledger_files,
                stats.card_files,
                stats.total_transactions,
                stats.inserted,
                stats.skipped,
                stats.errors
            );
        }

        Command::Budget { command } => match command {
            BudgetCommand::Set { year, kind, category, amount, month, no_propagate } => {
                let entry = match month {
                    Some(m) => BudgetEntry::monthly(
                        cli.owner,
                        year,
                        m,
                        kind,
                        &category,
                        Money::from_decimal(amount),
                    ),
                    None => BudgetEntry::yearly(
                        cli.owner,
                        year,
                        kind,
                        &category,
                        Money::from_decimal(amount),
                    ),
                };
                let saved = upsert_budget(&pool, &entry, !no_propagate).await?;
                println!(
                    "saved budget #{}: {} {} = {}",
                    saved.id.unwrap_or_default(),
                    saved.kind.as_str(),
                    saved.category,
                    saved.amount
                );
            }
            BudgetCommand::Show { year, month } => {
                let resolved = resolve_budget(&pool, cli.owner, year, month).await?;
                let mut rows: Vec<_> = resolved.into_iter().collect();
                rows.sort_by(|a, b| {
                    (a.0 .0.as_str(), &a.0 .1).cmp(&(b.0 .0.as_str(), &b.0 .1))
                });
                for ((kind, category), amount) in rows {
                    println!("{:<10} {:<30} {:>12}", kind.as_str(), category, amount);
                }
            }
            BudgetCommand::List { year } => {
                for e in get_budgets(&pool, cli.owner, year).await? {
                    let month = e.month.map_or("year".to_string(), |m| format!("month {m:>2}"));
                    println!(
                        "#{:<4} {} {:<9} {:<10} {:<30} {:>12}",
                        e.id.unwrap_or_default(),
                        e.year,
                        month,
                        e.kind.as_str(),
                        e.category,
                        e.amount
                    );
                }
            }
            BudgetCommand::Delete { id } => {
                if delete_budget(&pool, cli.owner, id).await? {
                    println!("deleted budget #{id}");
                } else {
                    println!("no budget #{id} for owner {}", cli.owner);
                }
            }
        },

        Command::Rules { command } => match command {
            RulesCommand::List { all } => {
                for r in get_rules(&pool, !all).await? {
                    let amount = match (r.amount_op, r.amount_value) {
                        (Some(op), Some(value)) => format!(" amount {} {}", op.as_str(), value),
                        _ => String::new(),
                    };
                    println!(
                        "#{:<4} [{}] p{} \"{}\"{} -> {} / {}",
                        r.id.unwrap_or_default(),
                        if r.is_active { "active" } else { "inactive" },
                        r.priority,
                        r.pattern,
                        amount,
                        r.kind.as_str(),
                        r.category
                    );
                }
            }
            RulesCommand::Apply => {
                let updated = pipeline.reapply_rules(cli.owner).await?;
                println!("reclassified {updated} transaction(s)");
            }
            RulesCommand::Delete { id } => {
                if delete_rule(&pool, id).await? {
                    println!("deleted rule #{id}");
                } else {
                    println!("no rule #{id}");
                }
            }
        },

        Command::Summary { year, month } => {
            let s = pipeline.summary(cli.owner, year, month).await?;
            println!("income       {:>12}", s.income);
            println!("expenses     {:>12}", s.expenses);
            println!("savings      {:>12}", s.savings);
            println!("card refunds {:>12}", s.card_refunds);
            if !s.unlabeled.is_zero() {
                println!("unlabeled    {:>12}", s.unlabeled);
            }
            println!("net          {:>12}", s.net);
        }

        Command::Files => {
            for f in processed_files(&pool, cli.owner).await? {
                let at = f.processed_at.map_or(String::new(), |t| t.to_string());
                println!(
                    "#{:<4} {:<8} {:<40} {:>6} row(s)  {}",
                    f.id,
                    f.source.as_str(),
                    f.filename,
                    f.record_count,
                    at
                );
            }
        }
    }

    Ok(())
}
