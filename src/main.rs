//! `tclip` — CLI over the broadcast-archive pipeline.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use chrono::Weekday;

use tclip_pipeline::backfill::{self, BackfillOptions};
use tclip_pipeline::config::{load_config, Config};
use tclip_pipeline::embedding::{self, Embedder};
use tclip_pipeline::filter::{Period, SearchCriteria};
use tclip_pipeline::ingest::{self, UploadOptions};
use tclip_pipeline::progress::ProgressMode;
use tclip_pipeline::store::{AwsCredentials, S3Store};
use tclip_pipeline::{get, index, search, status};

#[derive(Parser)]
#[command(name = "tclip", version, about = "Broadcast-archive ingestion and search")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "tclip.toml")]
    config: PathBuf,

    /// Progress output: human, json, or off (default: human on a TTY).
    #[arg(long, global = true)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    All,
    ThisWeek,
    LastWeek,
    Month,
    Weekday,
    Custom,
}

#[derive(Subcommand)]
enum Command {
    /// Scan local exports and upload chunks, master records, and media.
    Upload {
        /// Re-upload even when the stored content is identical.
        #[arg(long)]
        force: bool,
        /// Show what would be uploaded without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Process at most N documents.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Attach missing embeddings to already-stored records.
    Embed {
        /// Restrict to one document.
        #[arg(long)]
        doc_id: Option<String>,
        /// Recompute vectors that already exist.
        #[arg(long)]
        force: bool,
        /// Only process chunk files.
        #[arg(long, conflicts_with = "master_only")]
        chunks_only: bool,
        /// Only process master records.
        #[arg(long)]
        master_only: bool,
    },
    /// Rebuild the flat search index from every master record.
    Index,
    /// Filter the archive by date, time, channel, and more.
    Search {
        /// Broadcast date (YYYYMMDD, hyphens/slashes accepted).
        #[arg(long)]
        date: Option<String>,
        /// Instant that must fall in the program's time window (HHMM or HH:MM).
        #[arg(long)]
        time: Option<String>,
        /// Channel name; "すべて" matches every channel.
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        /// Program-name substring match.
        #[arg(long)]
        program: Option<String>,
        /// Performer name (structured talents list searched first).
        #[arg(long)]
        performer: Option<String>,
        /// Exact program names to select (repeatable; decoration-insensitive).
        #[arg(long = "select", value_name = "NAME")]
        program_names: Vec<String>,
        /// Restrict to a time period.
        #[arg(long, value_enum, default_value = "all")]
        period: PeriodArg,
        /// Custom period start (YYYYMMDD, inclusive).
        #[arg(long)]
        start: Option<String>,
        /// Custom period end (YYYYMMDD, inclusive).
        #[arg(long)]
        end: Option<String>,
        /// Weekdays for --period weekday (repeatable: mon, tue, ...).
        #[arg(long = "weekday", value_name = "DAY")]
        weekdays: Vec<String>,
        /// Case-insensitive keyword over transcript text and metadata.
        #[arg(long)]
        keyword: Option<String>,
        /// Emit results as JSON instead of the human listing.
        #[arg(long)]
        json: bool,
    },
    /// Print the stored master record, chunks, and media keys for one document.
    Get {
        doc_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Summarize object counts, sizes, and embedding coverage.
    Status,
}

fn build_store(config: &Config) -> Result<S3Store> {
    let credentials = AwsCredentials::from_env()
        .context("store credentials are required (set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)")?;
    Ok(S3Store::new(
        config.store.bucket.clone(),
        config.store.region.clone(),
        config.store.endpoint_url.clone(),
        credentials,
        config.store.max_retries,
    ))
}

fn build_period(
    period: PeriodArg,
    start: Option<String>,
    end: Option<String>,
    weekdays: Vec<String>,
) -> Result<Period> {
    match period {
        PeriodArg::All => Ok(Period::All),
        PeriodArg::ThisWeek => Ok(Period::ThisWeek),
        PeriodArg::LastWeek => Ok(Period::LastWeek),
        PeriodArg::Month => Ok(Period::PastMonth),
        PeriodArg::Weekday => {
            if weekdays.is_empty() {
                bail!("--period weekday requires at least one --weekday");
            }
            let days = weekdays
                .iter()
                .map(|day| {
                    day.parse::<Weekday>()
                        .map_err(|_| anyhow::anyhow!("unrecognized weekday: {:?}", day))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Period::Weekdays(days))
        }
        PeriodArg::Custom => {
            if start.is_none() && end.is_none() {
                bail!("--period custom requires --start and/or --end");
            }
            Ok(Period::Custom { start, end })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let progress_mode = match cli.progress {
        Some(ProgressArg::Human) => ProgressMode::Human,
        Some(ProgressArg::Json) => ProgressMode::Json,
        Some(ProgressArg::Off) => ProgressMode::Off,
        None => ProgressMode::default_for_tty(),
    };
    let progress = progress_mode.reporter();

    match cli.command {
        Command::Upload {
            force,
            dry_run,
            limit,
        } => {
            let store = build_store(&config)?;
            let embedder: Option<Box<dyn Embedder>> = embedding::create_embedder(&config.embedding)?;
            let options = UploadOptions {
                force,
                dry_run,
                limit,
            };
            ingest::run_upload(
                &config,
                &store,
                embedder.as_deref(),
                &options,
                progress.as_ref(),
            )
            .await?;
        }
        Command::Embed {
            doc_id,
            force,
            chunks_only,
            master_only,
        } => {
            let Some(embedder) = embedding::create_embedder(&config.embedding)? else {
                bail!("embedding.provider is \"none\"; configure openai or ollama to backfill");
            };
            let store = build_store(&config)?;
            let options = BackfillOptions {
                doc_id,
                force,
                chunks_only,
                master_only,
            };
            backfill::run_backfill(&config, &store, embedder.as_ref(), &options, progress.as_ref())
                .await?;
        }
        Command::Index => {
            let store = build_store(&config)?;
            index::build_index(&config, &store, progress.as_ref()).await?;
        }
        Command::Search {
            date,
            time,
            channel,
            genre,
            program,
            performer,
            program_names,
            period,
            start,
            end,
            weekdays,
            keyword,
            json,
        } => {
            let criteria = SearchCriteria {
                date,
                time,
                channel,
                genre,
                program_name: program,
                performer,
                program_names,
                period: build_period(period, start, end, weekdays)?,
                keyword,
            };
            let store = build_store(&config)?;
            search::run_search(&config, &store, &criteria, json, progress.as_ref()).await?;
        }
        Command::Get { doc_id, json } => {
            let store = build_store(&config)?;
            get::run_get(&config, &store, &doc_id, json).await?;
        }
        Command::Status => {
            let store = build_store(&config)?;
            status::run_status(&config, &store).await?;
        }
    }

    Ok(())
}
