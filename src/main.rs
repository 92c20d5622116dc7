use anyhow::{bail, Result};
use clap::Parser;
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tripload::config::DEFAULT_CHUNK_ROWS;
use tripload::db::{self, Db};
use tripload::ingest::{self, Dataset};

/// Ingest remote trip-record CSVs into a Postgres database, one chunk at a
/// time.
#[derive(Parser)]
#[command(about = "Ingest CSV data into Postgres")]
struct Args {
    /// Postgres user
    #[arg(long)]
    user: String,

    /// Postgres password
    #[arg(long)]
    password: String,

    /// Postgres host
    #[arg(long)]
    host: String,

    /// Postgres port
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// Postgres database
    #[arg(long)]
    database: String,

    /// URL of a source CSV file (plain or .gz); repeat once per dataset
    #[arg(long = "url", required = true)]
    urls: Vec<String>,

    /// Table to write the matching --url into; repeat once per dataset
    #[arg(long = "table", required = true)]
    tables: Vec<String>,

    /// Comma-separated timestamp columns for the matching --url; may be
    /// repeated per dataset, omitted, or empty
    #[arg(long = "timestamps")]
    timestamps: Vec<String>,

    /// Rows per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    chunk_rows: usize,

    /// Directory for cached downloads
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

impl Args {
    fn datasets(&self) -> Result<Vec<Dataset>> {
        if self.tables.len() != self.urls.len() {
            bail!(
                "got {} --url flags but {} --table flags; each dataset needs both",
                self.urls.len(),
                self.tables.len()
            );
        }
        if self.timestamps.len() > self.urls.len() {
            bail!(
                "got {} --timestamps flags for {} datasets",
                self.timestamps.len(),
                self.urls.len()
            );
        }
        if self.chunk_rows == 0 {
            bail!("--chunk-rows must be at least 1");
        }

        self.urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let columns = self
                    .timestamps
                    .get(index)
                    .map(|list| {
                        list.split(',')
                            .map(str::trim)
                            .filter(|name| !name.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                Dataset::new(url, &self.tables[index], columns, &self.data_dir)
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let datasets = args.datasets()?;

    let url = db::connection_url(
        &args.user,
        &args.password,
        &args.host,
        args.port,
        &args.database,
    );
    let db = Db::connect(&url).await?;
    let client = Client::new();

    let summary = ingest::run(&client, &db, &datasets, args.chunk_rows).await?;
    info!(
        datasets = summary.datasets,
        chunks = summary.chunks,
        rows = summary.rows,
        "all done"
    );
    Ok(())
}
