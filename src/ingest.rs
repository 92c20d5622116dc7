//! Orchestration: one strictly sequential pass over the configured datasets.

use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

use crate::db::{Db, TableLoader};
use crate::fetch;
use crate::process::{timestamps, ChunkReader};

/// One source file to ingest: where it comes from, where it is cached, and
/// which table and timestamp columns it maps to. Immutable for the run.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub url: String,
    pub table: String,
    /// Columns normalized to canonical timestamps before loading. May be
    /// empty; names missing from the source header are ignored.
    pub timestamp_columns: Vec<String>,
    pub gzip: bool,
    pub cache_path: PathBuf,
}

impl Dataset {
    /// Build a descriptor from a source URL.
    ///
    /// The cache file name is the URL's final path segment; a `.gz` suffix
    /// marks the source as compressed and is stripped, since the cache
    /// always holds decompressed content.
    pub fn new(
        url: &str,
        table: &str,
        timestamp_columns: Vec<String>,
        data_dir: &Path,
    ) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("invalid dataset URL {url}"))?;
        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("download.csv")
            .to_string();
        let gzip = filename.to_lowercase().ends_with(".gz");
        let cache_name = if gzip {
            filename[..filename.len() - 3].to_string()
        } else {
            filename
        };

        Ok(Dataset {
            url: url.to_string(),
            table: table.to_string(),
            timestamp_columns,
            gzip,
            cache_path: data_dir.join(cache_name),
        })
    }
}

/// Totals for one completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub datasets: usize,
    pub chunks: u64,
    pub rows: u64,
}

/// Ingest every dataset in order: fetch, then drive chunks through
/// transform and load until the reader is exhausted.
///
/// A fetch failure is logged and the dataset proceeds against whatever the
/// cache holds; with no cached file the subsequent open fails and aborts
/// the run. Load errors abort the run. A later dataset only starts after
/// the prior one's chunk stream is exhausted.
pub async fn run(
    client: &Client,
    db: &Db,
    datasets: &[Dataset],
    chunk_rows: usize,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for dataset in datasets {
        info!(url = %dataset.url, table = %dataset.table, "ingesting dataset");

        if let Err(err) =
            fetch::download(client, &dataset.url, &dataset.cache_path, dataset.gzip).await
        {
            error!(
                url = %dataset.url,
                error = %err,
                "download failed; continuing with local data if any"
            );
        }

        let mut reader = ChunkReader::open(&dataset.cache_path, chunk_rows)
            .with_context(|| format!("opening source for table \"{}\"", dataset.table))?;
        let mut loader = TableLoader::new(&dataset.table);

        while let Some(mut batch) = reader.next_batch()? {
            timestamps::normalize_batch(&mut batch, &dataset.timestamp_columns);
            loader.load_chunk(db, &batch).await?;
        }

        info!(
            table = %dataset.table,
            chunks = loader.chunks_written(),
            rows = loader.rows_written(),
            "dataset done"
        );
        summary.datasets += 1;
        summary.chunks += loader.chunks_written();
        summary.rows += loader.rows_written();
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn dataset(url: &str, table: &str, dir: &Path) -> Dataset {
        Dataset::new(url, table, Vec::new(), dir).unwrap()
    }

    #[test]
    fn cache_name_comes_from_the_url_path() {
        let dir = tempdir().unwrap();
        let d = dataset(
            "https://example.com/trips/yellow_tripdata_2019-01.csv",
            "trips",
            dir.path(),
        );
        assert!(!d.gzip);
        assert_eq!(
            d.cache_path,
            dir.path().join("yellow_tripdata_2019-01.csv")
        );
    }

    #[test]
    fn gz_suffix_sets_the_compression_flag_and_is_stripped() {
        let dir = tempdir().unwrap();
        let d = dataset(
            "https://example.com/green_tripdata_2019-09.csv.gz",
            "green",
            dir.path(),
        );
        assert!(d.gzip);
        assert_eq!(d.cache_path, dir.path().join("green_tripdata_2019-09.csv"));
    }

    #[test]
    fn url_without_a_filename_gets_a_default() {
        let dir = tempdir().unwrap();
        let d = dataset("https://example.com/", "trips", dir.path());
        assert_eq!(d.cache_path, dir.path().join("download.csv"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(Dataset::new("not a url", "trips", Vec::new(), dir.path()).is_err());
    }

    async fn sqlite_values(db: &Db, sql: &str) -> Vec<Option<String>> {
        let Db::Sqlite(pool) = db else {
            unreachable!()
        };
        sqlx::query_scalar(sql).fetch_all(pool).await.unwrap()
    }

    #[tokio::test]
    async fn run_loads_a_cached_dataset_end_to_end() {
        let dir = tempdir().unwrap();
        let mut d = dataset("https://example.com/trips.csv", "trips", dir.path());
        d.timestamp_columns = vec!["pickup_datetime".to_string()];

        // Pre-seeded cache: the fetcher must not touch the network.
        fs::write(
            &d.cache_path,
            "id,pickup_datetime\n\
             1,2019-01-01 00:00:00\n\
             2,01/02/2019\n\
             3,not-a-date\n",
        )
        .unwrap();

        let db = Db::sqlite_in_memory().await.unwrap();
        let client = Client::new();
        let summary = run(&client, &db, &[d], 2).await.unwrap();

        assert_eq!(summary.datasets, 1);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.rows, 3);

        let pickups = sqlite_values(
            &db,
            "SELECT CAST(pickup_datetime AS TEXT) FROM trips ORDER BY rowid",
        )
        .await;
        assert_eq!(pickups.len(), 3);
        assert!(pickups[0].as_deref().unwrap().starts_with("2019-01-01"));
        assert!(pickups[1].as_deref().unwrap().starts_with("2019-01-02"));
        assert_eq!(pickups[2], None);
    }

    #[tokio::test]
    async fn datasets_load_in_sequence() {
        let dir = tempdir().unwrap();
        let trips = dataset("https://example.com/trips.csv", "trips", dir.path());
        let zones = dataset("https://example.com/zones.csv", "zones", dir.path());
        fs::write(&trips.cache_path, "id\n1\n2\n").unwrap();
        fs::write(&zones.cache_path, "zone\nAstoria\n").unwrap();

        let db = Db::sqlite_in_memory().await.unwrap();
        let client = Client::new();
        let summary = run(&client, &db, &[trips, zones], 1000).await.unwrap();

        assert_eq!(summary.datasets, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(
            sqlite_values(&db, "SELECT CAST(zone AS TEXT) FROM zones").await,
            vec![Some("Astoria".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_source_after_failed_fetch_aborts() {
        let dir = tempdir().unwrap();
        // Unroutable URL and no cached file: fetch fails permissively, the
        // open that follows does not.
        let d = dataset("http://127.0.0.1:1/absent.csv", "trips", dir.path());

        let db = Db::sqlite_in_memory().await.unwrap();
        let client = Client::new();
        assert!(run(&client, &db, &[d], 1000).await.is_err());
    }
}
