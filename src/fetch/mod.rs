// src/fetch/mod.rs
use anyhow::{Context, Result};
use flate2::write::GzDecoder;
use futures_util::StreamExt;
use reqwest::Client;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Ensure `dest` holds the (decompressed) content behind `url`.
///
/// A non-empty `dest` counts as already fetched: no network call, file left
/// untouched. The transfer streams into `<dest>.part` and is renamed onto
/// the final path only after the body has fully drained, so a present
/// `dest` is always a completed one; an interrupted transfer leaves at most
/// a `.part` file, which is deleted on the error path.
pub async fn download(client: &Client, url: &str, dest: &Path, gzip: bool) -> Result<()> {
    if let Ok(meta) = fs::metadata(dest) {
        if meta.len() > 0 {
            debug!(path = %dest.display(), "cached file present, skipping download");
            return Ok(());
        }
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    info!(url, path = %dest.display(), gzip, "downloading");
    let start = Instant::now();
    let part = part_path(dest);

    match stream_to_file(client, url, &part, gzip).await {
        Ok(bytes) => {
            fs::rename(&part, dest)
                .with_context(|| format!("moving {} into place", part.display()))?;
            info!(
                path = %dest.display(),
                bytes,
                elapsed = ?start.elapsed(),
                "downloaded"
            );
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&part);
            Err(err)
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

async fn stream_to_file(client: &Client, url: &str, part: &Path, gzip: bool) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("requesting {url}"))?;

    let file =
        File::create(part).with_context(|| format!("creating {}", part.display()))?;
    let mut sink = CacheWriter::new(file, gzip);

    let mut body = response.bytes_stream();
    let mut bytes_written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("reading response body of {url}"))?;
        sink.write_all(&chunk)
            .with_context(|| format!("writing {}", part.display()))?;
        bytes_written += chunk.len() as u64;
    }
    sink.finish()
        .with_context(|| format!("finalizing {}", part.display()))?;
    Ok(bytes_written)
}

/// Write-side sink for the transfer: plain passthrough, or streaming gunzip
/// when the source is compressed.
enum CacheWriter {
    Plain(BufWriter<File>),
    Gzip(GzDecoder<BufWriter<File>>),
}

impl CacheWriter {
    fn new(file: File, gzip: bool) -> Self {
        let writer = BufWriter::new(file);
        if gzip {
            CacheWriter::Gzip(GzDecoder::new(writer))
        } else {
            CacheWriter::Plain(writer)
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            CacheWriter::Plain(w) => w.write_all(buf),
            CacheWriter::Gzip(w) => w.write_all(buf),
        }
    }

    /// Flush everything out; errors here include a truncated gzip stream.
    fn finish(self) -> std::io::Result<()> {
        match self {
            CacheWriter::Plain(mut w) => w.flush(),
            CacheWriter::Gzip(w) => w.finish()?.flush(),
        }
    }
}
