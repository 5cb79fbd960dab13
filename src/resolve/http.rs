//! HTTP(S) resolver: downloads remote files into a temp workspace.
//!
//! Azure Blob https URLs are left alone here; the Azure resolver further
//! down the chain claims them.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::TempDir;

use super::{move_alias, AliasMap, Resolver};
use crate::error::DataqlError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpResolver {
    quiet: bool,
    temp: Option<TempDir>,
    downloads: usize,
}

impl HttpResolver {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            temp: None,
            downloads: 0,
        }
    }

    fn is_match(input: &str) -> bool {
        let lowered = input.to_lowercase();
        if !lowered.starts_with("http://") && !lowered.starts_with("https://") {
            return false;
        }
        // Azure Blob URLs belong to the Azure resolver.
        !lowered.contains(".blob.core.windows.net/")
    }

    fn download(&mut self, url: &str) -> Result<String> {
        if self.temp.is_none() {
            self.temp = Some(TempDir::new().context("failed to create temp dir for downloads")?);
        }
        let dir = self.temp.as_ref().expect("just created");

        // One subdirectory per download so equal remote names never clash.
        let subdir = dir.path().join(self.downloads.to_string());
        self.downloads += 1;
        fs::create_dir_all(&subdir)?;
        let dest = subdir.join(remote_file_name(url));

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build http client")?;

        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| DataqlError::Resolution(format!("download failed for {url}: {e}")))?;

        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            let bar = match response.content_length() {
                Some(total) => ProgressBar::new(total),
                None => ProgressBar::new_spinner(),
            };
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} downloading [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };

        let file = File::create(&dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        let mut reader = DownloadProgress {
            inner: response,
            bar: bar.clone(),
            bytes: 0,
        };
        io::copy(&mut reader, &mut writer)
            .map_err(|e| DataqlError::Resolution(format!("download failed for {url}: {e}")))?;
        bar.finish_and_clear();

        Ok(dest.to_string_lossy().into_owned())
    }
}

/// Reader wrapper that feeds the running download size into the bar.
struct DownloadProgress<R> {
    inner: R,
    bar: ProgressBar,
    bytes: u64,
}

impl<R: Read> Read for DownloadProgress<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes += n as u64;
        self.bar.set_position(self.bytes);
        Ok(n)
    }
}

/// Last path segment of the URL, query stripped, so the downloaded file
/// keeps its extension for format detection.
fn remote_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let name = match after_scheme.split_once('/') {
        Some((_, path)) => path.rsplit('/').next().filter(|s| !s.is_empty()),
        None => None,
    };
    name.unwrap_or("download").to_string()
}

impl Resolver for HttpResolver {
    fn name(&self) -> &'static str {
        "http"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if Self::is_match(&input) {
                let local = self.download(&input)?;
                move_alias(aliases, &input, &local);
                out.push(local);
            } else {
                out.push(input);
            }
        }
        Ok(out)
    }

    fn cleanup(&mut self) {
        self.temp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_http_only() {
        assert!(HttpResolver::is_match("https://example.com/data.csv"));
        assert!(HttpResolver::is_match("http://example.com/a.json"));
        assert!(!HttpResolver::is_match("s3://bucket/key"));
        assert!(!HttpResolver::is_match("data.csv"));
        assert!(!HttpResolver::is_match(
            "https://acct.blob.core.windows.net/container/blob.csv"
        ));
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(
            remote_file_name("https://example.com/files/data.csv?sig=abc"),
            "data.csv"
        );
        assert_eq!(remote_file_name("https://example.com/"), "download");
        assert_eq!(remote_file_name("https://example.com"), "download");
    }
}
