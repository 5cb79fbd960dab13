//! Object-store resolvers: S3, GCS, and Azure Blob.
//!
//! All three fetch through the `object_store` crate; credentials come
//! from the usual environment (AWS credential chain, service-account
//! file, storage-account keys). `AWS_ENDPOINT_URL` switches S3 to a
//! LocalStack-style endpoint.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tempfile::TempDir;

use super::{move_alias, AliasMap, Resolver};
use crate::error::DataqlError;
use crate::runtime;

/// Download one object into `dest` through the shared runtime.
fn fetch_object(store: Arc<dyn ObjectStore>, key: &str, dest: &PathBuf) -> Result<()> {
    let bytes = runtime::block_on(async {
        let result = store.get(&ObjectPath::from(key)).await?;
        result.bytes().await
    })
    .map_err(|e| DataqlError::Resolution(format!("object fetch failed for {key}: {e}")))?;
    fs::write(dest, &bytes).with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(())
}

/// Split `scheme://bucket/key` into `(bucket, key)`.
fn split_bucket_key<'a>(input: &'a str, scheme: &str) -> Result<(&'a str, &'a str)> {
    let rest = input
        .get(scheme.len()..)
        .ok_or_else(|| DataqlError::Resolution(format!("malformed URL: {input}")))?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(DataqlError::Resolution(format!(
            "malformed URL: {input} (expected {scheme}bucket/key)"
        ))
        .into()),
    }
}

fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("object")
}

/// Shared temp-workspace bookkeeping for the three resolvers.
struct Workspace {
    temp: Option<TempDir>,
    fetched: usize,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: None,
            fetched: 0,
        }
    }

    fn dest_for(&mut self, file_name: &str) -> Result<PathBuf> {
        if self.temp.is_none() {
            self.temp = Some(TempDir::new().context("failed to create temp dir for object fetch")?);
        }
        let dir = self.temp.as_ref().expect("just created");
        let subdir = dir.path().join(self.fetched.to_string());
        self.fetched += 1;
        fs::create_dir_all(&subdir)?;
        Ok(subdir.join(file_name))
    }

    fn clear(&mut self) {
        self.temp = None;
    }
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

pub struct S3Resolver {
    workspace: Workspace,
}

impl S3Resolver {
    pub fn new() -> Self {
        Self {
            workspace: Workspace::new(),
        }
    }

    fn store_for(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        // LocalStack-style override.
        for var in ["AWS_ENDPOINT_URL_S3", "AWS_ENDPOINT_URL"] {
            if let Ok(endpoint) = std::env::var(var) {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
                break;
            }
        }
        let store = builder
            .build()
            .map_err(|e| DataqlError::Resolution(format!("s3 client for bucket {bucket}: {e}")))?;
        Ok(Arc::new(store))
    }
}

impl Resolver for S3Resolver {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !input.to_lowercase().starts_with("s3://") {
                out.push(input);
                continue;
            }
            let (bucket, key) = split_bucket_key(&input, "s3://")?;
            let dest = self.workspace.dest_for(key_file_name(key))?;
            fetch_object(Self::store_for(bucket)?, key, &dest)?;
            let local = dest.to_string_lossy().into_owned();
            move_alias(aliases, &input, &local);
            out.push(local);
        }
        Ok(out)
    }

    fn cleanup(&mut self) {
        self.workspace.clear();
    }
}

// ---------------------------------------------------------------------------
// GCS
// ---------------------------------------------------------------------------

pub struct GcsResolver {
    workspace: Workspace,
}

impl GcsResolver {
    pub fn new() -> Self {
        Self {
            workspace: Workspace::new(),
        }
    }

    fn store_for(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Ok(credentials) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            builder = builder.with_service_account_path(credentials);
        }
        let store = builder
            .build()
            .map_err(|e| DataqlError::Resolution(format!("gcs client for bucket {bucket}: {e}")))?;
        Ok(Arc::new(store))
    }
}

impl Resolver for GcsResolver {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !input.to_lowercase().starts_with("gs://") {
                out.push(input);
                continue;
            }
            let (bucket, key) = split_bucket_key(&input, "gs://")?;
            let dest = self.workspace.dest_for(key_file_name(key))?;
            fetch_object(Self::store_for(bucket)?, key, &dest)?;
            let local = dest.to_string_lossy().into_owned();
            move_alias(aliases, &input, &local);
            out.push(local);
        }
        Ok(out)
    }

    fn cleanup(&mut self) {
        self.workspace.clear();
    }
}

// ---------------------------------------------------------------------------
// Azure
// ---------------------------------------------------------------------------

pub struct AzureResolver {
    workspace: Workspace,
}

impl AzureResolver {
    pub fn new() -> Self {
        Self {
            workspace: Workspace::new(),
        }
    }

    fn is_match(input: &str) -> bool {
        let lowered = input.to_lowercase();
        lowered.starts_with("azure://")
            || (lowered.starts_with("https://") && lowered.contains(".blob.core.windows.net/"))
    }

    /// `(account, container, blob)`; account is empty for azure:// URLs
    /// (it then comes from the environment).
    fn parse(input: &str) -> Result<(String, String, String)> {
        if input.to_lowercase().starts_with("azure://") {
            let (container, blob) = split_bucket_key(input, "azure://")?;
            return Ok((String::new(), container.to_string(), blob.to_string()));
        }

        // https://<account>.blob.core.windows.net/<container>/<blob>
        let url = url::Url::parse(input)
            .map_err(|e| DataqlError::Resolution(format!("malformed Azure URL {input}: {e}")))?;
        let host = url.host_str().unwrap_or_default();
        let account = host.split('.').next().unwrap_or_default().to_string();
        let mut segments = url
            .path_segments()
            .map(|s| s.map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(DataqlError::Resolution(format!(
                "malformed Azure URL {input}: expected container/blob path"
            ))
            .into());
        }
        let container = segments.remove(0);
        let blob = segments.join("/");
        Ok((account, container, blob))
    }

    fn store_for(account: &str, container: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
        if !account.is_empty() {
            builder = builder.with_account(account);
        }
        if let Ok(account) = std::env::var("AZURE_STORAGE_ACCOUNT") {
            builder = builder.with_account(account);
        }
        if let Ok(key) = std::env::var("AZURE_STORAGE_KEY") {
            builder = builder.with_access_key(key);
        }
        if let Ok(conn) = std::env::var("AZURE_STORAGE_CONNECTION_STRING") {
            for part in conn.split(';') {
                match part.split_once('=') {
                    Some(("AccountName", v)) => builder = builder.with_account(v),
                    Some(("AccountKey", v)) => builder = builder.with_access_key(v),
                    _ => {}
                }
            }
        }
        let store = builder.build().map_err(|e| {
            DataqlError::Resolution(format!("azure client for container {container}: {e}"))
        })?;
        Ok(Arc::new(store))
    }
}

impl Resolver for AzureResolver {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !Self::is_match(&input) {
                out.push(input);
                continue;
            }
            let (account, container, blob) = Self::parse(&input)?;
            let dest = self.workspace.dest_for(key_file_name(&blob))?;
            fetch_object(Self::store_for(&account, &container)?, &blob, &dest)?;
            let local = dest.to_string_lossy().into_owned();
            move_alias(aliases, &input, &local);
            out.push(local);
        }
        Ok(out)
    }

    fn cleanup(&mut self) {
        self.workspace.clear();
    }
}
