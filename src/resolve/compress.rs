//! Decompression resolver.
//!
//! Compressed inputs are streamed into a temp file named after the inner
//! file (`data.csv.gz` → `data.csv`), so downstream format detection and
//! table naming see the logical name. When the user supplied neither an
//! alias nor a collection override, the resolver synthesizes an alias
//! from the uncompressed stem, so `data.csv.gz` stays queryable as `data`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempDir;

use super::{AliasMap, Resolver};
use crate::sanitize::sanitize_name;

/// Compression format detected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("gz" | "gzip") => Compression::Gzip,
            Some("bz2" | "bzip2") => Compression::Bzip2,
            Some("xz" | "lzma") => Compression::Xz,
            Some("zst" | "zstd") => Compression::Zstd,
            _ => Compression::None,
        }
    }

    /// Wrap a reader with the matching decompressor.
    pub fn wrap_reader<'a>(&self, reader: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => reader,
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Zstd => Box::new(
                zstd::stream::read::Decoder::new(reader)
                    .context("failed to initialize zstd decoder")?,
            ),
        })
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

pub struct DecompressResolver {
    /// Alias synthesis is suppressed when `--collection` is set.
    collection_override: bool,
    temp: Option<TempDir>,
    extracted: usize,
}

impl DecompressResolver {
    pub fn new(collection_override: bool) -> Self {
        Self {
            collection_override,
            temp: None,
            extracted: 0,
        }
    }

    fn decompress(&mut self, input: &str, compression: Compression) -> Result<String> {
        if self.temp.is_none() {
            self.temp =
                Some(TempDir::new().context("failed to create temp dir for decompression")?);
        }
        let dir = self.temp.as_ref().expect("just created");

        let logical = logical_name(input);
        let subdir = dir.path().join(self.extracted.to_string());
        self.extracted += 1;
        fs::create_dir_all(&subdir)?;
        let dest = subdir.join(&logical);

        let file = File::open(input)
            .with_context(|| format!("failed to open compressed file {input}"))?;
        let mut reader = compression.wrap_reader(Box::new(file))?;
        let out = File::create(&dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(out);
        io::copy(&mut reader, &mut writer)
            .with_context(|| format!("failed to decompress {input} ({compression})"))?;

        Ok(dest.to_string_lossy().into_owned())
    }
}

/// File name with the compression extension stripped
/// (`/a/data.csv.gz` → `data.csv`).
fn logical_name(input: &str) -> String {
    let path = Path::new(input);
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "data".to_string())
}

impl Resolver for DecompressResolver {
    fn name(&self) -> &'static str {
        "decompress"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            let compression = Compression::from_path(Path::new(&input));
            if compression == Compression::None {
                out.push(input);
                continue;
            }

            let local = self.decompress(&input, compression)?;
            if let Some(alias) = aliases.remove(&input) {
                aliases.insert(local.clone(), alias);
            } else if !self.collection_override {
                // Keep `data.csv.gz` queryable as `data`.
                let stem = sanitize_name(
                    Path::new(&local)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("data"),
                );
                if !stem.is_empty() {
                    aliases.insert(local.clone(), stem);
                }
            }
            out.push(local);
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
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_compression_from_path() {
        assert_eq!(
            Compression::from_path(Path::new("a.csv.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("a.json.bz2")),
            Compression::Bzip2
        );
        assert_eq!(Compression::from_path(Path::new("a.xml.xz")), Compression::Xz);
        assert_eq!(
            Compression::from_path(Path::new("a.jsonl.zst")),
            Compression::Zstd
        );
        assert_eq!(Compression::from_path(Path::new("a.csv")), Compression::None);
    }

    #[test]
    fn test_logical_name() {
        assert_eq!(logical_name("/tmp/data.csv.gz"), "data.csv");
        assert_eq!(logical_name("dump.xml.bz2"), "dump.xml");
    }

    #[test]
    fn test_gzip_roundtrip_with_synthesized_alias() {
        let workdir = TempDir::new().unwrap();
        let gz_path = workdir.path().join("data.csv.gz");
        let file = File::create(&gz_path).unwrap();
        let mut encoder = GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"x,y\n1,2\n3,4\n").unwrap();
        encoder.finish().unwrap();

        let mut resolver = DecompressResolver::new(false);
        let mut aliases = AliasMap::default();
        let input = gz_path.to_string_lossy().into_owned();
        let out = resolver.resolve(vec![input], &mut aliases).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].ends_with("data.csv"), "{}", out[0]);
        assert_eq!(
            std::fs::read_to_string(&out[0]).unwrap(),
            "x,y\n1,2\n3,4\n"
        );
        assert_eq!(aliases.get(&out[0]), Some(&"data".to_string()));

        let extracted = out[0].clone();
        resolver.cleanup();
        assert!(!Path::new(&extracted).exists());
        // Cleanup is idempotent.
        resolver.cleanup();
    }

    #[test]
    fn test_explicit_alias_moves_with_path() {
        let workdir = TempDir::new().unwrap();
        let gz_path = workdir.path().join("data.csv.gz");
        let file = File::create(&gz_path).unwrap();
        let mut encoder = GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"a\n1\n").unwrap();
        encoder.finish().unwrap();

        let input = gz_path.to_string_lossy().into_owned();
        let mut aliases = AliasMap::default();
        aliases.insert(input.clone(), "people".to_string());

        let mut resolver = DecompressResolver::new(false);
        let out = resolver.resolve(vec![input.clone()], &mut aliases).unwrap();
        assert_eq!(aliases.get(&input), None);
        assert_eq!(aliases.get(&out[0]), Some(&"people".to_string()));
        resolver.cleanup();
    }
}
