//! Stdin resolver: buffers `-` into a temp file.
//!
//! The temp file gets an extension derived from the configured stdin
//! format so that format detection downstream works unchanged.

use std::fs::File;
use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use tempfile::TempDir;

use super::{move_alias, AliasMap, Resolver};
use crate::config::STDIN_SENTINEL;

pub struct StdinResolver {
    extension: String,
    temp: Option<TempDir>,
}

impl StdinResolver {
    pub fn new(stdin_format: &str) -> Self {
        Self {
            extension: extension_for(stdin_format),
            temp: None,
        }
    }

    fn buffer_stdin(&mut self) -> Result<String> {
        let dir = match &self.temp {
            Some(dir) => dir,
            None => {
                self.temp = Some(TempDir::new().context("failed to create temp dir for stdin")?);
                self.temp.as_ref().expect("just created")
            }
        };

        let dest = dir.path().join(format!("stdin_data.{}", self.extension));
        let file = File::create(&dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        io::copy(&mut io::stdin().lock(), &mut writer)
            .context("failed to buffer standard input")?;
        Ok(dest.to_string_lossy().into_owned())
    }
}

fn extension_for(stdin_format: &str) -> String {
    match stdin_format.to_lowercase().as_str() {
        "excel" | "xlsx" => "xlsx".to_string(),
        "ndjson" => "jsonl".to_string(),
        "yml" => "yaml".to_string(),
        other => other.to_string(),
    }
}

impl Resolver for StdinResolver {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input == STDIN_SENTINEL {
                let local = self.buffer_stdin()?;
                move_alias(aliases, STDIN_SENTINEL, &local);
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
