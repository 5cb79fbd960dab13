//! Source resolvers: turn foreign location references into local files.
//!
//! Each resolver inspects every input, replaces the ones it recognizes
//! with a local path in its own temp workspace, and passes the rest
//! through untouched. The chain runs in a fixed order (stdin → HTTP → S3
//! → GCS → Azure → decompression); whenever a path is rewritten, the
//! alias-map entry moves with it so the final local file still resolves
//! to the table name the user asked for. Failure unwinds the already-run
//! resolvers in reverse order.

mod cloud;
mod compress;
mod http;
mod stdin;

pub use cloud::{AzureResolver, GcsResolver, S3Resolver};
pub use compress::{Compression, DecompressResolver};
pub use http::HttpResolver;
pub use stdin::StdinResolver;

use ahash::AHashMap;
use anyhow::Result;

use crate::config::Config;

/// Maps a raw input path to its user-chosen (or synthesized) table name.
pub type AliasMap = AHashMap<String, String>;

/// A single resolver step.
pub trait Resolver {
    /// Resolver name for diagnostics.
    fn name(&self) -> &'static str;

    /// Rewrite the inputs this resolver recognizes, updating `aliases`
    /// for every path that changed.
    fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>>;

    /// Remove every temp artifact this resolver created. Idempotent.
    fn cleanup(&mut self);
}

/// Transfer an alias entry from an old path to its rewritten location.
pub fn move_alias(aliases: &mut AliasMap, old: &str, new: &str) {
    if let Some(alias) = aliases.remove(old) {
        aliases.insert(new.to_string(), alias);
    }
}

/// The fixed resolver chain.
pub struct ResolverChain {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ResolverChain {
    pub fn new(config: &Config) -> Self {
        let resolvers: Vec<Box<dyn Resolver>> = vec![
            Box::new(StdinResolver::new(&config.stdin_format)),
            Box::new(HttpResolver::new(config.quiet)),
            Box::new(S3Resolver::new()),
            Box::new(GcsResolver::new()),
            Box::new(AzureResolver::new()),
            Box::new(DecompressResolver::new(config.collection.is_some())),
        ];
        Self { resolvers }
    }

    /// Run every resolver in order. On failure the chain cleans up what
    /// already ran before returning the error.
    pub fn resolve(&mut self, inputs: Vec<String>, aliases: &mut AliasMap) -> Result<Vec<String>> {
        let mut current = inputs;
        for i in 0..self.resolvers.len() {
            log::debug!("resolver {} running", self.resolvers[i].name());
            match self.resolvers[i].resolve(current, aliases) {
                Ok(next) => current = next,
                Err(e) => {
                    for resolver in self.resolvers[..=i].iter_mut().rev() {
                        resolver.cleanup();
                    }
                    return Err(e);
                }
            }
        }
        Ok(current)
    }

    /// Release every resolver's temp artifacts, in reverse order of
    /// acquisition.
    pub fn cleanup(&mut self) {
        for resolver in self.resolvers.iter_mut().rev() {
            resolver.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_alias() {
        let mut aliases = AliasMap::default();
        aliases.insert("a.csv.gz".to_string(), "people".to_string());
        move_alias(&mut aliases, "a.csv.gz", "/tmp/x/a.csv");
        assert_eq!(aliases.get("a.csv.gz"), None);
        assert_eq!(
            aliases.get("/tmp/x/a.csv"),
            Some(&"people".to_string())
        );
    }

    #[test]
    fn test_move_alias_without_entry_is_noop() {
        let mut aliases = AliasMap::default();
        move_alias(&mut aliases, "missing", "other");
        assert!(aliases.is_empty());
    }
}
