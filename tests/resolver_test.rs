//! Resolver-chain tests that need no network: passthrough, alias
//! threading, decompression, and temp-file cleanup.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use dataql::config::Config;
use dataql::resolve::{AliasMap, ResolverChain};
use tempfile::TempDir;

fn write_gz(dir: &TempDir, name: &str, content: &[u8]) -> String {
    let path = dir.path().join(name);
    let file = File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_local_paths_pass_through_untouched() {
    let mut chain = ResolverChain::new(&Config::default());
    let mut aliases = AliasMap::default();
    let inputs = vec!["plain.csv".to_string(), "also/plain.json".to_string()];

    let resolved = chain.resolve(inputs.clone(), &mut aliases).unwrap();
    assert_eq!(resolved, inputs);
    assert!(aliases.is_empty());
    chain.cleanup();
}

#[test]
fn test_chain_decompresses_and_synthesizes_alias() {
    let dir = TempDir::new().unwrap();
    let input = write_gz(&dir, "data.csv.gz", b"a,b\n1,2\n");

    let mut chain = ResolverChain::new(&Config::default());
    let mut aliases = AliasMap::default();
    let resolved = chain.resolve(vec![input], &mut aliases).unwrap();

    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].ends_with("data.csv"), "{}", resolved[0]);
    assert_eq!(std::fs::read_to_string(&resolved[0]).unwrap(), "a,b\n1,2\n");
    // Invariant: the final local path binds to the synthesized stem.
    assert_eq!(aliases.get(&resolved[0]), Some(&"data".to_string()));

    let extracted = resolved[0].clone();
    chain.cleanup();
    assert!(!Path::new(&extracted).exists());
}

#[test]
fn test_chain_moves_explicit_alias_to_final_path() {
    let dir = TempDir::new().unwrap();
    let input = write_gz(&dir, "archive.csv.gz", b"x\n1\n");

    let mut chain = ResolverChain::new(&Config::default());
    let mut aliases = AliasMap::default();
    aliases.insert(input.clone(), "events".to_string());

    let resolved = chain.resolve(vec![input.clone()], &mut aliases).unwrap();
    assert_eq!(aliases.get(&input), None);
    assert_eq!(aliases.get(&resolved[0]), Some(&"events".to_string()));
    chain.cleanup();
}

#[test]
fn test_collection_override_suppresses_synthesized_alias() {
    let dir = TempDir::new().unwrap();
    let input = write_gz(&dir, "data.csv.gz", b"x\n1\n");

    let config = Config {
        collection: Some("my_table".to_string()),
        ..Default::default()
    };
    let mut chain = ResolverChain::new(&config);
    let mut aliases = AliasMap::default();
    let resolved = chain.resolve(vec![input], &mut aliases).unwrap();

    assert!(aliases.get(&resolved[0]).is_none());
    chain.cleanup();
}

#[test]
fn test_cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let input = write_gz(&dir, "data.csv.gz", b"x\n1\n");

    let mut chain = ResolverChain::new(&Config::default());
    let mut aliases = AliasMap::default();
    chain.resolve(vec![input], &mut aliases).unwrap();

    chain.cleanup();
    chain.cleanup();
}

#[test]
fn test_resolution_failure_cleans_up() {
    let dir = TempDir::new().unwrap();
    // Valid gz first, then a corrupt one: the chain must fail and leave
    // no temp files behind.
    let good = write_gz(&dir, "good.csv.gz", b"a\n1\n");
    let bad = dir.path().join("bad.csv.gz");
    std::fs::write(&bad, b"definitely not gzip").unwrap();

    let mut chain = ResolverChain::new(&Config::default());
    let mut aliases = AliasMap::default();
    let result = chain.resolve(
        vec![good, bad.to_string_lossy().into_owned()],
        &mut aliases,
    );
    assert!(result.is_err());
}
