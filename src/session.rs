//! Orchestrator: wires resolvers, the engine, loaders, and the query
//! path together, and guarantees cleanup order.
//!
//! Lifecycle: parse tokens → resolver chain → open engine → detect
//! format → import → (REPL | print | export) → close loader → close
//! engine → cleanup resolvers in reverse order. Cleanup runs on every
//! exit path, success or error.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::config::{parse_input_token, Config, STDIN_SENTINEL};
use crate::detect;
use crate::error::{classify_query_error, DataqlError};
use crate::export;
use crate::loaders::{loader_for, LoadOptions};
use crate::params;
use crate::repl::{render_paged, RenderOptions, Repl};
use crate::resolve::{AliasMap, ResolverChain};
use crate::storage::{DuckDbStorage, Storage};

/// Run one full session from a frozen configuration.
pub fn run(config: Config) -> Result<()> {
    validate(&config)?;

    // Parse tokens and freeze the initial alias map.
    let mut aliases = AliasMap::default();
    let mut paths = Vec::with_capacity(config.inputs.len());
    for token in &config.inputs {
        let (path, alias) = parse_input_token(token);
        if let Some(alias) = alias {
            aliases.insert(path.clone(), alias);
        }
        paths.push(path);
    }

    // Local files must exist before any resolver spends work on the batch.
    for path in &paths {
        if path != STDIN_SENTINEL && !path.contains("://") && !Path::new(path).exists() {
            return Err(DataqlError::NotFound(path.clone()).into());
        }
    }

    let mut chain = ResolverChain::new(&config);
    let result = run_pipeline(&mut chain, &config, paths, aliases);
    chain.cleanup();
    result
}

fn validate(config: &Config) -> Result<()> {
    if config.inputs.is_empty() {
        return Err(DataqlError::Config("at least one input is required".to_string()).into());
    }
    if config.export_path.is_some() && config.export_type.is_none() {
        return Err(
            DataqlError::Config("--export requires --type".to_string()).into(),
        );
    }
    if config.export_type.is_some() && config.export_path.is_none() {
        return Err(
            DataqlError::Config("--type requires --export".to_string()).into(),
        );
    }
    if config.export_path.is_some() && config.query.is_none() {
        return Err(
            DataqlError::Config("--export requires --query".to_string()).into(),
        );
    }
    Ok(())
}

fn run_pipeline(
    chain: &mut ResolverChain,
    config: &Config,
    paths: Vec<String>,
    mut aliases: AliasMap,
) -> Result<()> {
    let resolved = chain.resolve(paths, &mut aliases)?;

    let storage: Arc<dyn Storage> =
        Arc::new(DuckDbStorage::open(config.store_path.as_deref())?);

    let format = detect::detect_batch(&resolved)?;
    log::debug!("detected format {format} for {} input(s)", resolved.len());

    let options = LoadOptions {
        delimiter: config.delimiter,
        line_limit: config.line_limit,
        collection: config.collection.clone(),
        aliases,
        no_schema: config.no_schema,
        quiet: config.quiet,
    };

    let start = Instant::now();
    let mut loader = loader_for(format, resolved, Arc::clone(&storage), options)?;
    let imported = loader.import();
    let lines = loader.lines();
    let closed = loader.close();
    imported?;
    closed?;

    if !config.quiet {
        eprintln!(
            "Imported {lines} rows in {:.2}s",
            start.elapsed().as_secs_f64()
        );
    }

    let outcome = match &config.query {
        None => {
            let mut repl = Repl::new(storage.as_ref(), config);
            repl.run()
        }
        Some(query) => run_query(storage.as_ref(), config, query),
    };

    let closed = storage.close();
    outcome?;
    closed
}

/// One-shot query: print to stdout, or run the exporter.
fn run_query(storage: &dyn Storage, config: &Config, query: &str) -> Result<()> {
    let sql = params::substitute(query, &config.query_params);
    let result = storage.query(&sql).map_err(|e| {
        let tables: Vec<String> = storage
            .tables()
            .map(|ts| ts.into_iter().map(|t| t.name).collect())
            .unwrap_or_default();
        DataqlError::Query(classify_query_error(&format!("{e:#}"), &tables))
    })?;

    match (&config.export_path, config.export_type) {
        (Some(path), Some(format)) => {
            export::export(&result, path, format)?;
            if !config.quiet {
                eprintln!("Exported {} rows to {}", result.row_count(), path.display());
            }
        }
        _ => {
            let options = RenderOptions {
                truncate: config.truncate,
                vertical: config.vertical,
                paging: config.paging,
                page_size: config.page_size.max(1),
                timing: config.timing,
            };
            let stdout = std::io::stdout();
            let stdin = std::io::stdin();
            render_paged(
                &result.columns,
                result.rows.clone(),
                &options,
                &mut stdout.lock(),
                &mut stdin.lock(),
            )?;
            if config.timing {
                eprintln!("({:.3}s)", result.execution_time_secs);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_export_pairing() {
        let mut config = Config {
            inputs: vec!["a.csv".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_ok());

        config.export_path = Some("out.csv".into());
        assert!(validate(&config).is_err());

        config.export_type = Some(crate::export::ExportFormat::Csv);
        assert!(validate(&config).is_err());

        config.query = Some("SELECT 1".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_requires_inputs() {
        let config = Config::default();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_local_file_is_not_found() {
        let config = Config {
            inputs: vec!["definitely_missing_file.csv".to_string()],
            ..Default::default()
        };
        let err = run(config).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 3);
    }
}
