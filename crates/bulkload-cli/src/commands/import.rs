use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bulkload_import::{DatabaseStore, ImportConfig, ImportOrchestrator};
use bulkload_types::{ImportParams, ImportRequest, ImportResult, Record};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use tracing::{debug, info};

use super::model_file::ModelFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct ImportCommand {
    /// Database connection URL
    #[arg(long, env = "BULKLOAD_DATABASE_URL")]
    pub database_url: String,

    /// JSON model file describing the import target
    #[arg(long)]
    pub model: PathBuf,

    /// JSON file holding an array of records (header row already stripped)
    #[arg(long)]
    pub records: PathBuf,

    /// Update existing entities matched by the lookup fields
    #[arg(long)]
    pub update_if_exists: bool,

    /// Field identifying an existing entity (repeatable)
    #[arg(long = "lookup-field")]
    pub lookup_fields: Vec<String>,

    /// Association mapping key override as FIELD=KEY (repeatable)
    #[arg(long = "mapping", value_parser = parse_mapping)]
    pub mappings: Vec<(String, String)>,

    /// Do not look for possible duplicates of new entities
    #[arg(long)]
    pub skip_fuzzy_search: bool,

    /// Discard the whole import when any row fails or warns
    #[arg(long)]
    pub rollback_on_error: bool,

    /// Maximum number of records accepted
    #[arg(long)]
    pub line_item_limit: Option<usize>,

    /// Copy the records file name into every record
    #[arg(long)]
    pub pass_filename: bool,

    /// Append every reported message to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, key)) if !field.trim().is_empty() && !key.trim().is_empty() => {
            Ok((field.trim().to_string(), key.trim().to_string()))
        }
        _ => Err(format!("expected FIELD=KEY, got '{}'", raw)),
    }
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid records file {}", path.display()))?;

    let Value::Array(items) = value else {
        anyhow::bail!("Records file {} must contain a JSON array", path.display());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(offset, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(anyhow::anyhow!(
                "Record {} in {} is not an object: {}",
                offset + 1,
                path.display(),
                other
            )),
        })
        .collect()
}

impl ImportCommand {
    fn config(&self) -> anyhow::Result<ImportConfig> {
        let mut config = ImportConfig::from_env()?;
        if self.rollback_on_error {
            config.rollback_on_error = true;
        }
        if self.pass_filename {
            config.pass_filename = true;
        }
        if let Some(limit) = self.line_item_limit {
            config.line_item_limit = limit;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
        Ok(config)
    }

    fn params(&self) -> ImportParams {
        ImportParams {
            update_if_exists: self.update_if_exists,
            update_lookup_fields: self.lookup_fields.clone(),
            association_mapping_keys: self.mappings.iter().cloned().collect::<HashMap<_, _>>(),
            skip_fuzzy_search: self.skip_fuzzy_search,
            filename: self
                .records
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let descriptor = ModelFile::load(&self.model)?.into_descriptor();
        let records = load_records(&self.records)?;
        let config = self.config()?;
        let params = self.params();

        info!(
            "Importing {} record(s) from {} into {}",
            records.len(),
            self.records.display(),
            descriptor.model
        );

        debug!("Initializing database connection...");
        let rt = tokio::runtime::Runtime::new()?;
        let result = rt.block_on(async {
            let store = DatabaseStore::connect(&self.database_url).await?;
            store.ensure_schema().await?;
            let orchestrator = ImportOrchestrator::new(config, descriptor, Arc::new(store))?;
            Ok::<_, anyhow::Error>(
                orchestrator
                    .import(ImportRequest::new(records).with_params(params))
                    .await,
            )
        })?;

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Text => print_result(&result),
        }

        if result.has_errors() {
            anyhow::bail!("{} row(s) failed to import", result.error.len());
        }
        Ok(())
    }
}

fn print_result(result: &ImportResult) {
    for line in &result.success {
        println!("{}", line.bright_green());
    }
    for line in &result.warning {
        println!("{}", line.bright_yellow());
    }
    for line in &result.error {
        println!("{}", line.bright_red());
    }

    println!();
    if let Some(summary) = &result.success_message {
        println!("{}", summary.bright_green().bold());
    }
    if let Some(summary) = &result.warning_message {
        println!("{}", summary.bright_yellow().bold());
    }
    if let Some(summary) = &result.error_message {
        println!("{}", summary.bright_red().bold());
    }
    if result.rolled_back {
        println!("{}", "All changes were rolled back".bright_red().bold());
    }
    for fuzzy in &result.fuzzy_matches {
        let candidates: Vec<String> = fuzzy.candidates.iter().map(ToString::to_string).collect();
        println!(
            "{} row {}: '{}' resembles {}",
            "Review".bright_white().bold(),
            fuzzy.row_index,
            fuzzy.full_name,
            candidates.join(", ")
        );
    }
}
