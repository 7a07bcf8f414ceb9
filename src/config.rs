//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `OlympiqConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//! Every field except the credential has a default, so a minimal file is just:
//!
//! ```yaml
//! api_key: "sk-..."
//! ```
//!
//! An empty `api_key` is filled from the `OPENAI_API_KEY` environment variable
//! when that is set.
//!
//! # Examples
//!
//! ```no_run
//! use olympiq::config::load_config;
//!
//! let config = load_config("/path/to/config.yaml").unwrap();
//! config.validate().unwrap();
//! println!("{:?}", config.model);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::PathBuf};
use tracing::*;

use crate::error::ConfigError;
use crate::ingest::MalformedRowPolicy;

/// Environment variable consulted when `api_key` is empty.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct OlympiqConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// Chat-completion model.
    pub model: String,

    /// Embedding model used for queries. Must match the model that produced
    /// the vectors in the CSV.
    pub embedding_model: String,

    /// Name of the collection the CSV is loaded into.
    pub collection_name: String,

    /// Where to download the CSV from when `csv_path` is missing.
    pub csv_url: String,

    /// Local copy of the CSV.
    pub csv_path: PathBuf,

    /// Number of passages passed to the chat model as context.
    pub search_limit: usize,

    /// Passages scoring below this are not used as context.
    pub min_relevance: f64,

    /// Sampling temperature for the answer.
    pub temperature: f32,

    /// Report ingestion progress every this many records.
    pub progress_interval: usize,

    /// What to do with rows whose embedding cannot be used.
    pub malformed_rows: MalformedRowPolicy,

    /// Prompt template name under `<config_dir>/templates/`. The built-in
    /// template is used when unset.
    pub template: Option<String>,
}

impl Default for OlympiqConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            collection_name: "winterOlympics".to_string(),
            csv_url: "https://cdn.openai.com/API/examples/data/winter_olympics_2022.csv"
                .to_string(),
            csv_path: PathBuf::from("TestData").join("winter_olympics_2022.csv"),
            search_limit: 5,
            min_relevance: 0.0,
            temperature: 0.0,
            progress_interval: 1000,
            malformed_rows: MalformedRowPolicy::default(),
            template: None,
        }
    }
}

impl OlympiqConfig {
    /// Fill an empty `api_key` from `value` (normally `OPENAI_API_KEY`).
    pub fn with_api_key_fallback(mut self, value: Option<String>) -> Self {
        if self.api_key.trim().is_empty() {
            if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
                debug!("using API key from {}", API_KEY_ENV);
                self.api_key = key;
            }
        }
        self
    }

    /// Check the settings that must be present before the first remote call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("model"));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::Missing("embedding_model"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        if self.collection_name.trim().is_empty() {
            return Err(ConfigError::Missing("collection_name"));
        }
        if !(-1.0..=1.0).contains(&self.min_relevance) {
            return Err(ConfigError::OutOfRange {
                field: "min_relevance",
                value: self.min_relevance.to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::OutOfRange {
                field: "temperature",
                value: self.temperature.to_string(),
            });
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// Missing fields take their defaults; an empty `api_key` falls back to
/// `OPENAI_API_KEY`. The result is not validated, call
/// [`OlympiqConfig::validate`] before use.
///
/// # Returns
///
/// - `Ok(OlympiqConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: &str) -> Result<OlympiqConfig, Box<dyn Error>> {
    debug!("Loading config from: {}", file);
    let content = fs::read_to_string(file)?;
    let config: OlympiqConfig = serde_yaml::from_str(&content)?;
    Ok(config.with_api_key_fallback(std::env::var(API_KEY_ENV).ok()))
}
