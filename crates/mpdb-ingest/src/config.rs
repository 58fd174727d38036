//! Pipeline configuration
//!
//! Loaded from a JSON file (`config.json` by default) whose relative paths are
//! resolved against the file's own directory, then overridden by environment
//! variables (a `.env` file is honoured):
//!
//! - `MPDB_OUTPUT_DIR`: directory receiving `data.json`
//! - `MPDB_HTTP_TIMEOUT_SECS`, `MPDB_HTTP_MAX_RETRIES`, `MPDB_HTTP_CONCURRENCY`

use crate::providers::{MembraneSource, PdbeFeature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// Defaults
// ============================================================================

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default output directory (relative to the config file)
pub const DEFAULT_OUTPUT_DIR: &str = "results/";

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts, doubled on every retry
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Default number of concurrent per-entry requests within a stage
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default number of identifiers per RCSB GraphQL request
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read RCSB query file '{path}': {source}")]
    QueryFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory receiving `data.json`
    #[serde(default = "default_output")]
    pub output: PathBuf,

    pub search: SearchConfig,

    pub data: DataConfig,

    #[serde(default)]
    pub membrane: MembraneConfig,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub endpoints: Endpoints,
}

/// One labelled search clause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelledQuery {
    pub label: String,
    pub parameters: Value,
}

/// Search section: labelled clauses combined by a boolean expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub query: Vec<LabelledQuery>,
    pub expression: String,
}

impl SearchConfig {
    /// Label to parameters mapping for the query compiler
    pub fn parameters(&self) -> BTreeMap<String, Value> {
        self.query
            .iter()
            .map(|item| (item.label.clone(), item.parameters.clone()))
            .collect()
    }
}

/// Data section: what to fetch and where structures go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// File holding the RCSB GraphQL detail query
    pub rcsb: PathBuf,

    /// PDBe-KB features every curated entry must have
    #[serde(default)]
    pub pdbe: Vec<String>,

    /// Directory for experimental structures (mmCIF)
    pub pdb: PathBuf,

    /// Directory for membrane-embedded structures (PDB)
    pub tm: PathBuf,

    /// Contents of the `rcsb` query file, read at load time
    #[serde(skip)]
    pub rcsb_query: String,
}

/// Membrane annotation preference, highest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembraneConfig {
    pub preference: Vec<MembraneSource>,
}

impl Default for MembraneConfig {
    fn default() -> Self {
        Self {
            preference: vec![
                MembraneSource::Pdbtm,
                MembraneSource::Opm,
                MembraneSource::Memprotmd,
            ],
        }
    }
}

/// HTTP client behaviour shared by every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Attempts per request, including the first one
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub concurrency: usize,
    pub batch_size: usize,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            user_agent: concat!("mpdb-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Base URLs of every external service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub rcsb_search: String,
    pub rcsb_graphql: String,
    pub rcsb_files: String,
    pub pdbe: String,
    pub pdbtm: String,
    pub opm: String,
    pub opm_assets: String,
    pub memprotmd: String,
    pub uniprot_sparql: String,
    pub alphafold: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            rcsb_search: "https://search.rcsb.org/rcsbsearch/v2/query".to_string(),
            rcsb_graphql: "https://data.rcsb.org/graphql".to_string(),
            rcsb_files: "https://files.rcsb.org".to_string(),
            pdbe: "https://www.ebi.ac.uk/pdbe/api".to_string(),
            pdbtm: "https://pdbtm.unitmp.org".to_string(),
            opm: "https://opm-back.cc.lehigh.edu".to_string(),
            opm_assets: "https://biomembhub.org".to_string(),
            memprotmd: "https://memprotmd.bioch.ox.ac.uk".to_string(),
            uniprot_sparql: "https://sparql.uniprot.org/sparql".to_string(),
            alphafold: "https://alphafold.ebi.ac.uk".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every service at one base URL (mock servers in tests)
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            rcsb_search: format!("{base}/rcsbsearch/v2/query"),
            rcsb_graphql: format!("{base}/graphql"),
            rcsb_files: base.clone(),
            pdbe: format!("{base}/pdbe/api"),
            pdbtm: base.clone(),
            opm: base.clone(),
            opm_assets: base.clone(),
            memprotmd: base.clone(),
            uniprot_sparql: format!("{base}/sparql"),
            alphafold: base,
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

impl PipelineConfig {
    /// Load, resolve, apply environment overrides, and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        dotenvy::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: PipelineConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.apply_env_overrides();
        config.load_rcsb_query()?;
        config.validate()?;

        info!(config = %path.display(), "Loaded pipeline configuration");
        debug!(?config, "Resolved configuration");
        Ok(config)
    }

    /// Anchor relative paths at `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.output,
            &mut self.data.rcsb,
            &mut self.data.pdb,
            &mut self.data.tm,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MPDB_OUTPUT_DIR") {
            self.output = PathBuf::from(dir);
        }
        if let Some(timeout) = env_parse("MPDB_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = timeout;
        }
        if let Some(retries) = env_parse("MPDB_HTTP_MAX_RETRIES") {
            self.http.max_retries = retries;
        }
        if let Some(concurrency) = env_parse("MPDB_HTTP_CONCURRENCY") {
            self.http.concurrency = concurrency;
        }
    }

    fn load_rcsb_query(&mut self) -> Result<(), ConfigError> {
        self.data.rcsb_query =
            std::fs::read_to_string(&self.data.rcsb).map_err(|source| ConfigError::QueryFile {
                path: self.data.rcsb.clone(),
                source,
            })?;
        info!(query = %self.data.rcsb.display(), "Loaded RCSB query from file");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.expression.trim().is_empty() {
            return Err(ConfigError::Invalid("search.expression cannot be empty".to_string()));
        }

        let mut labels = HashSet::new();
        for item in &self.search.query {
            if !labels.insert(item.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate search label '{}'",
                    item.label
                )));
            }
        }

        for feature in &self.data.pdbe {
            feature
                .parse::<PdbeFeature>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        if self.membrane.preference.is_empty() {
            return Err(ConfigError::Invalid(
                "membrane.preference must name at least one source".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for source in &self.membrane.preference {
            if !seen.insert(*source) {
                return Err(ConfigError::Invalid(format!(
                    "membrane source '{source}' listed twice"
                )));
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be greater than 0".to_string()));
        }
        if self.http.concurrency == 0 {
            return Err(ConfigError::Invalid("http.concurrency must be greater than 0".to_string()));
        }
        if self.http.batch_size == 0 {
            return Err(ConfigError::Invalid("http.batch_size must be greater than 0".to_string()));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
