//! Service configuration
//!
//! Every setting comes from the environment (a `.env` file is honoured by the
//! binary through `dotenv`). Missing or unparsable values fall back to the
//! defaults below.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DATA_DIR_VAR: &str = "AXIOM_DATA_DIR";
pub const HOST_VAR: &str = "AXIOM_HOST";
pub const PORT_VAR: &str = "AXIOM_PORT";
pub const WEBHOOK_TIMEOUT_VAR: &str = "AXIOM_WEBHOOK_TIMEOUT_SECS";
pub const SOURCE_NAME_VAR: &str = "AXIOM_SOURCE_NAME";

/// Configuration for the ledger service
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Directory holding every store file
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Per-request timeout for MIGP webhook delivery
    pub webhook_timeout: Duration,
    /// Value sent in the `X-Source` header of MIGP deliveries
    pub source_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            webhook_timeout: Duration::from_secs(10),
            source_name: "axiom-ledger".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env::var(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: env::var(HOST_VAR).unwrap_or(defaults.host),
            port: parse_var(PORT_VAR, defaults.port),
            webhook_timeout: Duration::from_secs(parse_var(
                WEBHOOK_TIMEOUT_VAR,
                defaults.webhook_timeout.as_secs(),
            )),
            source_name: env::var(SOURCE_NAME_VAR).unwrap_or(defaults.source_name),
        }
    }

    /// Same defaults, rooted at `data_dir`. Used by tests and embedders.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn sacrifice_log(&self) -> PathBuf {
        self.path("sacrifice_log.jsonl")
    }

    pub fn contradictions(&self) -> PathBuf {
        self.path("contradictions.json")
    }

    pub fn identity_events(&self) -> PathBuf {
        self.path("identity_events.jsonl")
    }

    pub fn thresholds(&self) -> PathBuf {
        self.path("thresholds.json")
    }

    pub fn candidates(&self) -> PathBuf {
        self.path("candidates.json")
    }

    pub fn webhooks(&self) -> PathBuf {
        self.path("webhooks.json")
    }

    pub fn swarm_snapshot(&self) -> PathBuf {
        self.path("logs").join("last_swarm_analysis.json")
    }

    pub fn friction_candidates_dir(&self) -> PathBuf {
        self.path("candidates")
    }

    pub fn friction_events(&self) -> PathBuf {
        self.path("friction_events.jsonl")
    }

    pub fn gnosis_scans(&self) -> PathBuf {
        self.path("gnosis_scans.jsonl")
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
