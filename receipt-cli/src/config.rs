use anyhow::{Context, Result, bail};
use receipt_ingest::textract::DEFAULT_REGION;
use receipt_ingest::{Credentials, OcrBackend, ReplayBackend, TextractBackend};
use receipt_ledger::{ProcessorConfig, SUPPORTED_EXTENSIONS, WatchConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::state::ensure_receipts_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrSection,
    pub watch: WatchSection,
    pub ledger: LedgerSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Textract,
    /// Canned response file instead of a live service
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub provider: Provider,
    pub region: Option<String>,
    /// Overrides `https://textract.{region}.amazonaws.com/`
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    /// For provider = "replay": AnalyzeExpense JSON or plain text
    pub replay_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub settle_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    pub workers: usize,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub output: PathBuf,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            provider: Provider::Textract,
            region: None,
            endpoint: None,
            timeout_secs: 30,
            replay_path: None,
        }
    }
}

impl Default for WatchSection {
    fn default() -> Self {
        let watch = WatchConfig::default();
        Self {
            settle_ms: watch.settle_delay.as_millis() as u64,
            readiness_attempts: watch.readiness_attempts,
            readiness_interval_ms: watch.readiness_interval.as_millis() as u64,
            workers: watch.workers,
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output/receipt_data.csv"),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_receipts_home()?.join("config.toml"))
}

/// An explicit `--config` must exist; the default location is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let p = match explicit {
        Some(p) => {
            if !p.exists() {
                bail!("config file not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => {
            let p = config_path()?;
            if !p.exists() {
                debug!("no config at {}, using defaults", p.display());
                return Ok(Config::default());
            }
            p
        }
    };
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    Ok(toml::from_str(s)?)
}

pub fn save_config(cfg: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config(explicit: Option<&Path>) -> Result<()> {
    let p = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

impl Config {
    pub fn with_env(self) -> Self {
        self.with_lookup(|k| std::env::var(k).ok())
    }

    /// Environment overrides on top of the file.
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(region) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
            self.ocr.region = Some(region);
        }
        if let Some(provider) = get("RECEIPTS_OCR_PROVIDER") {
            match provider.to_ascii_lowercase().as_str() {
                "textract" => self.ocr.provider = Provider::Textract,
                "replay" => self.ocr.provider = Provider::Replay,
                other => warn!("ignoring unknown RECEIPTS_OCR_PROVIDER={other}"),
            }
        }
        if let Some(path) = get("RECEIPTS_REPLAY_PATH") {
            self.ocr.replay_path = Some(PathBuf::from(path));
        }
        if let Some(endpoint) = get("RECEIPTS_TEXTRACT_ENDPOINT") {
            self.ocr.endpoint = Some(endpoint);
        }
        self
    }

    pub fn region(&self) -> &str {
        self.ocr.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            ocr_timeout: Duration::from_secs(self.ocr.timeout_secs.max(1)),
            extensions: self
                .watch
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn watch_config(&self, workers: Option<usize>) -> WatchConfig {
        WatchConfig {
            settle_delay: Duration::from_millis(self.watch.settle_ms),
            readiness_attempts: self.watch.readiness_attempts.max(1),
            readiness_interval: Duration::from_millis(self.watch.readiness_interval_ms),
            workers: workers.unwrap_or(self.watch.workers),
        }
    }

    pub fn backend(&self) -> Result<Arc<dyn OcrBackend>> {
        self.backend_with(Credentials::from_env)
    }

    pub fn backend_with(
        &self,
        credentials: impl FnOnce() -> Result<Credentials>,
    ) -> Result<Arc<dyn OcrBackend>> {
        match self.ocr.provider {
            Provider::Textract => {
                if self.ocr.region.is_none() {
                    warn!("AWS region not set, defaulting to {DEFAULT_REGION}");
                }
                let creds = credentials().context("Textract needs AWS credentials")?;
                let backend = TextractBackend::new(
                    creds,
                    self.region(),
                    self.ocr.endpoint.clone(),
                    Duration::from_secs(self.ocr.timeout_secs.max(1)),
                )?;
                Ok(Arc::new(backend))
            }
            Provider::Replay => {
                let Some(path) = &self.ocr.replay_path else {
                    bail!("provider \"replay\" needs ocr.replay_path (or RECEIPTS_REPLAY_PATH)");
                };
                if !path.is_file() {
                    bail!("replay file not found: {}", path.display());
                }
                Ok(Arc::new(ReplayBackend::new(path)))
            }
        }
    }
}
