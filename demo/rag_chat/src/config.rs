use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parley_core::{CoordinatorConfig, ParleyError};
use parley_workers::RetrievalConfig;

/// Which answer generator the responder uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Quote the best-matching context sentences
    Extractive,
    /// Ask an OpenAI-compatible chat backend (needs the `llm` feature)
    Llm,
}

impl GeneratorKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "extractive" => Some(Self::Extractive),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

/// High-level configuration for the RAG chat demo
#[derive(Clone, Debug)]
pub struct RagChatConfig {
    pub coordinator: CoordinatorConfig,
    pub retrieval: RetrievalConfig,
    /// How often stale requests are swept
    pub sweep_interval: Duration,
    pub generator: GeneratorKind,
    /// Sentences the extractive responder may quote
    pub max_answer_sentences: usize,
    /// Filter used when RUST_LOG is unset
    pub log_filter: String,
    /// TOML file the overlay came from, if one was found
    pub source: Option<PathBuf>,
}

impl Default for RagChatConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            sweep_interval: Duration::from_millis(
                std::env::var("RAG_CHAT_SWEEP_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(5_000),
            ),
            generator: std::env::var("RAG_CHAT_GENERATOR")
                .ok()
                .and_then(|v| GeneratorKind::parse(&v))
                .unwrap_or(GeneratorKind::Extractive),
            max_answer_sentences: std::env::var("RAG_CHAT_MAX_SENTENCES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3),
            log_filter: "info,parley_core=info,parley_workers=info,rag_chat=info".to_string(),
            source: None,
        }
    }
}

impl RagChatConfig {
    /// Load configuration from a TOML file (path via RAG_CHAT_CONFIG or ./rag_chat.toml),
    /// overlaying values onto env-driven defaults.
    ///
    /// Runs before tracing is up, so nothing is logged here; a file that exists
    /// but cannot be read or parsed is returned as an error for the caller to report.
    pub fn load() -> Result<Self, ParleyError> {
        let path = std::env::var("RAG_CHAT_CONFIG").unwrap_or_else(|_| "rag_chat.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ParleyError> {
        let default = Self::default();
        if !path.exists() {
            return Ok(default);
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let overlay = toml::from_str::<RagChatToml>(&raw).map_err(|e| {
            ParleyError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        let mut cfg = overlay.overlay(default);
        cfg.source = Some(path.to_path_buf());
        Ok(cfg)
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RagChatToml {
    pub request_ttl_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub generator: Option<GeneratorKind>,
    pub max_answer_sentences: Option<usize>,
    pub log_filter: Option<String>,
    pub retrieval: Option<RetrievalToml>,
}

impl RagChatToml {
    fn overlay(self, mut base: RagChatConfig) -> RagChatConfig {
        if let Some(ms) = self.request_ttl_ms {
            base.coordinator = base.coordinator.with_request_ttl(Duration::from_millis(ms));
        }
        if let Some(ms) = self.sweep_interval_ms {
            base.sweep_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(g) = self.generator {
            base.generator = g;
        }
        if let Some(n) = self.max_answer_sentences {
            base.max_answer_sentences = n.max(1);
        }
        if let Some(f) = self.log_filter {
            base.log_filter = f;
        }
        if let Some(r) = self.retrieval {
            r.apply(&mut base.retrieval);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RetrievalToml {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
}

impl RetrievalToml {
    fn apply(self, r: &mut RetrievalConfig) {
        if let Some(v) = self.chunk_size {
            r.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            r.chunk_overlap = v;
        }
        if let Some(v) = self.top_k {
            r.top_k = v;
        }
    }
}
