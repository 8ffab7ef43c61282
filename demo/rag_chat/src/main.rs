mod config;
use config::{GeneratorKind, RagChatConfig};
use parley_core::message::{DocumentRef, QueryRequest};
use parley_core::telemetry::init_tracing;
use parley_core::{
    names, BoundarySink, Coordinator, Delivery, Envelope, Message, MessageBus,
    DUPLICATE_REQUEST_CONTEXT,
};
use parley_core::ParleyError;
use parley_workers::{register_workers, AnswerGenerator, ExtractiveGenerator};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info};

/// Prints boundary traffic for the person at the terminal
struct ConsoleBoundary;

impl BoundarySink for ConsoleBoundary {
    fn deliver(&self, envelope: Envelope) {
        match envelope.message() {
            Message::StatusUpdate(update) => {
                println!("[{}] {}", update.status, update.message);
            }
            Message::FinalResponse(response) => {
                println!("\n{}\n", response.answer);
                for (i, meta) in response.source_metadata.iter().enumerate() {
                    let file = meta
                        .get("file_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    let chunk = meta
                        .get("chunk_index")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "?".into());
                    println!("  source {}: {} (chunk {})", i + 1, file, chunk);
                }
            }
            // Not terminal: the original request is still running
            Message::Error(report) if report.context == DUPLICATE_REQUEST_CONTEXT => {
                println!("ignored: {}", report.error);
            }
            Message::Error(report) => {
                println!("error: {} ({})", report.error, report.context);
            }
            other => debug!(target: "rag_chat", kind = %other.kind(), "Ignoring boundary message"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Upload(PathBuf),
    Ask(String),
    Status,
    Help,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    match head.to_lowercase().as_str() {
        "upload" => Command::Upload(PathBuf::from(rest)),
        "ask" => Command::Ask(rest.to_string()),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        // Anything else is a question
        _ => Command::Ask(line.to_string()),
    }
}

fn document_ref(path: &Path) -> DocumentRef {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_type = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    DocumentRef::new(path.to_string_lossy(), file_name, file_type)
}

fn build_generator(cfg: &RagChatConfig) -> Result<Arc<dyn AnswerGenerator>, ParleyError> {
    match cfg.generator {
        GeneratorKind::Extractive => Ok(Arc::new(ExtractiveGenerator::new(
            cfg.max_answer_sentences,
        ))),
        #[cfg(feature = "llm")]
        GeneratorKind::Llm => {
            let generator = parley_workers::HttpGenerator::from_env()?;
            info!(
                target: "rag_chat",
                base_url = %generator.config().base_url,
                model = %generator.config().model,
                "Using chat completions backend"
            );
            Ok(Arc::new(generator))
        }
        #[cfg(not(feature = "llm"))]
        GeneratorKind::Llm => Err(ParleyError::Config(
            "generator \"llm\" needs rag_chat built with --features llm".into(),
        )),
    }
}

// Handlers run synchronously and may block on file or network I/O
async fn dispatch(
    bus: &Arc<MessageBus>,
    envelope: Envelope,
) -> Result<Delivery, tokio::task::JoinError> {
    let bus = Arc::clone(bus);
    tokio::task::spawn_blocking(move || bus.send(envelope)).await
}

fn print_help() {
    println!("commands:");
    println!("  upload <path>   index a document (txt, md, csv, log, json, pdf, docx, pptx)");
    println!("  ask <question>  ask about uploaded documents (bare text works too)");
    println!("  status          show in-flight requests and index size");
    println!("  quit            exit");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = match RagChatConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(&RagChatConfig::default().log_filter)?;
            error!(target: "rag_chat", error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    init_tracing(&cfg.log_filter)?;
    match &cfg.source {
        Some(path) => info!(target: "rag_chat", path = %path.display(), "Loaded TOML config"),
        None => info!(target: "rag_chat", "No TOML config found; using defaults/env"),
    }
    cfg.retrieval.validate()?;

    info!(
        target: "rag_chat",
        chunk_size = cfg.retrieval.chunk_size,
        chunk_overlap = cfg.retrieval.chunk_overlap,
        top_k = cfg.retrieval.top_k,
        request_ttl_ms = cfg.coordinator.request_ttl.as_millis() as u64,
        "Starting RAG chat demo"
    );

    let bus = Arc::new(MessageBus::new());
    let coordinator = Arc::new(Coordinator::new(
        cfg.coordinator.clone(),
        Arc::new(ConsoleBoundary),
    ));
    bus.register_worker(Arc::clone(&coordinator));
    let generator = {
        let cfg = cfg.clone();
        tokio::task::spawn_blocking(move || build_generator(&cfg)).await??
    };
    let workers = register_workers(&bus, cfg.retrieval.clone(), generator);

    // Anything sent before every worker registered goes out now
    let report = bus.drain_pending();
    debug!(target: "rag_chat", attempted = report.attempted, "Start-up drain finished");

    let sweeper = Arc::clone(&coordinator).spawn_sweeper(cfg.sweep_interval);

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = signal::ctrl_c() => {
                info!(target: "rag_chat", "Interrupted");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(target: "rag_chat", error = %e, "Failed to read stdin");
                break;
            }
        };

        match parse_command(&line) {
            Command::Upload(path) => {
                let request = Envelope::new(
                    names::BOUNDARY,
                    names::COORDINATOR,
                    Message::UploadRequest(document_ref(&path)),
                );
                let delivery = dispatch(&bus, request).await?;
                debug!(target: "rag_chat", ?delivery, "Upload dispatched");
            }
            Command::Ask(query) => {
                let request = Envelope::new(
                    names::BOUNDARY,
                    names::COORDINATOR,
                    Message::QueryRequest(QueryRequest { query }),
                );
                let delivery = dispatch(&bus, request).await?;
                debug!(target: "rag_chat", ?delivery, "Query dispatched");
            }
            Command::Status => {
                println!(
                    "in flight: {}, indexed chunks: {}, queued: {}, receivers: {}",
                    coordinator.in_flight(),
                    workers.retrieval.indexed_chunks(),
                    bus.pending_len(),
                    bus.receivers().join(", ")
                );
            }
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Empty => {}
        }
    }

    sweeper.abort();
    info!(target: "rag_chat", "Shutting down");
    // The HTTP generator owns a blocking client, which must not drop on a runtime thread
    tokio::task::spawn_blocking(move || drop((workers, bus))).await?;
    Ok(())
}
