//! Runtime - wires config into an orchestrator and runs it
//!
//! Responsibilities:
//! - Load config and start logging
//! - Build the executor, router and memory from config
//! - Dispatch to one-shot or interactive mode

use anyhow::Result;
use leo_common::response::present;
use leo_common::{
    ActionExecutor, AuditLog, AutoConfirm, Confirmer, HostSystem, HttpLlmClient, LeoConfig,
    MemoryStore, NlRouter, Orchestrator, Responder, SafetyPolicy, SuggestionSanitizer,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::console::{ConsoleConfirmer, ConsoleResponder};
use crate::{logging, repl};

/// Main application entry point after CLI parsing
pub async fn run(cli: Cli) -> Result<()> {
    let config = LeoConfig::load(cli.config.as_deref())?;
    logging::init(&config.log.level);

    let confirmer: Arc<dyn Confirmer> = if cli.yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(ConsoleConfirmer)
    };
    let responder = Arc::new(ConsoleResponder::new());

    let mut orchestrator =
        build_orchestrator(&config, confirmer, responder.clone(), !cli.no_memory).await?;

    match cli.text {
        Some(text) => {
            if let Some(reply) = orchestrator.handle_text(&text).await {
                present(responder.as_ref(), &reply, &config.general);
            }
            Ok(())
        }
        None => repl::run(&mut orchestrator, responder.as_ref(), &config.general).await,
    }
}

/// Assemble the turn pipeline against the real host
pub async fn build_orchestrator(
    config: &LeoConfig,
    confirmer: Arc<dyn Confirmer>,
    responder: Arc<dyn Responder>,
    use_memory: bool,
) -> Result<Orchestrator> {
    let executor = ActionExecutor::new(
        Arc::new(HostSystem::new()?),
        SafetyPolicy::default(),
        confirmer.clone(),
        config.executor.clone(),
    )
    .with_audit(AuditLog::discover());

    let router = NlRouter::new(Arc::new(HttpLlmClient::new(config.llm.clone())?));
    let sanitizer =
        SuggestionSanitizer::default().with_extra_vocabulary(&config.safety.extra_vocabulary);

    let mut orchestrator = Orchestrator::new(executor, router, sanitizer, confirmer, responder)
        .with_wake_word(config.general.normalized_wake_word());

    if use_memory && config.memory.enabled {
        match config.memory.resolved_db_path() {
            Some(path) => match MemoryStore::open(path).await {
                Ok(store) => {
                    orchestrator =
                        orchestrator.with_memory(store, config.memory.effective_recent_turns());
                }
                Err(e) => warn!("Memory unavailable, continuing without history: {}", e),
            },
            None => warn!("No data directory for memory, continuing without history"),
        }
    } else {
        info!("Memory disabled");
    }

    Ok(orchestrator)
}
