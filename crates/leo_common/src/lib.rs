//! Leo Common - intent-to-action core of the Leo assistant
//!
//! Text comes in, a typed intent or an LLM-planned task comes out, and every
//! command passes the safety gate before it reaches the OS.

pub mod audit;
pub mod config;
pub mod confirm;
pub mod error;
pub mod executor;
pub mod intent;
pub mod ledger;
pub mod llm_client;
pub mod memory;
pub mod observer;
pub mod orchestrator;
pub mod paths;
pub mod prompts;
pub mod response;
pub mod router;
pub mod safety;
pub mod sanitizer;
pub mod system;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use config::{ExecutorSettings, GeneralSettings, LeoConfig};
pub use confirm::{AutoConfirm, Confirmer, ScriptedConfirmer};
pub use error::{LeoError, Result};
pub use executor::{ActionExecutor, RawOutcome};
pub use intent::{parse_intent, Intent, ServiceVerb};
pub use ledger::RetryLedger;
pub use llm_client::{FakeLlmClient, HttpLlmClient, LlmClient, LlmConfig, LlmError};
pub use memory::{MemoryStore, TaskStatus};
pub use observer::{observe, Observation, ObservationStatus};
pub use orchestrator::Orchestrator;
pub use response::{RecordingResponder, Responder};
pub use router::{NlRouter, RouteDecision};
pub use safety::SafetyPolicy;
pub use sanitizer::{SanitizeVerdict, SanitizedSuggestion, SuggestionSanitizer};
pub use system::{FakeSystem, HostSystem, ProcessOutcome, SystemOps};
