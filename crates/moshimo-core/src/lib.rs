pub mod ai;
pub mod config;
pub mod controller;
pub mod generation;
pub mod persona;
pub mod prompt;
pub mod provider;
pub mod session;

// Re-export main types for convenience
pub use ai::{
    ClaudeClient, CompletionClient, CompletionError, CompletionRequest, CompletionResult,
    ErrorKind, OpenAIClient,
};
pub use config::{BackendOverrides, Config, ConfigError, ResolvedBackend};
pub use controller::{
    ConversationController, PendingTurn, Rejected, Resolution, TurnOutcome, TurnState,
};
pub use generation::{GenerationConfig, GenerationError};
pub use persona::{CatalogError, Persona, PersonaCatalog};
pub use provider::Provider;
pub use session::{Role, SessionId, SessionSnapshot, SessionState, Turn};
