pub mod types;
pub mod utils;
pub mod transcript;
pub mod analyzer;
pub mod rewriter;
pub mod similarity;
pub mod collaborators;
pub mod retry;
pub mod artifacts;
pub mod pipeline;

pub use types::*;
pub use transcript::TranscriptStore;
pub use analyzer::Analyzer;
pub use rewriter::{HttpGeneratorConfig, HttpTextGenerator, RuleBasedGenerator, Rewriter, TextGenerator};
pub use similarity::Scorer;
pub use retry::RetryPolicy;
pub use artifacts::{ArtifactStore, StoredArtifact};
pub use pipeline::{Collaborators, Orchestrator};
