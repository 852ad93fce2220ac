use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

/// A timestamped span of transcript text. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: f64,
}

/// Raw segment shape as produced by a transcript extractor, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Canonical transcript document. Read-only to all downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub language: String,
    pub word_count: usize,
    pub source_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Narrative,
    Instructional,
    Informational,
    Conversational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub topic: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPointType {
    Fact,
    Opinion,
    Instruction,
    Example,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyPoint {
    pub point: String,
    #[serde(rename = "type")]
    pub point_type: KeyPointType,
    pub importance_score: u8,
    pub category: String,
}

/// Percentages always sum to exactly 100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DifficultyDistribution {
    pub easy_percentage: u8,
    pub medium_percentage: u8,
    pub hard_percentage: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentInsights {
    pub content_flow: String,
    pub engagement_factors: BTreeSet<String>,
    pub difficulty_distribution: DifficultyDistribution,
}

/// Structure derived deterministically from a transcript document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentStructure {
    pub total_words: usize,
    pub total_sentences: usize,
    pub estimated_duration_minutes: f64,
    pub content_type: ContentType,
    pub complexity_level: ComplexityLevel,
    pub topics: Vec<Topic>,
    pub key_points: Vec<KeyPoint>,
    pub insights: ContentInsights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    Enhance,
    Simplify,
    Formalize,
    Casual,
}

impl ModificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enhance => "enhance",
            Self::Simplify => "simplify",
            Self::Formalize => "formalize",
            Self::Casual => "casual",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "enhance" => Ok(Self::Enhance),
            "simplify" => Ok(Self::Simplify),
            "formalize" => Ok(Self::Formalize),
            "casual" => Ok(Self::Casual),
            other => Err(PipelineError::InvalidPolicy {
                field: "modification_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    General,
    Technical,
    Academic,
    Casual,
}

impl TargetAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Technical => "technical",
            Self::Academic => "academic",
            Self::Casual => "casual",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "general" => Ok(Self::General),
            "technical" => Ok(Self::Technical),
            "academic" => Ok(Self::Academic),
            "casual" => Ok(Self::Casual),
            other => Err(PipelineError::InvalidPolicy {
                field: "target_audience".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreference {
    Professional,
    Conversational,
    Academic,
}

impl StylePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Conversational => "conversational",
            Self::Academic => "academic",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "professional" => Ok(Self::Professional),
            "conversational" => Ok(Self::Conversational),
            "academic" => Ok(Self::Academic),
            other => Err(PipelineError::InvalidPolicy {
                field: "style_preference".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Transformation policy validated at the pipeline boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewritePolicy {
    pub modification_type: ModificationType,
    pub target_audience: TargetAudience,
    pub style_preference: StylePreference,
}

impl RewritePolicy {
    /// Parse a policy from free-form strings, rejecting anything outside the
    /// closed enumerations before any stage runs.
    pub fn parse(modification_type: &str, target_audience: &str, style_preference: &str) -> Result<Self> {
        Ok(Self {
            modification_type: ModificationType::parse(modification_type)?,
            target_audience: TargetAudience::parse(target_audience)?,
            style_preference: StylePreference::parse(style_preference)?,
        })
    }
}

impl Default for RewritePolicy {
    fn default() -> Self {
        Self {
            modification_type: ModificationType::Enhance,
            target_audience: TargetAudience::General,
            style_preference: StylePreference::Professional,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStats {
    pub text: String,
    pub word_count: usize,
    pub character_count: usize,
}

impl TextStats {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            word_count: text.split_whitespace().count(),
            character_count: text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadabilityChange {
    Improved,
    Maintained,
    Adjusted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImprovementMetrics {
    pub word_count_change: i64,
    pub word_count_change_percent: f64,
    pub complexity_improvement: f64,
    pub readability_improvement: ReadabilityChange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewrittenText {
    pub text: String,
    pub word_count: usize,
    pub character_count: usize,
    pub improvement_metrics: ImprovementMetrics,
}

/// One rewrite invocation's complete result. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteResult {
    pub original: TextStats,
    pub rewritten: RewrittenText,
    pub policy: RewritePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAssessment {
    Safe,
    Caution,
    HighRisk,
}

/// Derived view over an (original, rewritten) pair. Never persisted as
/// authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityReport {
    pub similarity_score: f64,
    pub similarity_level: SimilarityLevel,
    pub word_overlap_percentage: f64,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Ingest,
    Analyze,
    Rewrite,
    Score,
    SynthesizeSpeech,
    GenerateVisuals,
    ComposeVideo,
}

impl StageName {
    /// Stages in strict execution order.
    pub const ORDER: [StageName; 7] = [
        StageName::Ingest,
        StageName::Analyze,
        StageName::Rewrite,
        StageName::Score,
        StageName::SynthesizeSpeech,
        StageName::GenerateVisuals,
        StageName::ComposeVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Analyze => "analyze",
            Self::Rewrite => "rewrite",
            Self::Score => "score",
            Self::SynthesizeSpeech => "synthesize_speech",
            Self::GenerateVisuals => "generate_visuals",
            Self::ComposeVideo => "compose_video",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub state: StageState,
    pub artifact_ref: Option<String>,
    pub error: Option<StageError>,
}

impl StageStatus {
    pub fn pending() -> Self {
        Self {
            state: StageState::Pending,
            artifact_ref: None,
            error: None,
        }
    }
}

/// Single source of truth for a run's progress and resumability.
/// Owned and mutated exclusively by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub source_ref: String,
    pub policy: RewritePolicy,
    pub stage_statuses: BTreeMap<StageName, StageStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(source_ref: String, policy: RewritePolicy) -> Self {
        let now = Utc::now();
        let stage_statuses = StageName::ORDER
            .iter()
            .map(|stage| (*stage, StageStatus::pending()))
            .collect();
        Self {
            id: Uuid::new_v4(),
            source_ref,
            policy,
            stage_statuses,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, name: StageName) -> &StageStatus {
        &self.stage_statuses[&name]
    }

    /// The most recent failed stage, if any.
    pub fn latest_failure(&self) -> Option<(StageName, &StageError)> {
        StageName::ORDER
            .iter()
            .rev()
            .filter_map(|stage| {
                let status = &self.stage_statuses[stage];
                match (&status.state, &status.error) {
                    (StageState::Failed, Some(err)) => Some((*stage, err)),
                    _ => None,
                }
            })
            .next()
    }

    pub fn all_succeeded(&self) -> bool {
        self.stage_statuses
            .values()
            .all(|status| status.state == StageState::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionStatus {
    Allowed,
    AgeRestricted,
    RegionBlocked,
    Unavailable,
}

/// Resolved source metadata returned by the source resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: f64,
    pub restriction_status: RestrictionStatus,
    pub uploader: String,
    pub view_count: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub voice: String,
    pub speed: f64,
    pub pitch: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "neutral".to_string(),
            speed: 1.0,
            pitch: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechOutput {
    pub audio_file_ref: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    pub template: String,
    pub color_scheme: String,
    pub max_words_per_slide: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            template: "modern".to_string(),
            color_scheme: "dark".to_string(),
            max_words_per_slide: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualContentType {
    Slide,
    Image,
    Graphic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Fade,
    Cut,
    SlideLeft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSegment {
    pub content_type: VisualContentType,
    pub duration_seconds: f64,
    pub asset_ref: String,
    pub transition_type: TransitionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub resolution: String,
    pub fps: u32,
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            resolution: "1280x720".to_string(),
            fps: 30,
            format: "mp4".to_string(),
        }
    }
}

/// Composed output video description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOutput {
    pub video_file_ref: String,
    pub total_duration: f64,
    pub segment_count: usize,
}

/// Tunable thresholds for the structural analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub max_topics: usize,
    pub max_key_points: usize,
    /// Average words/sentence below this is low complexity.
    pub low_complexity_max_words: f64,
    /// Average words/sentence above this is high complexity.
    pub high_complexity_min_words: f64,
    /// Average word length above this bumps complexity one level up.
    pub long_word_threshold: f64,
    /// Words this short never become topics.
    pub min_topic_word_len: usize,
    /// Average speaking rate used to estimate spoken duration.
    pub words_per_minute: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_topics: 10,
            max_key_points: 10,
            low_complexity_max_words: 12.0,
            high_complexity_min_words: 20.0,
            long_word_threshold: 6.0,
            min_topic_word_len: 3,
            words_per_minute: 150.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Minimum word-level edit distance a rewrite must achieve.
    pub min_edit_distance: usize,
    /// Generation attempts before giving up with the best attempt attached.
    pub max_attempts: u32,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            min_edit_distance: 10,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Weight of the word-set overlap component.
    pub overlap_weight: f64,
    /// Weight of the word n-gram sequence component.
    pub sequence_weight: f64,
    pub ngram_size: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            overlap_weight: 0.6,
            sequence_weight: 0.4,
            ngram_size: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 1,
            max_delay_seconds: 30,
            multiplier: 2.0,
        }
    }
}

/// Shared read-only pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub artifact_root: PathBuf,
    pub language: String,
    /// Mandatory per-call timeout for every external collaborator call.
    pub call_timeout_seconds: u64,
    pub retry: RetryConfig,
    pub analyzer: AnalyzerConfig,
    pub rewrite: RewriteConfig,
    pub scorer: ScorerConfig,
    pub voice: VoiceConfig,
    pub style: StyleConfig,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("artifacts"),
            language: "en".to_string(),
            call_timeout_seconds: 30,
            retry: RetryConfig::default(),
            analyzer: AnalyzerConfig::default(),
            rewrite: RewriteConfig::default(),
            scorer: ScorerConfig::default(),
            voice: VoiceConfig::default(),
            style: StyleConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed transcript input: {0}")]
    MalformedInput(String),

    #[error("No text content to analyze")]
    EmptyContent,

    #[error("Invalid rewrite policy: {field} = '{value}'")]
    InvalidPolicy { field: String, value: String },

    #[error("Rewrite too similar to the original after retries (edit distance {edit_distance})")]
    InsufficientTransformation {
        edit_distance: usize,
        best_attempt: Box<RewriteResult>,
    },

    #[error("Source forbids processing: {reason}")]
    RestrictedContent { reason: String },

    #[error("Collaborator call '{operation}' timed out after {seconds}s")]
    CollaboratorTimeout { operation: String, seconds: u64 },

    #[error("Collaborator call '{operation}' failed: {reason}")]
    CollaboratorUnavailable { operation: String, reason: String },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Run not found: {id}")]
    RunNotFound { id: Uuid },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("General error: {0}")]
    General(String),
}

impl PipelineError {
    /// Stable kind string recorded on failed stages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::EmptyContent => "empty_content",
            Self::InvalidPolicy { .. } => "invalid_policy",
            Self::InsufficientTransformation { .. } => "insufficient_transformation",
            Self::RestrictedContent { .. } => "restricted_content",
            Self::CollaboratorTimeout { .. } => "collaborator_timeout",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::Cancelled => "cancelled",
            Self::RunNotFound { .. } => "run_not_found",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Http(_) => "http",
            Self::General(_) => "general",
        }
    }

    /// Only transient collaborator failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorTimeout { .. } | Self::CollaboratorUnavailable { .. } | Self::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
