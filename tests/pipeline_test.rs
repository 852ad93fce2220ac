use async_trait::async_trait;
use recast::collaborators::{
    MockSourceResolver, MockSpeechSynthesizer, MockTranscriptExtractor, MockVideoComposer,
    MockVisualGenerator, SpeechSynthesizer,
};
use recast::{
    ArtifactStore, Collaborators, Orchestrator, PipelineConfig, PipelineError, Result,
    RewritePolicy, RewriteResult, RiskAssessment, RuleBasedGenerator, SimilarityLevel,
    SimilarityReport, SpeechOutput, StageName, StageState, TextGenerator, TranscriptDocument,
    VoiceConfig,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

const SOURCE_URL: &str = "https://example.com/watch?v=sorting-intro";

struct Mocks {
    resolver: Arc<MockSourceResolver>,
    extractor: Arc<MockTranscriptExtractor>,
    synthesizer: Arc<MockSpeechSynthesizer>,
    visuals: Arc<MockVisualGenerator>,
    composer: Arc<MockVideoComposer>,
}

impl Mocks {
    fn new() -> Self {
        Self {
            resolver: Arc::new(MockSourceResolver::new()),
            extractor: Arc::new(MockTranscriptExtractor::new()),
            synthesizer: Arc::new(MockSpeechSynthesizer::new()),
            visuals: Arc::new(MockVisualGenerator::new()),
            composer: Arc::new(MockVideoComposer::new()),
        }
    }

    fn total_calls(&self) -> usize {
        self.resolver.call_count()
            + self.extractor.call_count()
            + self.synthesizer.call_count()
            + self.visuals.call_count()
            + self.composer.call_count()
    }
}

fn test_config(artifact_root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        artifact_root: artifact_root.to_path_buf(),
        ..PipelineConfig::default()
    };
    config.retry.initial_delay_seconds = 0;
    config.retry.max_delay_seconds = 0;
    config
}

fn orchestrator_with(mocks: &Mocks, artifact_root: &Path) -> Orchestrator {
    let collaborators = Collaborators {
        resolver: mocks.resolver.clone(),
        extractor: mocks.extractor.clone(),
        synthesizer: mocks.synthesizer.clone(),
        visuals: mocks.visuals.clone(),
        composer: mocks.composer.clone(),
    };
    Orchestrator::new(
        test_config(artifact_root),
        collaborators,
        Arc::new(RuleBasedGenerator),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

#[tokio::test]
async fn pipeline_end_to_end() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let orchestrator = orchestrator_with(&mocks, dir.path());

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;

    assert!(run.all_succeeded(), "run halted: {:?}", run.latest_failure());
    for stage in StageName::ORDER {
        assert!(run.stage(stage).artifact_ref.is_some());
    }

    let store = ArtifactStore::new(dir.path());
    let document = store
        .load_stage::<TranscriptDocument>(run_id, StageName::Ingest)
        .await?
        .unwrap()
        .payload;
    assert!(document.word_count > 0);
    assert!(document.source_duration > 0.0);

    let rewrite = store
        .load_stage::<RewriteResult>(run_id, StageName::Rewrite)
        .await?
        .unwrap()
        .payload;
    assert_ne!(rewrite.rewritten.text, document.full_text);
    info!("Rewritten narration: {}", rewrite.rewritten.text);

    let report = store
        .load_stage::<SimilarityReport>(run_id, StageName::Score)
        .await?
        .unwrap()
        .payload;
    assert!((0.0..=100.0).contains(&report.similarity_score));
    assert!(report.similarity_score < 100.0);
    Ok(())
}

#[tokio::test]
async fn score_bands_match_the_reported_level() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let orchestrator = orchestrator_with(&mocks, dir.path());

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;
    assert!(run.all_succeeded());

    let report = ArtifactStore::new(dir.path())
        .load_stage::<SimilarityReport>(run_id, StageName::Score)
        .await?
        .unwrap()
        .payload;

    let expected_level = match report.similarity_score {
        s if s < 30.0 => SimilarityLevel::Low,
        s if s <= 50.0 => SimilarityLevel::Moderate,
        s if s <= 70.0 => SimilarityLevel::High,
        _ => SimilarityLevel::VeryHigh,
    };
    assert_eq!(report.similarity_level, expected_level);
    if report.similarity_score > 50.0 {
        assert_eq!(report.risk_assessment, RiskAssessment::HighRisk);
    }
    Ok(())
}

#[tokio::test]
async fn resume_of_a_finished_run_does_no_external_work() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let orchestrator = orchestrator_with(&mocks, dir.path());

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;
    assert!(run.all_succeeded());

    let calls_after_first = mocks.total_calls();
    let resumed = orchestrator.resume(run_id).await?;
    assert!(resumed.all_succeeded());
    assert_eq!(
        mocks.total_calls(),
        calls_after_first,
        "resume of a finished run must not touch any collaborator"
    );
    Ok(())
}

/// Fails a fixed number of times before succeeding, to force a stage failure
/// that outlasts the retry budget.
struct FlakySynthesizer {
    inner: MockSpeechSynthesizer,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakySynthesizer {
    fn new(failures: usize) -> Self {
        Self {
            inner: MockSpeechSynthesizer::new(),
            failures_remaining: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FlakySynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::CollaboratorUnavailable {
                operation: "synthesize".to_string(),
                reason: "voice backend offline".to_string(),
            });
        }
        self.inner.synthesize(text, voice).await
    }
}

#[tokio::test]
async fn failed_run_resumes_at_the_first_non_succeeded_stage() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    // Three failures exhausts the default retry budget exactly once.
    let synthesizer = Arc::new(FlakySynthesizer::new(3));
    let collaborators = Collaborators {
        resolver: mocks.resolver.clone(),
        extractor: mocks.extractor.clone(),
        synthesizer: synthesizer.clone(),
        visuals: mocks.visuals.clone(),
        composer: mocks.composer.clone(),
    };
    let orchestrator = Orchestrator::new(
        test_config(dir.path()),
        collaborators,
        Arc::new(RuleBasedGenerator),
    );

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;

    assert_eq!(
        run.stage(StageName::SynthesizeSpeech).state,
        StageState::Failed
    );
    let (failed_stage, error) = run.latest_failure().unwrap();
    assert_eq!(failed_stage, StageName::SynthesizeSpeech);
    assert_eq!(error.kind, "collaborator_unavailable");
    assert_eq!(run.stage(StageName::GenerateVisuals).state, StageState::Pending);
    for stage in [
        StageName::Ingest,
        StageName::Analyze,
        StageName::Rewrite,
        StageName::Score,
    ] {
        assert_eq!(run.stage(stage).state, StageState::Succeeded);
    }

    let resolver_calls = mocks.resolver.call_count();
    let resumed = orchestrator.resume(run_id).await?;
    assert!(resumed.all_succeeded(), "resume halted: {:?}", resumed.latest_failure());
    assert_eq!(
        mocks.resolver.call_count(),
        resolver_calls,
        "succeeded stages must not re-run their collaborators"
    );
    assert_eq!(synthesizer.call_count(), 4);
    Ok(())
}

/// Fails a fixed number of times before delegating to the rule-based
/// generator, to prove the rewrite stage retries transient outages.
struct FlakyGenerator {
    inner: RuleBasedGenerator,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyGenerator {
    fn new(failures: usize) -> Self {
        Self {
            inner: RuleBasedGenerator,
            failures_remaining: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FlakyGenerator {
    fn generator_name(&self) -> String {
        "flaky".to_string()
    }

    async fn generate(
        &self,
        instruction: &str,
        policy: &RewritePolicy,
        text: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::CollaboratorUnavailable {
                operation: "generate_text".to_string(),
                reason: "model cold start".to_string(),
            });
        }
        self.inner.generate(instruction, policy, text).await
    }
}

#[tokio::test]
async fn transient_generator_outage_is_retried() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let generator = Arc::new(FlakyGenerator::new(1));
    let collaborators = Collaborators {
        resolver: mocks.resolver.clone(),
        extractor: mocks.extractor.clone(),
        synthesizer: mocks.synthesizer.clone(),
        visuals: mocks.visuals.clone(),
        composer: mocks.composer.clone(),
    };
    let orchestrator = Orchestrator::new(
        test_config(dir.path()),
        collaborators,
        generator.clone(),
    );

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;

    assert!(run.all_succeeded(), "run halted: {:?}", run.latest_failure());
    assert_eq!(run.stage(StageName::Rewrite).state, StageState::Succeeded);
    // One failed call, then the retried call succeeds.
    assert_eq!(generator.call_count(), 2);
    Ok(())
}

/// Never completes within a test's lifetime, so cancellation is the only
/// way out of the call.
struct StalledSynthesizer {
    inner: MockSpeechSynthesizer,
}

#[async_trait]
impl SpeechSynthesizer for StalledSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechOutput> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        self.inner.synthesize(text, voice).await
    }
}

#[tokio::test]
async fn cancelling_mid_call_fails_the_in_flight_stage() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let collaborators = Collaborators {
        resolver: mocks.resolver.clone(),
        extractor: mocks.extractor.clone(),
        synthesizer: Arc::new(StalledSynthesizer {
            inner: MockSpeechSynthesizer::new(),
        }),
        visuals: mocks.visuals.clone(),
        composer: mocks.composer.clone(),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        test_config(dir.path()),
        collaborators,
        Arc::new(RuleBasedGenerator),
    ));

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let executor = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.execute(run_id).await })
    };

    // Let the walk reach the stalled synthesizer call before cancelling.
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.cancel(run_id).await?;
    let run = executor.await.unwrap()?;

    assert_eq!(
        run.stage(StageName::SynthesizeSpeech).state,
        StageState::Failed
    );
    let (stage, error) = run.latest_failure().unwrap();
    assert_eq!(stage, StageName::SynthesizeSpeech);
    assert_eq!(error.kind, "cancelled");
    assert_eq!(run.stage(StageName::GenerateVisuals).state, StageState::Pending);
    Ok(())
}

#[tokio::test]
async fn cancelled_run_records_a_cancelled_stage() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let orchestrator = orchestrator_with(&mocks, dir.path());

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    orchestrator.cancel(run_id).await?;
    let run = orchestrator.execute(run_id).await?;

    assert_eq!(run.stage(StageName::Ingest).state, StageState::Failed);
    let (stage, error) = run.latest_failure().unwrap();
    assert_eq!(stage, StageName::Ingest);
    assert_eq!(error.kind, "cancelled");
    assert_eq!(mocks.total_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn restricted_sources_halt_the_run_at_ingest() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let resolver = Arc::new(MockSourceResolver::with_denied(vec![
        "sorting-intro".to_string(),
    ]));
    let collaborators = Collaborators {
        resolver: resolver.clone(),
        extractor: mocks.extractor.clone(),
        synthesizer: mocks.synthesizer.clone(),
        visuals: mocks.visuals.clone(),
        composer: mocks.composer.clone(),
    };
    let orchestrator = Orchestrator::new(
        test_config(dir.path()),
        collaborators,
        Arc::new(RuleBasedGenerator),
    );

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    let run = orchestrator.execute(run_id).await?;

    let (stage, error) = run.latest_failure().unwrap();
    assert_eq!(stage, StageName::Ingest);
    assert_eq!(error.kind, "restricted_content");
    assert_eq!(mocks.extractor.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn run_status_survives_a_restart() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mocks = Mocks::new();
    let orchestrator = orchestrator_with(&mocks, dir.path());

    let run_id = orchestrator
        .start_run(SOURCE_URL, RewritePolicy::default())
        .await?;
    orchestrator.execute(run_id).await?;

    // A fresh orchestrator over the same artifact root finds the run on disk.
    let restarted = orchestrator_with(&Mocks::new(), dir.path());
    let status = restarted.run_status(run_id).await?;
    assert!(status.all_succeeded());

    let resumed = restarted.resume(run_id).await?;
    assert!(resumed.all_succeeded());
    Ok(())
}
