use crate::analyzer::Analyzer;
use crate::artifacts::{fingerprint, ArtifactStore};
use crate::collaborators::{
    SourceResolver, SpeechSynthesizer, TranscriptExtractor, VideoComposer, VisualGenerator,
};
use crate::retry::{call_with_timeout, RetryPolicy};
use crate::rewriter::{Rewriter, TextGenerator};
use crate::similarity::Scorer;
use crate::transcript::TranscriptStore;
use crate::types::{
    ContentStructure, PipelineConfig, PipelineError, PipelineRun, RestrictionStatus, Result,
    RewritePolicy, RewriteResult, SimilarityReport, SpeechOutput, StageError, StageName,
    StageState, StageStatus, TranscriptDocument, VideoOutput, VisualSegment,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External collaborators wired into the orchestrator.
pub struct Collaborators {
    pub resolver: Arc<dyn SourceResolver>,
    pub extractor: Arc<dyn TranscriptExtractor>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub visuals: Arc<dyn VisualGenerator>,
    pub composer: Arc<dyn VideoComposer>,
}

/// Sequences the content stages, persists every intermediate artifact and
/// keeps runs resumable. One orchestrator serves many concurrent runs;
/// each run's state is isolated.
pub struct Orchestrator {
    config: PipelineConfig,
    store: ArtifactStore,
    retry: RetryPolicy,
    transcripts: TranscriptStore,
    analyzer: Analyzer,
    rewriter: Rewriter,
    scorer: Scorer,
    collaborators: Collaborators,
    runs: Arc<RwLock<HashMap<Uuid, PipelineRun>>>,
    cancel_flags: Arc<RwLock<HashMap<Uuid, Arc<RwLock<bool>>>>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let store = ArtifactStore::new(config.artifact_root.clone());
        let retry = RetryPolicy::new(config.retry.clone());
        let analyzer = Analyzer::new(config.analyzer.clone());
        let rewriter = Rewriter::new(config.rewrite.clone(), generator);
        let scorer = Scorer::new(config.scorer.clone());
        Self {
            config,
            store,
            retry,
            transcripts: TranscriptStore::new(),
            analyzer,
            rewriter,
            scorer,
            collaborators,
            runs: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new run with every stage pending and persists it.
    pub async fn start_run(&self, source_ref: &str, policy: RewritePolicy) -> Result<Uuid> {
        let run = PipelineRun::new(source_ref.to_string(), policy);
        let run_id = run.id;
        self.store.save_run(&run).await?;
        self.runs.write().await.insert(run_id, run);
        self.cancel_flags
            .write()
            .await
            .insert(run_id, Arc::new(RwLock::new(false)));
        info!("Started run {} for {}", run_id, source_ref);
        Ok(run_id)
    }

    /// Walks the stages in order, skipping anything already succeeded.
    /// Stage failures are recorded on the run and halt the walk; they are
    /// never returned as errors from this method.
    pub async fn execute(&self, run_id: Uuid) -> Result<PipelineRun> {
        let mut run = self.load_run_state(run_id).await?;
        let cancel = self.cancel_flag(run_id).await;

        for stage in StageName::ORDER {
            if run.stage(stage).state == StageState::Succeeded {
                debug!("Run {}: stage {} already succeeded, skipping", run_id, stage);
                continue;
            }
            if *cancel.read().await {
                warn!("Run {} cancelled before stage {}", run_id, stage);
                self.record_failure(&mut run, stage, &PipelineError::Cancelled)
                    .await?;
                break;
            }

            self.update_stage(&mut run, stage, |status| {
                status.state = StageState::Running;
                status.error = None;
            })
            .await?;
            info!("Run {}: stage {} started", run_id, stage);

            match self.run_stage(&run, stage, &cancel).await {
                Ok(artifact_ref) => {
                    self.update_stage(&mut run, stage, |status| {
                        status.state = StageState::Succeeded;
                        status.artifact_ref = Some(artifact_ref);
                        status.error = None;
                    })
                    .await?;
                    info!("Run {}: stage {} succeeded", run_id, stage);
                }
                Err(stage_error) => {
                    error!("Run {}: stage {} failed: {}", run_id, stage, stage_error);
                    self.record_failure(&mut run, stage, &stage_error).await?;
                    break;
                }
            }
        }

        Ok(run)
    }

    /// Picks a halted run back up. Succeeded stages are skipped; the first
    /// non-succeeded stage re-enters with its persisted inputs intact.
    pub async fn resume(&self, run_id: Uuid) -> Result<PipelineRun> {
        info!("Resuming run {}", run_id);
        self.execute(run_id).await
    }

    /// Requests cooperative cancellation. The flag is observed at every
    /// stage boundary and while waiting on external calls.
    pub async fn cancel(&self, run_id: Uuid) -> Result<()> {
        self.load_run_state(run_id).await?;
        let flag = self.cancel_flag(run_id).await;
        *flag.write().await = true;
        warn!("Cancellation requested for run {}", run_id);
        Ok(())
    }

    pub async fn run_status(&self, run_id: Uuid) -> Result<PipelineRun> {
        self.load_run_state(run_id).await
    }

    pub async fn latest_failure(&self, run_id: Uuid) -> Result<Option<(StageName, StageError)>> {
        let run = self.load_run_state(run_id).await?;
        Ok(run
            .latest_failure()
            .map(|(stage, error)| (stage, error.clone())))
    }

    async fn run_stage(
        &self,
        run: &PipelineRun,
        stage: StageName,
        cancel: &Arc<RwLock<bool>>,
    ) -> Result<String> {
        match stage {
            StageName::Ingest => self.stage_ingest(run, cancel).await,
            StageName::Analyze => self.stage_analyze(run).await,
            StageName::Rewrite => self.stage_rewrite(run, cancel).await,
            StageName::Score => self.stage_score(run).await,
            StageName::SynthesizeSpeech => self.stage_synthesize_speech(run, cancel).await,
            StageName::GenerateVisuals => self.stage_generate_visuals(run, cancel).await,
            StageName::ComposeVideo => self.stage_compose_video(run, cancel).await,
        }
    }

    async fn stage_ingest(&self, run: &PipelineRun, cancel: &Arc<RwLock<bool>>) -> Result<String> {
        let key = fingerprint(&format!("{}\n{}", run.source_ref, self.config.language));
        if let Some(path) = self
            .memo_hit::<TranscriptDocument>(run.id, StageName::Ingest, &key)
            .await?
        {
            return Ok(path);
        }

        let resolver = Arc::clone(&self.collaborators.resolver);
        let url = run.source_ref.clone();
        let timeout = self.config.call_timeout_seconds;
        let source = self
            .guarded(cancel, async {
                self.retry
                    .run("resolve", || {
                        let resolver = Arc::clone(&resolver);
                        let url = url.clone();
                        async move {
                            call_with_timeout("resolve", timeout, async {
                                resolver.resolve(&url).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;

        if source.restriction_status != RestrictionStatus::Allowed {
            return Err(PipelineError::RestrictedContent {
                reason: format!("source restriction: {:?}", source.restriction_status),
            });
        }

        let extractor = Arc::clone(&self.collaborators.extractor);
        let video_id = source.video_id.clone();
        let language = self.config.language.clone();
        let segments = self
            .guarded(cancel, async {
                self.retry
                    .run("extract", || {
                        let extractor = Arc::clone(&extractor);
                        let video_id = video_id.clone();
                        let language = language.clone();
                        async move {
                            call_with_timeout("extract", timeout, async {
                                extractor.extract(&video_id, &language).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;

        let document = self.transcripts.ingest(segments, &self.config.language)?;
        self.store
            .save_stage(run.id, StageName::Ingest, &key, &document)
            .await
    }

    async fn stage_analyze(&self, run: &PipelineRun) -> Result<String> {
        let document: TranscriptDocument = self.require_artifact(run.id, StageName::Ingest).await?;
        let key = fingerprint(&document.full_text);
        if let Some(path) = self
            .memo_hit::<ContentStructure>(run.id, StageName::Analyze, &key)
            .await?
        {
            return Ok(path);
        }

        let structure = self.analyzer.analyze(&document)?;
        self.store
            .save_stage(run.id, StageName::Analyze, &key, &structure)
            .await
    }

    async fn stage_rewrite(&self, run: &PipelineRun, cancel: &Arc<RwLock<bool>>) -> Result<String> {
        let document: TranscriptDocument = self.require_artifact(run.id, StageName::Ingest).await?;
        let key = fingerprint(&format!(
            "{}\n{}|{}|{}",
            document.full_text,
            run.policy.modification_type.as_str(),
            run.policy.target_audience.as_str(),
            run.policy.style_preference.as_str()
        ));
        if let Some(path) = self
            .memo_hit::<RewriteResult>(run.id, StageName::Rewrite, &key)
            .await?
        {
            return Ok(path);
        }

        let timeout = self.config.call_timeout_seconds;
        let result = self
            .guarded(cancel, async {
                self.retry
                    .run("generate_text", || {
                        let text = document.full_text.clone();
                        async move {
                            call_with_timeout("generate_text", timeout, async {
                                self.rewriter.rewrite(&text, &run.policy).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;
        self.store
            .save_stage(run.id, StageName::Rewrite, &key, &result)
            .await
    }

    async fn stage_score(&self, run: &PipelineRun) -> Result<String> {
        let document: TranscriptDocument = self.require_artifact(run.id, StageName::Ingest).await?;
        let rewrite: RewriteResult = self.require_artifact(run.id, StageName::Rewrite).await?;
        let key = fingerprint(&format!(
            "{}\n{}",
            document.full_text, rewrite.rewritten.text
        ));
        if let Some(path) = self
            .memo_hit::<SimilarityReport>(run.id, StageName::Score, &key)
            .await?
        {
            return Ok(path);
        }

        let report = self
            .scorer
            .score(&document.full_text, &rewrite.rewritten.text);
        self.store
            .save_stage(run.id, StageName::Score, &key, &report)
            .await
    }

    async fn stage_synthesize_speech(
        &self,
        run: &PipelineRun,
        cancel: &Arc<RwLock<bool>>,
    ) -> Result<String> {
        let rewrite: RewriteResult = self.require_artifact(run.id, StageName::Rewrite).await?;
        let voice = &self.config.voice;
        let key = fingerprint(&format!(
            "{}\n{}|{}|{}",
            rewrite.rewritten.text, voice.voice, voice.speed, voice.pitch
        ));
        if let Some(path) = self
            .memo_hit::<SpeechOutput>(run.id, StageName::SynthesizeSpeech, &key)
            .await?
        {
            return Ok(path);
        }

        let synthesizer = Arc::clone(&self.collaborators.synthesizer);
        let text = rewrite.rewritten.text.clone();
        let voice = voice.clone();
        let timeout = self.config.call_timeout_seconds;
        let speech = self
            .guarded(cancel, async {
                self.retry
                    .run("synthesize", || {
                        let synthesizer = Arc::clone(&synthesizer);
                        let text = text.clone();
                        let voice = voice.clone();
                        async move {
                            call_with_timeout("synthesize", timeout, async {
                                synthesizer.synthesize(&text, &voice).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;
        self.store
            .save_stage(run.id, StageName::SynthesizeSpeech, &key, &speech)
            .await
    }

    async fn stage_generate_visuals(
        &self,
        run: &PipelineRun,
        cancel: &Arc<RwLock<bool>>,
    ) -> Result<String> {
        let rewrite: RewriteResult = self.require_artifact(run.id, StageName::Rewrite).await?;
        let style = &self.config.style;
        let key = fingerprint(&format!(
            "{}\n{}|{}|{}",
            rewrite.rewritten.text, style.template, style.color_scheme, style.max_words_per_slide
        ));
        if let Some(path) = self
            .memo_hit::<Vec<VisualSegment>>(run.id, StageName::GenerateVisuals, &key)
            .await?
        {
            return Ok(path);
        }

        let generator = Arc::clone(&self.collaborators.visuals);
        let text = rewrite.rewritten.text.clone();
        let style = style.clone();
        let timeout = self.config.call_timeout_seconds;
        let segments = self
            .guarded(cancel, async {
                self.retry
                    .run("generate_visuals", || {
                        let generator = Arc::clone(&generator);
                        let text = text.clone();
                        let style = style.clone();
                        async move {
                            call_with_timeout("generate_visuals", timeout, async {
                                generator.generate(&text, &style).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;
        self.store
            .save_stage(run.id, StageName::GenerateVisuals, &key, &segments)
            .await
    }

    async fn stage_compose_video(
        &self,
        run: &PipelineRun,
        cancel: &Arc<RwLock<bool>>,
    ) -> Result<String> {
        let speech: SpeechOutput = self
            .require_artifact(run.id, StageName::SynthesizeSpeech)
            .await?;
        let visuals: Vec<VisualSegment> = self
            .require_artifact(run.id, StageName::GenerateVisuals)
            .await?;
        let asset_refs: Vec<&str> = visuals.iter().map(|v| v.asset_ref.as_str()).collect();
        let key = fingerprint(&format!(
            "{}\n{}",
            speech.audio_file_ref,
            asset_refs.join(",")
        ));
        if let Some(path) = self
            .memo_hit::<VideoOutput>(run.id, StageName::ComposeVideo, &key)
            .await?
        {
            return Ok(path);
        }

        let composer = Arc::clone(&self.collaborators.composer);
        let audio_ref = speech.audio_file_ref.clone();
        let output = self.config.output.clone();
        let timeout = self.config.call_timeout_seconds;
        let visuals = Arc::new(visuals);
        let video = self
            .guarded(cancel, async {
                self.retry
                    .run("compose", || {
                        let composer = Arc::clone(&composer);
                        let visuals = Arc::clone(&visuals);
                        let audio_ref = audio_ref.clone();
                        let output = output.clone();
                        async move {
                            call_with_timeout("compose", timeout, async {
                                composer.compose(&visuals, &audio_ref, &output).await
                            })
                            .await
                        }
                    })
                    .await
            })
            .await?;
        self.store
            .save_stage(run.id, StageName::ComposeVideo, &key, &video)
            .await
    }

    /// Returns the existing artifact path when the stored fingerprint matches
    /// the current inputs. This is what makes stage re-execution a no-op.
    async fn memo_hit<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        stage: StageName,
        key: &str,
    ) -> Result<Option<String>> {
        match self.store.load_if_current::<T>(run_id, stage, key).await? {
            Some(_) => {
                info!("Run {}: reusing {} artifact, inputs unchanged", run_id, stage);
                Ok(Some(
                    self.store
                        .stage_path(run_id, stage)
                        .to_string_lossy()
                        .into_owned(),
                ))
            }
            None => Ok(None),
        }
    }

    async fn require_artifact<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        stage: StageName,
    ) -> Result<T> {
        self.store
            .load_stage::<T>(run_id, stage)
            .await?
            .map(|artifact| artifact.payload)
            .ok_or_else(|| {
                PipelineError::General(format!("run {run_id} is missing its {stage} artifact"))
            })
    }

    /// Races a stage's work against the run's cancellation flag.
    async fn guarded<T, Fut>(&self, cancel: &Arc<RwLock<bool>>, work: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let watcher = async {
            loop {
                if *cancel.read().await {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        };
        tokio::select! {
            result = work => result,
            _ = watcher => Err(PipelineError::Cancelled),
        }
    }

    async fn record_failure(
        &self,
        run: &mut PipelineRun,
        stage: StageName,
        error: &PipelineError,
    ) -> Result<()> {
        let stage_error = StageError {
            kind: error.kind().to_string(),
            message: error.to_string(),
        };
        self.update_stage(run, stage, |status| {
            status.state = StageState::Failed;
            status.error = Some(stage_error);
        })
        .await
    }

    /// Applies a stage mutation, then persists the run in memory and on disk.
    /// No lock is held across the disk write.
    async fn update_stage(
        &self,
        run: &mut PipelineRun,
        stage: StageName,
        apply: impl FnOnce(&mut StageStatus),
    ) -> Result<()> {
        if let Some(status) = run.stage_statuses.get_mut(&stage) {
            apply(status);
        }
        run.updated_at = Utc::now();
        {
            let mut runs = self.runs.write().await;
            runs.insert(run.id, run.clone());
        }
        self.store.save_run(run).await
    }

    /// In-memory state first, falling back to the persisted run record so
    /// runs survive process restarts.
    async fn load_run_state(&self, run_id: Uuid) -> Result<PipelineRun> {
        if let Some(run) = self.runs.read().await.get(&run_id) {
            return Ok(run.clone());
        }
        let run = self.store.load_run(run_id).await?;
        self.runs.write().await.insert(run_id, run.clone());
        Ok(run)
    }

    async fn cancel_flag(&self, run_id: Uuid) -> Arc<RwLock<bool>> {
        let mut flags = self.cancel_flags.write().await;
        Arc::clone(
            flags
                .entry(run_id)
                .or_insert_with(|| Arc::new(RwLock::new(false))),
        )
    }
}
