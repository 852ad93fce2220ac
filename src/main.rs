use clap::Parser;
use recast::collaborators::{
    MockSourceResolver, MockSpeechSynthesizer, MockTranscriptExtractor, MockVideoComposer,
    MockVisualGenerator,
};
use recast::{
    ArtifactStore, Collaborators, Orchestrator, PipelineConfig, RewritePolicy, RuleBasedGenerator,
    SimilarityReport, StageName, StageState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "recast",
    about = "Rewrite a video transcript under a style policy and assemble a narrated video"
)]
struct Args {
    /// Source video URL (required unless --resume is given)
    url: Option<String>,

    /// How to transform the text: enhance, simplify, formalize or casual
    #[arg(long, default_value = "enhance")]
    modification_type: String,

    /// Audience to write for: general, technical, academic or casual
    #[arg(long, default_value = "general")]
    target_audience: String,

    /// Style to aim for: professional, conversational or academic
    #[arg(long, default_value = "professional")]
    style: String,

    /// Directory for per-run artifacts
    #[arg(long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Resume a previous run instead of starting a new one
    #[arg(long)]
    resume: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let policy = RewritePolicy::parse(&args.modification_type, &args.target_audience, &args.style)?;
    let config = PipelineConfig {
        artifact_root: args.artifact_dir.clone(),
        ..PipelineConfig::default()
    };

    let collaborators = Collaborators {
        resolver: Arc::new(MockSourceResolver::new()),
        extractor: Arc::new(MockTranscriptExtractor::new()),
        synthesizer: Arc::new(MockSpeechSynthesizer::new()),
        visuals: Arc::new(MockVisualGenerator::new()),
        composer: Arc::new(MockVideoComposer::new()),
    };
    let orchestrator = Orchestrator::new(config, collaborators, Arc::new(RuleBasedGenerator));

    let run = match args.resume {
        Some(run_id) => orchestrator.resume(run_id).await?,
        None => {
            let url = args
                .url
                .ok_or_else(|| anyhow::anyhow!("a source url is required unless --resume is given"))?;
            let run_id = orchestrator.start_run(&url, policy).await?;
            info!("Run {} started", run_id);
            orchestrator.execute(run_id).await?
        }
    };

    println!("Run {} ({})", run.id, run.source_ref);
    for stage in StageName::ORDER {
        let status = run.stage(stage);
        match (status.state, &status.error) {
            (StageState::Failed, Some(error)) => {
                println!("  {:<17} failed [{}] {}", stage.as_str(), error.kind, error.message);
            }
            (state, _) => {
                println!("  {:<17} {:?}", stage.as_str(), state);
            }
        }
    }

    if run.stage(StageName::Score).state == StageState::Succeeded {
        let store = ArtifactStore::new(args.artifact_dir);
        if let Some(report) = store
            .load_stage::<SimilarityReport>(run.id, StageName::Score)
            .await?
        {
            let report = report.payload;
            println!(
                "Similarity: {:.1} ({:?}, risk {:?})",
                report.similarity_score, report.similarity_level, report.risk_assessment
            );
            for recommendation in &report.recommendations {
                println!("  - {recommendation}");
            }
        }
    }

    if let Some((stage, error)) = run.latest_failure() {
        anyhow::bail!("run halted at {}: {}", stage, error.message);
    }
    Ok(())
}
