use crate::artifacts::fingerprint;
use crate::types::{
    OutputConfig, PipelineError, RawSegment, RestrictionStatus, Result, SourceInfo, SpeechOutput,
    StyleConfig, TransitionType, VideoOutput, VisualContentType, VisualSegment, VoiceConfig,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Words spoken per minute, used to estimate narration duration.
const SPEAKING_RATE_WPM: f64 = 150.0;

/// Resolves a video URL to source metadata and checks platform restrictions.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<SourceInfo>;
}

/// Produces the raw time-stamped transcript for a resolved video.
#[async_trait]
pub trait TranscriptExtractor: Send + Sync {
    async fn extract(&self, video_id: &str, language: &str) -> Result<Vec<RawSegment>>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechOutput>;
}

#[async_trait]
pub trait VisualGenerator: Send + Sync {
    async fn generate(&self, text: &str, style: &StyleConfig) -> Result<Vec<VisualSegment>>;
}

#[async_trait]
pub trait VideoComposer: Send + Sync {
    async fn compose(
        &self,
        visuals: &[VisualSegment],
        audio_ref: &str,
        output: &OutputConfig,
    ) -> Result<VideoOutput>;
}

/// Offline resolver that validates the URL shape and enforces a deny-list.
#[derive(Debug, Default)]
pub struct MockSourceResolver {
    denied: Vec<String>,
    calls: AtomicUsize,
}

impl MockSourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_denied(denied: Vec<String>) -> Self {
        Self {
            denied,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceResolver for MockSourceResolver {
    async fn resolve(&self, url: &str) -> Result<SourceInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let parsed = Url::parse(url)
            .map_err(|e| PipelineError::MalformedInput(format!("invalid source url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::MalformedInput(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }
        if let Some(pattern) = self.denied.iter().find(|p| url.contains(p.as_str())) {
            return Err(PipelineError::RestrictedContent {
                reason: format!("source matches deny-list entry '{pattern}'"),
            });
        }

        let video_id = parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .or_else(|| {
                parsed
                    .path_segments()
                    .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fingerprint(url));

        Ok(SourceInfo {
            video_id,
            title: "Sorting Algorithms Explained".to_string(),
            duration_seconds: 27.5,
            restriction_status: RestrictionStatus::Allowed,
            uploader: "mock-channel".to_string(),
            view_count: 1_204,
            description: "An introduction to sorting.".to_string(),
        })
    }
}

/// Offline extractor returning a fixed lecture-style transcript.
#[derive(Debug, Default)]
pub struct MockTranscriptExtractor {
    calls: AtomicUsize,
}

impl MockTranscriptExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptExtractor for MockTranscriptExtractor {
    async fn extract(&self, _video_id: &str, _language: &str) -> Result<Vec<RawSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            RawSegment {
                start: 0.0,
                end: 6.5,
                text: "Okay so today we show a good way to sort big lists of numbers.".to_string(),
                confidence: Some(0.95),
            },
            RawSegment {
                start: 6.5,
                end: 13.0,
                text: "First you get the data and use a pivot to split the stuff into two parts."
                    .to_string(),
                confidence: Some(0.9),
            },
            RawSegment {
                start: 13.0,
                end: 20.0,
                text: "Yeah this thing works great on huge inputs and it is cool to watch."
                    .to_string(),
                confidence: None,
            },
            RawSegment {
                start: 20.0,
                end: 27.5,
                text: "Finally we show the results and even the small cases look awesome."
                    .to_string(),
                confidence: Some(0.88),
            },
        ])
    }
}

/// Offline synthesizer estimating duration from a fixed speaking rate.
#[derive(Debug, Default)]
pub struct MockSpeechSynthesizer {
    calls: AtomicUsize,
}

impl MockSpeechSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyContent);
        }
        let words = text.split_whitespace().count() as f64;
        let duration_seconds = words / SPEAKING_RATE_WPM * 60.0 / voice.speed.max(0.1);
        Ok(SpeechOutput {
            audio_file_ref: format!("audio/{}.wav", fingerprint(text)),
            duration_seconds,
        })
    }
}

/// Offline generator that slices narration text into slide segments.
#[derive(Debug, Default)]
pub struct MockVisualGenerator {
    calls: AtomicUsize,
}

impl MockVisualGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisualGenerator for MockVisualGenerator {
    async fn generate(&self, text: &str, style: &StyleConfig) -> Result<Vec<VisualSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(PipelineError::EmptyContent);
        }

        let per_slide = style.max_words_per_slide.max(1);
        let segments = words
            .chunks(per_slide)
            .enumerate()
            .map(|(index, chunk)| VisualSegment {
                content_type: VisualContentType::Slide,
                duration_seconds: chunk.len() as f64 / SPEAKING_RATE_WPM * 60.0,
                asset_ref: format!("slides/{}-{}.png", fingerprint(text), index),
                transition_type: if index % 2 == 0 {
                    TransitionType::Fade
                } else {
                    TransitionType::Cut
                },
            })
            .collect();
        Ok(segments)
    }
}

/// Offline composer describing the muxed output without encoding anything.
#[derive(Debug, Default)]
pub struct MockVideoComposer {
    calls: AtomicUsize,
}

impl MockVideoComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoComposer for MockVideoComposer {
    async fn compose(
        &self,
        visuals: &[VisualSegment],
        audio_ref: &str,
        output: &OutputConfig,
    ) -> Result<VideoOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if visuals.is_empty() {
            return Err(PipelineError::MalformedInput(
                "cannot compose an empty visual sequence".to_string(),
            ));
        }
        let total_duration = visuals.iter().map(|v| v.duration_seconds).sum();
        Ok(VideoOutput {
            video_file_ref: format!(
                "video/{}.{}",
                fingerprint(&format!("{audio_ref}:{}", visuals.len())),
                output.format
            ),
            total_duration,
            segment_count: visuals.len(),
        })
    }
}
