use crate::types::{PipelineError, RawSegment, Result, TranscriptDocument, TranscriptSegment};
use tracing::{debug, warn};

/// Normalizes raw timestamped segments into a canonical transcript document.
pub struct TranscriptStore;

impl TranscriptStore {
    pub fn new() -> Self {
        Self
    }

    /// Validate, sort and de-overlap raw segments, then derive the document.
    ///
    /// Segments are sorted by start time. When a later segment starts before
    /// the previous one ends, its start is clipped to the previous end; if
    /// clipping would invert the segment it is dropped with a warning.
    pub fn ingest(&self, raw_segments: Vec<RawSegment>, language: &str) -> Result<TranscriptDocument> {
        let mut segments = Vec::with_capacity(raw_segments.len());
        for (index, raw) in raw_segments.into_iter().enumerate() {
            segments.push(validate_segment(index, raw)?);
        }

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut accepted: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
        for mut segment in segments {
            if let Some(previous) = accepted.last() {
                if segment.start < previous.end {
                    if previous.end >= segment.end {
                        warn!(
                            "Dropping segment fully covered by previous one: [{:.2}, {:.2}] '{}'",
                            segment.start, segment.end, segment.text
                        );
                        continue;
                    }
                    debug!(
                        "Clipping overlapping segment start {:.2} -> {:.2}",
                        segment.start, previous.end
                    );
                    segment.start = previous.end;
                }
            }
            accepted.push(segment);
        }

        let full_text = accepted
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = full_text.split_whitespace().count();
        let source_duration = accepted.last().map(|segment| segment.end).unwrap_or(0.0);

        Ok(TranscriptDocument {
            segments: accepted,
            full_text,
            language: language.to_string(),
            word_count,
            source_duration,
        })
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_segment(index: usize, raw: RawSegment) -> Result<TranscriptSegment> {
    if !raw.start.is_finite() || !raw.end.is_finite() {
        return Err(PipelineError::MalformedInput(format!(
            "segment {index} has a non-finite timestamp"
        )));
    }
    if raw.start < 0.0 {
        return Err(PipelineError::MalformedInput(format!(
            "segment {index} has a negative start time {}",
            raw.start
        )));
    }
    if raw.start >= raw.end {
        return Err(PipelineError::MalformedInput(format!(
            "segment {index} has start {} >= end {}",
            raw.start, raw.end
        )));
    }
    let text = raw.text.trim().to_string();
    if text.is_empty() {
        return Err(PipelineError::MalformedInput(format!(
            "segment {index} has empty text"
        )));
    }
    Ok(TranscriptSegment {
        start: raw.start,
        end: raw.end,
        text,
        confidence: raw.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: f64, end: f64, text: &str) -> RawSegment {
        RawSegment {
            start,
            end,
            text: text.to_string(),
            confidence: None,
        }
    }

    #[test]
    fn joins_segment_texts_with_single_spaces() {
        let doc = TranscriptStore::new()
            .ingest(vec![raw(0.0, 2.0, "Hello world"), raw(2.0, 4.0, "this is a test")], "en")
            .unwrap();
        assert_eq!(doc.full_text, "Hello world this is a test");
        assert_eq!(doc.word_count, 6);
        assert_eq!(doc.source_duration, 4.0);
    }

    #[test]
    fn sorts_segments_by_start() {
        let doc = TranscriptStore::new()
            .ingest(vec![raw(3.0, 4.0, "second"), raw(0.0, 2.0, "first")], "en")
            .unwrap();
        assert_eq!(doc.full_text, "first second");
        assert!(doc.segments.windows(2).all(|pair| pair[0].start <= pair[1].start));
    }

    #[test]
    fn clips_overlapping_segments() {
        let doc = TranscriptStore::new()
            .ingest(vec![raw(0.0, 5.0, "a"), raw(3.0, 8.0, "b")], "en")
            .unwrap();
        assert_eq!(doc.segments[1].start, 5.0);
        assert_eq!(doc.segments[1].end, 8.0);
    }

    #[test]
    fn drops_segment_inverted_by_clipping() {
        let doc = TranscriptStore::new()
            .ingest(vec![raw(0.0, 5.0, "a"), raw(1.0, 4.0, "b")], "en")
            .unwrap();
        assert_eq!(doc.segments.len(), 1);
        assert_eq!(doc.full_text, "a");
    }

    #[test]
    fn rejects_inverted_timestamps() {
        let result = TranscriptStore::new().ingest(vec![raw(2.0, 1.0, "bad")], "en");
        assert!(matches!(result, Err(PipelineError::MalformedInput(_))));
    }

    #[test]
    fn rejects_negative_timestamps() {
        let result = TranscriptStore::new().ingest(vec![raw(-1.0, 1.0, "bad")], "en");
        assert!(matches!(result, Err(PipelineError::MalformedInput(_))));
    }

    #[test]
    fn rejects_blank_text() {
        let result = TranscriptStore::new().ingest(vec![raw(0.0, 1.0, "   ")], "en");
        assert!(matches!(result, Err(PipelineError::MalformedInput(_))));
    }

    #[test]
    fn segments_are_pairwise_non_overlapping() {
        let doc = TranscriptStore::new()
            .ingest(
                vec![raw(0.0, 3.0, "a"), raw(2.0, 6.0, "b"), raw(5.0, 9.0, "c")],
                "en",
            )
            .unwrap();
        assert!(doc.segments.windows(2).all(|pair| pair[0].end <= pair[1].start));
    }
}
