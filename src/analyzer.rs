use crate::types::{
    AnalyzerConfig, ComplexityLevel, ContentInsights, ContentStructure, ContentType,
    DifficultyDistribution, KeyPoint, KeyPointType, PipelineError, Result, Topic,
    TranscriptDocument,
};
use crate::utils::{is_stop_word, split_sentences, tokenize, round2};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Derives structure from a canonical transcript. Pure and deterministic:
/// identical documents always produce identical output.
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, doc: &TranscriptDocument) -> Result<ContentStructure> {
        let text = doc.full_text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyContent);
        }

        let sentences = split_sentences(text);
        let words: Vec<&str> = text.split_whitespace().collect();
        let total_words = words.len();
        let total_sentences = sentences.len();

        let avg_sentence_len = total_words as f64 / total_sentences.max(1) as f64;
        let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg_word_len = total_chars as f64 / total_words.max(1) as f64;

        let topics = self.extract_topics(text);
        let key_points = self.extract_key_points(&sentences, &topics);

        Ok(ContentStructure {
            total_words,
            total_sentences,
            estimated_duration_minutes: round2(total_words as f64 / self.config.words_per_minute),
            content_type: classify_content_type(text),
            complexity_level: self.complexity_level(avg_sentence_len, avg_word_len),
            topics,
            key_points,
            insights: self.derive_insights(text, &sentences),
        })
    }

    fn complexity_level(&self, avg_sentence_len: f64, avg_word_len: f64) -> ComplexityLevel {
        let base = if avg_sentence_len < self.config.low_complexity_max_words {
            ComplexityLevel::Low
        } else if avg_sentence_len <= self.config.high_complexity_min_words {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::High
        };

        if avg_word_len > self.config.long_word_threshold {
            match base {
                ComplexityLevel::Low => ComplexityLevel::Medium,
                _ => ComplexityLevel::High,
            }
        } else {
            base
        }
    }

    /// Frequency-weighted topic tokens, scored relative to the most frequent
    /// one. Ties broken by first occurrence.
    fn extract_topics(&self, text: &str) -> Vec<Topic> {
        let tokens = tokenize(text);
        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (index, token) in tokens.iter().enumerate() {
            if token.chars().count() < self.config.min_topic_word_len || is_stop_word(token) {
                continue;
            }
            *frequencies.entry(token).or_insert(0) += 1;
            first_seen.entry(token).or_insert(index);
        }

        let mut ranked: Vec<(&str, usize, usize)> = frequencies
            .iter()
            .map(|(&token, &count)| (token, count, first_seen[token]))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(self.config.max_topics);

        let max_count = ranked.first().map(|(_, count, _)| *count).unwrap_or(1) as f64;
        ranked
            .into_iter()
            .map(|(token, count, _)| Topic {
                topic: token.to_string(),
                relevance_score: round2(count as f64 / max_count),
            })
            .collect()
    }

    /// Sentence-level key points scored by position, keyword density and
    /// length-normalized informativeness.
    fn extract_key_points(&self, sentences: &[String], topics: &[Topic]) -> Vec<KeyPoint> {
        let topic_set: HashSet<&str> = topics.iter().map(|t| t.topic.as_str()).collect();
        let last_index = sentences.len().saturating_sub(1);

        let mut points: Vec<KeyPoint> = Vec::new();
        for (index, sentence) in sentences.iter().enumerate() {
            let tokens = tokenize(sentence);
            if tokens.len() < 3 {
                continue;
            }

            let relative = if last_index == 0 {
                0.0
            } else {
                index as f64 / last_index as f64
            };
            // Openings and closings carry facts and conclusions.
            let position_weight = if relative <= 0.2 || relative >= 0.8 { 1.0 } else { 0.5 };

            let topic_hits = tokens.iter().filter(|t| topic_set.contains(t.as_str())).count();
            let keyword_density = topic_hits as f64 / tokens.len() as f64;

            let informative: HashSet<&str> = tokens
                .iter()
                .filter(|t| !is_stop_word(t))
                .map(|t| t.as_str())
                .collect();
            let informativeness = informative.len() as f64 / tokens.len() as f64;

            let raw = position_weight * 0.3 + keyword_density * 0.4 + informativeness * 0.3;
            let importance_score = ((raw * 9.0).round() as u8 + 1).clamp(1, 10);

            let category = tokens
                .iter()
                .find(|t| topic_set.contains(t.as_str()))
                .cloned()
                .unwrap_or_else(|| "general".to_string());

            points.push(KeyPoint {
                point: sentence.clone(),
                point_type: classify_key_point(sentence),
                importance_score,
                category,
            });
        }

        // Stable sort keeps original order among equal scores.
        points.sort_by(|a, b| b.importance_score.cmp(&a.importance_score));
        points.truncate(self.config.max_key_points);
        points
    }

    fn derive_insights(&self, text: &str, sentences: &[String]) -> ContentInsights {
        let lower = text.to_lowercase();

        let head: String = sentences.iter().take(3).cloned().collect::<Vec<_>>().join(" ").to_lowercase();
        let tail: String = sentences
            .iter()
            .rev()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let has_intro = ["welcome", "introduction", "overview", "today", "tutorial", "guide"]
            .iter()
            .any(|marker| head.contains(marker));
        let has_conclusion = ["conclusion", "summary", "finally", "wrap", "recap", "in the end"]
            .iter()
            .any(|marker| tail.contains(marker));
        let content_flow = match (has_intro, has_conclusion) {
            (true, true) => "introduction-body-conclusion",
            (true, false) => "introduction-body",
            (false, true) => "body-conclusion",
            (false, false) => "continuous",
        }
        .to_string();

        let mut engagement_factors = BTreeSet::new();
        if text.contains('?') {
            engagement_factors.insert("questions".to_string());
        }
        if ["for example", "such as", "for instance"].iter().any(|m| lower.contains(m)) {
            engagement_factors.insert("examples".to_string());
        }
        if lower.starts_with("you ") || lower.contains(" you ") || lower.contains(" your ") {
            engagement_factors.insert("direct_address".to_string());
        }
        if lower.contains("first") && (lower.contains("then") || lower.contains("next") || lower.contains("second")) {
            engagement_factors.insert("enumeration".to_string());
        }

        ContentInsights {
            content_flow,
            engagement_factors,
            difficulty_distribution: self.difficulty_distribution(sentences),
        }
    }

    /// Sentence-length buckets as percentages that always sum to exactly 100;
    /// rounding error is absorbed by the largest bucket.
    fn difficulty_distribution(&self, sentences: &[String]) -> DifficultyDistribution {
        let mut counts = [0usize; 3];
        for sentence in sentences {
            let len = sentence.split_whitespace().count() as f64;
            if len < self.config.low_complexity_max_words {
                counts[0] += 1;
            } else if len <= self.config.high_complexity_min_words {
                counts[1] += 1;
            } else {
                counts[2] += 1;
            }
        }

        let total = sentences.len().max(1) as f64;
        let mut percentages: [i32; 3] =
            [0, 1, 2].map(|i| ((counts[i] as f64 / total) * 100.0).round() as i32);

        let drift = 100 - percentages.iter().sum::<i32>();
        let largest = (0..3).max_by_key(|&i| (counts[i], std::cmp::Reverse(i))).unwrap_or(0);
        percentages[largest] += drift;

        DifficultyDistribution {
            easy_percentage: percentages[0].clamp(0, 100) as u8,
            medium_percentage: percentages[1].clamp(0, 100) as u8,
            hard_percentage: percentages[2].clamp(0, 100) as u8,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn classify_content_type(text: &str) -> ContentType {
    let lower = text.to_lowercase();
    let count_markers = |markers: &[&str]| -> usize {
        markers.iter().map(|m| lower.matches(m).count()).sum()
    };

    let instructional = count_markers(&[
        "step", "how to", "first,", "next,", "then", "make sure", "tutorial", "you should",
        "you need",
    ]);
    let conversational = count_markers(&["you know", "let's", "i mean", "hey", "thanks", "welcome"])
        + text.matches('?').count();
    let narrative = count_markers(&["story", "once", "one day", "happened", "remember when", "told me"]);

    // Fixed priority breaks ties deterministically.
    let scored = [
        (instructional, ContentType::Instructional),
        (conversational, ContentType::Conversational),
        (narrative, ContentType::Narrative),
    ];
    let best = scored
        .iter()
        .max_by_key(|(score, _)| *score)
        .filter(|(score, _)| *score >= 2);
    match best {
        Some((_, content_type)) => *content_type,
        None => ContentType::Informational,
    }
}

fn classify_key_point(sentence: &str) -> KeyPointType {
    let lower = sentence.to_lowercase();
    if ["for example", "such as", "for instance"].iter().any(|m| lower.contains(m)) {
        KeyPointType::Example
    } else if ["should", "must", "need to", "make sure", "step", "remember to"]
        .iter()
        .any(|m| lower.contains(m))
    {
        KeyPointType::Instruction
    } else if ["i think", "i believe", "in my opinion", "best", "worst", "amazing", "great"]
        .iter()
        .any(|m| lower.contains(m))
    {
        KeyPointType::Opinion
    } else {
        KeyPointType::Fact
    }
}
