use crate::types::{
    ImprovementMetrics, ModificationType, PipelineError, ReadabilityChange, Result,
    RewriteConfig, RewritePolicy, RewriteResult, RewrittenText, StylePreference, TargetAudience,
    TextStats,
};
use crate::utils::{complexity_score, round2, split_sentences, word_edit_distance};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External language-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn generator_name(&self) -> String;

    /// Produce a rewritten version of `text` following `instruction`.
    async fn generate(&self, instruction: &str, policy: &RewritePolicy, text: &str) -> Result<String>;
}

/// Deterministic offline generator built from fixed transformation rules.
/// Default generator and test double in one.
pub struct RuleBasedGenerator;

const FORMAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("okay", "alright"),
    ("ok", "alright"),
    ("yeah", "yes"),
    ("yep", "yes"),
    ("nope", "no"),
    ("hey", "hello"),
    ("awesome", "excellent"),
    ("cool", "excellent"),
    ("good", "excellent"),
    ("great", "excellent"),
    ("bad", "unfavorable"),
    ("thing", "element"),
    ("stuff", "material"),
    ("big", "significant"),
    ("huge", "significant"),
    ("small", "minimal"),
    ("use", "utilize"),
    ("get", "obtain"),
    ("show", "demonstrate"),
];

const CASUAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("nevertheless", "still"),
    ("however", "but"),
    ("furthermore", "also"),
    ("additionally", "also"),
    ("therefore", "so"),
    ("thus", "so"),
    ("consequently", "so"),
    ("utilize", "use"),
    ("implement", "use"),
    ("approximately", "about"),
    ("subsequently", "then"),
    ("demonstrate", "show"),
    ("obtain", "get"),
];

const SIMPLE_REPLACEMENTS: &[(&str, &str)] = &[
    ("utilize", "use"),
    ("implement", "use"),
    ("facilitate", "help"),
    ("subsequently", "then"),
    ("consequently", "so"),
    ("nevertheless", "still"),
    ("approximately", "about"),
    ("demonstrate", "show"),
    ("indicate", "show"),
    ("establish", "set up"),
];

const CASUAL_CONNECTORS: &[&str] = &["You see,", "Well,", "So,", "Now,"];

#[async_trait]
impl TextGenerator for RuleBasedGenerator {
    fn generator_name(&self) -> String {
        "rule-based".to_string()
    }

    async fn generate(&self, _instruction: &str, policy: &RewritePolicy, text: &str) -> Result<String> {
        let transformed = match policy.modification_type {
            ModificationType::Enhance => enhance(text, policy),
            ModificationType::Simplify => simplify(text),
            ModificationType::Formalize => formalize(text),
            ModificationType::Casual => casualize(text),
        };
        Ok(transformed)
    }
}

fn enhance(text: &str, policy: &RewritePolicy) -> String {
    let base = formalize(text);
    match policy.target_audience {
        TargetAudience::Technical => replace_words(
            &base,
            &[
                ("algorithm", "algorithm (step-by-step procedure)"),
                ("complexity", "complexity (efficiency measure)"),
            ],
        ),
        TargetAudience::Casual => insert_connectors(&base, 3),
        _ => base,
    }
}

fn simplify(text: &str) -> String {
    let sentences = split_sentences(text);
    let mut parts = Vec::new();
    for sentence in sentences {
        if sentence.split_whitespace().count() > 20 {
            parts.extend(break_long_sentence(&sentence));
        } else {
            parts.push(sentence);
        }
    }
    let joined = join_sentences(&parts);
    replace_words(&joined, SIMPLE_REPLACEMENTS)
}

fn formalize(text: &str) -> String {
    let replaced = replace_words(text, FORMAL_REPLACEMENTS);
    let sentences: Vec<String> = split_sentences(&replaced)
        .into_iter()
        .map(|s| capitalize(&s))
        .collect();
    join_sentences(&sentences)
}

fn casualize(text: &str) -> String {
    let replaced = replace_words(text, CASUAL_REPLACEMENTS);
    insert_connectors(&replaced, 4)
}

/// Whole-word, case-insensitive replacement.
fn replace_words(text: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut word = String::new();

    let mut flush = |word: &mut String, result: &mut String| {
        if word.is_empty() {
            return;
        }
        let lower = word.to_lowercase();
        match replacements.iter().find(|(from, _)| *from == lower) {
            Some((_, to)) => result.push_str(to),
            None => result.push_str(word),
        }
        word.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' {
            word.push(c);
        } else {
            flush(&mut word, &mut result);
            result.push(c);
        }
    }
    flush(&mut word, &mut result);
    result
}

fn insert_connectors(text: &str, every: usize) -> String {
    let sentences: Vec<String> = split_sentences(text)
        .into_iter()
        .enumerate()
        .map(|(i, sentence)| {
            if i % every == 0 {
                format!("{} {}", CASUAL_CONNECTORS[i % CASUAL_CONNECTORS.len()], lowercase_first(&sentence))
            } else {
                sentence
            }
        })
        .collect();
    join_sentences(&sentences)
}

fn break_long_sentence(sentence: &str) -> Vec<String> {
    for conjunction in [" and ", " but ", " so ", " because ", " however "] {
        if let Some(idx) = sentence.find(conjunction) {
            let head = sentence[..idx].trim().to_string();
            let tail = capitalize(sentence[idx + conjunction.len()..].trim());
            let mut parts = vec![head];
            parts.extend(break_long_sentence(&tail));
            return parts;
        }
    }
    vec![sentence.to_string()]
}

fn join_sentences(sentences: &[String]) -> String {
    let kept: Vec<&str> = sentences
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if kept.is_empty() {
        String::new()
    } else {
        format!("{}.", kept.join(". "))
    }
}

fn capitalize(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lowercase_first(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
}

/// OpenAI-compatible chat-completion generator.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    config: HttpGeneratorConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpTextGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    fn generator_name(&self) -> String {
        format!("http ({})", self.config.model)
    }

    async fn generate(&self, instruction: &str, _policy: &RewritePolicy, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "messages": [
                    ChatMessage { role: "system", content: instruction },
                    ChatMessage { role: "user", content: text },
                ],
                "temperature": self.config.temperature,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::CollaboratorUnavailable {
                operation: "generate_text".to_string(),
                reason: "response contained no choices".to_string(),
            })
    }
}

/// Drives the generation collaborator under a validated policy, rejecting
/// rewrites that stay too close to the input.
pub struct Rewriter {
    config: RewriteConfig,
    generator: Arc<dyn TextGenerator>,
}

impl Rewriter {
    pub fn new(config: RewriteConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self { config, generator }
    }

    /// Deterministic instruction derived only from the enumerated policy.
    pub fn build_instruction(policy: &RewritePolicy) -> String {
        let modification = match policy.modification_type {
            ModificationType::Enhance => {
                "Rewrite the script to improve clarity and quality while preserving its meaning."
            }
            ModificationType::Simplify => {
                "Rewrite the script in simpler language with shorter sentences."
            }
            ModificationType::Formalize => "Rewrite the script in formal language.",
            ModificationType::Casual => "Rewrite the script in relaxed, casual language.",
        };
        let audience = match policy.target_audience {
            TargetAudience::General => "Write for a general audience.",
            TargetAudience::Technical => "Write for a technical audience; keep terminology precise.",
            TargetAudience::Academic => "Write for an academic audience.",
            TargetAudience::Casual => "Write for a casual audience.",
        };
        let style = match policy.style_preference {
            StylePreference::Professional => "Use a professional tone.",
            StylePreference::Conversational => "Use a conversational tone.",
            StylePreference::Academic => "Use an academic tone.",
        };
        format!(
            "{modification} {audience} {style} Substantially rephrase the wording; \
             do not echo the original sentences."
        )
    }

    /// Generate a rewrite, retrying until the output moves at least
    /// `min_edit_distance` word edits away from the input.
    pub async fn rewrite(&self, text: &str, policy: &RewritePolicy) -> Result<RewriteResult> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyContent);
        }

        let instruction = Self::build_instruction(policy);
        debug!("Rewrite instruction: {}", instruction);

        let mut best: Option<(String, usize)> = None;
        for attempt in 1..=self.config.max_attempts {
            let candidate = self.generator.generate(&instruction, policy, text).await?;
            let candidate = candidate.trim().to_string();
            if candidate.is_empty() {
                warn!("Generator '{}' returned empty output on attempt {}", self.generator.generator_name(), attempt);
                continue;
            }

            let distance = word_edit_distance(text, &candidate);
            if distance >= self.config.min_edit_distance {
                info!(
                    "Rewrite accepted on attempt {} (edit distance {})",
                    attempt, distance
                );
                return Ok(build_result(text, &candidate, policy));
            }

            warn!(
                "Rewrite attempt {} too close to original (edit distance {}, need {})",
                attempt, distance, self.config.min_edit_distance
            );
            if best.as_ref().map(|(_, d)| distance > *d).unwrap_or(true) {
                best = Some((candidate, distance));
            }
        }

        match best {
            Some((candidate, edit_distance)) => Err(PipelineError::InsufficientTransformation {
                edit_distance,
                best_attempt: Box::new(build_result(text, &candidate, policy)),
            }),
            None => Err(PipelineError::CollaboratorUnavailable {
                operation: "generate_text".to_string(),
                reason: "generator produced no usable output".to_string(),
            }),
        }
    }
}

/// Improvement metrics computed purely from input/output statistics.
fn build_result(original: &str, rewritten: &str, policy: &RewritePolicy) -> RewriteResult {
    let original_stats = TextStats::from_text(original);
    let rewritten_words = rewritten.split_whitespace().count();

    let word_count_change = rewritten_words as i64 - original_stats.word_count as i64;
    let word_count_change_percent = if original_stats.word_count > 0 {
        round2(word_count_change as f64 / original_stats.word_count as f64 * 100.0)
    } else {
        0.0
    };

    let complexity_improvement =
        round2(complexity_score(original) - complexity_score(rewritten));
    let readability_improvement = if complexity_improvement > 0.0 {
        ReadabilityChange::Improved
    } else if complexity_improvement == 0.0 {
        ReadabilityChange::Maintained
    } else {
        ReadabilityChange::Adjusted
    };

    RewriteResult {
        rewritten: RewrittenText {
            text: rewritten.to_string(),
            word_count: rewritten_words,
            character_count: rewritten.chars().count(),
            improvement_metrics: ImprovementMetrics {
                word_count_change,
                word_count_change_percent,
                complexity_improvement,
                readability_improvement,
            },
        },
        original: original_stats,
        policy: *policy,
    }
}
