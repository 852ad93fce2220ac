use crate::types::{RiskAssessment, ScorerConfig, SimilarityLevel, SimilarityReport};
use crate::utils::{round1, tokenize};
use std::collections::HashSet;

/// Compares original and rewritten text, producing a divergence score and a
/// risk classification. Pure function of its inputs; no external calls.
pub struct Scorer {
    config: ScorerConfig,
}

impl Scorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Weighted combination of word-set overlap and word n-gram similarity,
    /// both on a 0-100 scale. Empty input on either side scores 0.
    pub fn score(&self, original: &str, rewritten: &str) -> SimilarityReport {
        let original_tokens = tokenize(original);
        let rewritten_tokens = tokenize(rewritten);

        if original_tokens.is_empty() || rewritten_tokens.is_empty() {
            return SimilarityReport {
                similarity_score: 0.0,
                similarity_level: SimilarityLevel::Low,
                word_overlap_percentage: 0.0,
                risk_assessment: RiskAssessment::Safe,
                recommendations: recommendations_for(SimilarityLevel::Low),
            };
        }

        let overlap = jaccard_percentage(
            &original_tokens.iter().map(String::as_str).collect(),
            &rewritten_tokens.iter().map(String::as_str).collect(),
        );
        let sequence = self.ngram_similarity(&original_tokens, &rewritten_tokens);

        let similarity_score = round1(
            overlap * self.config.overlap_weight + sequence * self.config.sequence_weight,
        );
        let similarity_level = level_for(similarity_score);

        SimilarityReport {
            similarity_score,
            similarity_level,
            word_overlap_percentage: round1(overlap),
            risk_assessment: risk_for(similarity_score),
            recommendations: recommendations_for(similarity_level),
        }
    }

    /// Jaccard similarity over word n-grams. Texts shorter than the n-gram
    /// size are compared as a single gram.
    fn ngram_similarity(&self, original: &[String], rewritten: &[String]) -> f64 {
        let original_grams = ngrams(original, self.config.ngram_size);
        let rewritten_grams = ngrams(rewritten, self.config.ngram_size);
        jaccard_percentage(
            &original_grams.iter().map(String::as_str).collect(),
            &rewritten_grams.iter().map(String::as_str).collect(),
        )
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}

fn ngrams(tokens: &[String], size: usize) -> HashSet<String> {
    if tokens.len() < size {
        return HashSet::from([tokens.join(" ")]);
    }
    tokens.windows(size).map(|window| window.join(" ")).collect()
}

fn jaccard_percentage(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    (intersection as f64 / union as f64) * 100.0
}

fn level_for(score: f64) -> SimilarityLevel {
    if score < 30.0 {
        SimilarityLevel::Low
    } else if score <= 50.0 {
        SimilarityLevel::Moderate
    } else if score <= 70.0 {
        SimilarityLevel::High
    } else {
        SimilarityLevel::VeryHigh
    }
}

/// Safe only below the 70%-difference originality floor (similarity < 30).
fn risk_for(score: f64) -> RiskAssessment {
    if score < 30.0 {
        RiskAssessment::Safe
    } else if score <= 50.0 {
        RiskAssessment::Caution
    } else {
        RiskAssessment::HighRisk
    }
}

fn recommendations_for(level: SimilarityLevel) -> Vec<String> {
    let lines: &[&str] = match level {
        SimilarityLevel::VeryHigh => &[
            "Increase paraphrasing across the full script",
            "Restructure sentence and section order",
            "Vary vocabulary and phrasing significantly",
        ],
        SimilarityLevel::High => &[
            "Rework the most similar sections",
            "Add original perspectives and examples",
            "Consider reorganizing the content",
        ],
        SimilarityLevel::Moderate => &[
            "Modify remaining similar passages",
            "Introduce unique framing and transitions",
        ],
        SimilarityLevel::Low => &[
            "Content is sufficiently distinct",
            "Keep the current transformation approach",
        ],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_score_100() {
        let report = Scorer::default().score("the quick brown fox", "the quick brown fox");
        assert_eq!(report.similarity_score, 100.0);
        assert_eq!(report.similarity_level, SimilarityLevel::VeryHigh);
        assert_eq!(report.risk_assessment, RiskAssessment::HighRisk);
    }

    #[test]
    fn empty_original_is_safe() {
        let report = Scorer::default().score("", "anything");
        assert_eq!(report.similarity_score, 0.0);
        assert_eq!(report.word_overlap_percentage, 0.0);
        assert_eq!(report.risk_assessment, RiskAssessment::Safe);
    }

    #[test]
    fn both_empty_is_safe() {
        let report = Scorer::default().score("", "");
        assert_eq!(report.similarity_score, 0.0);
        assert_eq!(report.risk_assessment, RiskAssessment::Safe);
    }

    #[test]
    fn disjoint_texts_score_low() {
        let report = Scorer::default().score(
            "alpha beta gamma delta epsilon",
            "one two three four five",
        );
        assert_eq!(report.similarity_score, 0.0);
        assert_eq!(report.similarity_level, SimilarityLevel::Low);
        assert_eq!(report.risk_assessment, RiskAssessment::Safe);
    }

    #[test]
    fn score_decreases_as_overlap_decreases() {
        // Shared prefix shrinks step by step while the tail stays disjoint,
        // so word overlap strictly decreases.
        let scorer = Scorer::default();
        let original = "alpha beta gamma delta epsilon zeta eta theta";
        let rewrites = [
            "alpha beta gamma delta epsilon zeta one two",
            "alpha beta gamma delta three one two nine",
            "alpha beta five six three one two nine",
            "seven eight five six three one two nine",
        ];
        let scores: Vec<f64> = rewrites
            .iter()
            .map(|rewrite| scorer.score(original, rewrite).similarity_score)
            .collect();
        assert!(scores.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn level_thresholds_match_risk_bands() {
        assert_eq!(level_for(29.9), SimilarityLevel::Low);
        assert_eq!(level_for(30.0), SimilarityLevel::Moderate);
        assert_eq!(level_for(50.0), SimilarityLevel::Moderate);
        assert_eq!(level_for(50.1), SimilarityLevel::High);
        assert_eq!(level_for(70.1), SimilarityLevel::VeryHigh);
        assert_eq!(risk_for(29.9), RiskAssessment::Safe);
        assert_eq!(risk_for(30.0), RiskAssessment::Caution);
        assert_eq!(risk_for(50.1), RiskAssessment::HighRisk);
    }
}
