use std::collections::HashSet;

/// Lowercase word tokens, punctuation stripped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check if a word is a common stop word.
pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by"
            | "a" | "an" | "is" | "are" | "was" | "were" | "be" | "been" | "have" | "has" | "had"
            | "do" | "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might"
            | "must" | "can" | "this" | "that" | "these" | "those" | "it" | "its" | "you" | "your"
            | "not" | "what" | "when" | "where" | "how" | "all" | "there" | "their" | "they"
    )
}

/// Split text into sentences on terminal punctuation. A single uppercase
/// letter followed by a period (an initial like "J.") is not a sentence end.
/// Text without terminal punctuation is returned as one sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if c == '.' && is_initial(&chars, i) {
                continue;
            }
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    if sentences.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.trim().trim_end_matches(['.', '!', '?']).trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

fn is_initial(chars: &[char], period_idx: usize) -> bool {
    if period_idx == 0 {
        return false;
    }
    let prev = chars[period_idx - 1];
    if !prev.is_uppercase() || !prev.is_alphabetic() {
        return false;
    }
    // Preceding letter must itself start a token.
    period_idx < 2 || !chars[period_idx - 2].is_alphanumeric()
}

/// Content complexity on a 0-100 scale, combining sentence length (30%),
/// word length (40%) and vocabulary diversity (30%).
pub fn complexity_score(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let sentence_count = split_sentences(text).len().max(1);
    let avg_sentence_len = words.len() as f64 / sentence_count as f64;
    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_len = total_chars as f64 / words.len() as f64;
    let unique: HashSet<&str> = words.iter().copied().collect();
    let diversity = unique.len() as f64 / words.len() as f64;

    let score =
        (avg_sentence_len / 20.0) * 30.0 + (avg_word_len / 8.0) * 40.0 + diversity * 30.0;
    score.clamp(0.0, 100.0)
}

/// Word-level Levenshtein distance between two texts.
pub fn word_edit_distance(a: &str, b: &str) -> usize {
    let a_words: Vec<&str> = a.split_whitespace().collect();
    let b_words: Vec<&str> = b.split_whitespace().collect();
    if a_words.is_empty() {
        return b_words.len();
    }
    if b_words.is_empty() {
        return a_words.len();
    }

    let mut prev: Vec<usize> = (0..=b_words.len()).collect();
    let mut current = vec![0; b_words.len() + 1];

    for (i, a_word) in a_words.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_word) in b_words.iter().enumerate() {
            let substitution = prev[j] + usize::from(a_word != b_word);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b_words.len()]
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
