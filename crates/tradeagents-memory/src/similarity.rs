use std::collections::HashMap;

/// Term-frequency vector of a piece of text, with its norm precomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct TermVector {
    terms: HashMap<String, f64>,
    norm: f64,
}

impl TermVector {
    pub fn from_text(text: &str) -> Self {
        let mut terms: HashMap<String, f64> = HashMap::new();
        for token in tokenize(text) {
            *terms.entry(token).or_insert(0.0) += 1.0;
        }
        let norm = terms.values().map(|v| v * v).sum::<f64>().sqrt();
        Self { terms, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Cosine similarity in [0.0, 1.0]. Empty vectors score 0.
    pub fn cosine(&self, other: &TermVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.terms.len() <= other.terms.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .terms
            .iter()
            .filter_map(|(term, w)| large.terms.get(term).map(|v| w * v))
            .sum();
        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}

/// Lowercased ASCII words; every other alphanumeric character (CJK text in
/// particular) becomes a token of its own.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            word.push(ch.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if ch.is_alphanumeric() {
            tokens.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_ascii_and_cjk() {
        assert_eq!(
            tokenize("RSI oversold, 茅台 up!"),
            vec!["rsi", "oversold", "茅", "台", "up"]
        );
    }

    #[test]
    fn identical_text_scores_one() {
        let a = TermVector::from_text("high inflation rising rates");
        let b = TermVector::from_text("High inflation, rising rates.");
        assert!((a.cosine(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_text_scores_zero() {
        let a = TermVector::from_text("tech sector rally");
        let b = TermVector::from_text("bond yields fall");
        assert_eq!(a.cosine(&b), 0.0);
    }

    #[test]
    fn partial_overlap_is_between() {
        let a = TermVector::from_text("inflation rising rates volatile");
        let b = TermVector::from_text("inflation easing rates stable");
        let score = a.cosine(&b);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn empty_text_scores_zero() {
        let empty = TermVector::from_text("  ,,  ");
        assert!(empty.is_empty());
        assert_eq!(empty.cosine(&TermVector::from_text("anything")), 0.0);
    }
}
