//! Token estimation.
//!
//! There is no tokenizer here: counts are a linear function of input length
//! and should be read as a rough upper bound. Everything that needs a count
//! goes through [`TokenEstimator`] so a real tokenizer can be dropped in later.

/// Estimate the number of tokens in a piece of text.
pub trait TokenEstimator: Send + Sync {
    /// Pure and deterministic. Empty text is 0 tokens.
    fn estimate(&self, text: &str) -> usize;
}

/// Whitespace-separated words times a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordHeuristic {
    tokens_per_word: f64,
}

impl WordHeuristic {
    pub const DEFAULT_TOKENS_PER_WORD: f64 = 1.3;
    pub const MAX_TOKENS_PER_WORD: f64 = 100.0;

    /// Ratios outside `(0, MAX_TOKENS_PER_WORD]` fall back to the default.
    pub fn new(tokens_per_word: f64) -> Self {
        let valid = tokens_per_word.is_finite()
            && tokens_per_word > 0.0
            && tokens_per_word <= Self::MAX_TOKENS_PER_WORD;
        let tokens_per_word = if valid {
            tokens_per_word
        } else {
            Self::DEFAULT_TOKENS_PER_WORD
        };
        Self { tokens_per_word }
    }

    pub fn tokens_per_word(&self) -> f64 {
        self.tokens_per_word
    }

    /// Rough inverse, used when telling the user how much text fits.
    pub fn words_for(&self, tokens: usize) -> usize {
        (tokens as f64 / self.tokens_per_word).floor() as usize
    }
}

impl Default for WordHeuristic {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOKENS_PER_WORD)
    }
}

impl TokenEstimator for WordHeuristic {
    fn estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words as f64 * self.tokens_per_word).ceil() as usize
    }
}

/// Rule of thumb: 1 token ~= 4 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharHeuristic {
    chars_per_token: usize,
}

impl CharHeuristic {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for CharHeuristic {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharHeuristic {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Which heuristic to build, as chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorKind {
    Words { tokens_per_word: f64 },
    Chars { chars_per_token: usize },
}

impl EstimatorKind {
    pub fn build(&self) -> Box<dyn TokenEstimator> {
        match *self {
            Self::Words { tokens_per_word } => Box::new(WordHeuristic::new(tokens_per_word)),
            Self::Chars { chars_per_token } => Box::new(CharHeuristic::new(chars_per_token)),
        }
    }

    /// Approximate words that fit in `tokens`, for prompts.
    pub fn words_for(&self, tokens: usize) -> usize {
        match *self {
            Self::Words { tokens_per_word } => {
                WordHeuristic::new(tokens_per_word).words_for(tokens)
            }
            // ~5 characters per English word
            Self::Chars { chars_per_token } => tokens.saturating_mul(chars_per_token.max(1)) / 5,
        }
    }
}

impl Default for EstimatorKind {
    fn default() -> Self {
        Self::Words {
            tokens_per_word: WordHeuristic::DEFAULT_TOKENS_PER_WORD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(WordHeuristic::default().estimate(""), 0);
        assert_eq!(WordHeuristic::default().estimate("   \n\t "), 0);
        assert_eq!(CharHeuristic::default().estimate(""), 0);
    }

    #[test]
    fn test_word_heuristic_rounds_up() {
        let estimator = WordHeuristic::new(1.3);
        // 3 words * 1.3 = 3.9
        assert_eq!(estimator.estimate("one two three"), 4);

        let exact = WordHeuristic::new(1.0);
        assert_eq!(exact.estimate("one  two\nthree\tfour"), 4);
    }

    #[test]
    fn test_word_heuristic_rejects_bad_ratio() {
        assert_eq!(
            WordHeuristic::new(0.0).tokens_per_word(),
            WordHeuristic::DEFAULT_TOKENS_PER_WORD
        );
        assert_eq!(
            WordHeuristic::new(f64::NAN).tokens_per_word(),
            WordHeuristic::DEFAULT_TOKENS_PER_WORD
        );
        assert_eq!(
            WordHeuristic::new(1e300).tokens_per_word(),
            WordHeuristic::DEFAULT_TOKENS_PER_WORD
        );
        assert_eq!(WordHeuristic::new(100.0).tokens_per_word(), 100.0);
    }

    #[test]
    fn test_char_heuristic() {
        let estimator = CharHeuristic::default();
        assert_eq!(estimator.estimate("abcd"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
        // counts characters, not bytes
        assert_eq!(estimator.estimate("ééééé"), 2);
        assert_eq!(CharHeuristic::new(0).chars_per_token(), 1);
    }

    #[test]
    fn test_estimate_grows_with_input() {
        let estimator = WordHeuristic::default();
        let short = estimator.estimate("a b");
        let long = estimator.estimate("a b c d e f g h");
        assert!(long > short);
    }

    #[test]
    fn test_kind_builds_matching_estimator() {
        let words = EstimatorKind::Words { tokens_per_word: 2.0 }.build();
        assert_eq!(words.estimate("a b c"), 6);

        let chars = EstimatorKind::Chars { chars_per_token: 2 }.build();
        assert_eq!(chars.estimate("abcde"), 3);
    }

    #[test]
    fn test_words_for() {
        let kind = EstimatorKind::Words { tokens_per_word: 2.0 };
        assert_eq!(kind.words_for(100), 50);
        assert_eq!(WordHeuristic::new(1.0).words_for(30720), 30720);

        let chars = EstimatorKind::Chars { chars_per_token: 4 };
        assert_eq!(chars.words_for(10), 8);
        assert_eq!(chars.words_for(usize::MAX), usize::MAX / 5);
    }
}
