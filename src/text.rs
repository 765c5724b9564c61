//! Linguistic analysis seam: tokenization, lemmas, stopwords, cleaning.
//!
//! The matcher only needs tokens carrying a lemma and a stopword flag, so
//! the analyzer sits behind the [`Analyzer`] trait. The bundled
//! [`SimpleAnalyzer`] lowercases, splits on non-word characters, flags
//! stopwords from a built-in list, and normalizes plural and third-person
//! `-s` forms; a heavier tagger can be plugged in without touching the
//! pipeline.
//!
//! # Example
//!
//! ```
//! use content_guard::text::{Analyzer, SimpleAnalyzer};
//!
//! let analyzer = SimpleAnalyzer::new();
//! let tokens = analyzer.analyze("Is it good to buy Tesla stocks?");
//! let content: Vec<&str> = tokens
//!     .iter()
//!     .filter(|t| !t.stop)
//!     .map(|t| t.text.as_str())
//!     .collect();
//!
//! assert!(content.contains(&"stocks"));
//! assert!(!content.contains(&"is"));
//! ```

use std::collections::HashSet;

use compact_str::CompactString;

/// Common words suppressed from keyword and fuzzy indexing to prevent
/// false positives. Rule documents may extend this set via
/// `config.whitelist`.
pub const COMMON_WORD_WHITELIST: &[&str] = &[
    "the", "and", "for", "are", "this", "that", "with", "have", "from", "your", "been", "they",
    "will", "would", "could", "about", "what", "when", "where", "love", "like", "does", "into",
    "should", "their", "here", "than", "then", "some", "very", "just", "much", "only", "also",
    "over", "back", "more", "such", "well", "even", "must", "most", "make", "case", "good",
    "work", "life", "time", "year", "hand", "part", "fact", "look", "want", "give", "come",
    "take", "know", "find", "need", "tell", "help", "show", "talk", "form", "days", "week",
    "both", "last", "next", "high", "long", "left", "done", "best", "sure", "each", "name",
    "ever", "live", "felt", "plan", "game", "kind", "move", "keep", "mean", "made", "same",
    "real", "seen", "mind", "home", "line", "says", "read", "area", "went", "stop", "feel",
    "seem", "open", "miss", "heat", "care", "door",
];

/// Function words the analyzer flags as stopwords. Distinct from
/// [`COMMON_WORD_WHITELIST`]: stopwords are dropped from keyword lookups,
/// the whitelist suppresses index entries and fuzzy candidates.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "am", "are", "was", "were", "be", "been", "being", "it", "its", "i",
    "me", "my", "we", "our", "ours", "you", "your", "yours", "he", "him", "his", "she", "her",
    "hers", "they", "them", "their", "theirs", "to", "of", "in", "on", "at", "by", "for", "with",
    "about", "against", "between", "through", "during", "before", "after", "above", "below",
    "from", "up", "down", "out", "off", "again", "further", "here", "there", "where", "when",
    "why", "how", "all", "any", "both", "each", "few", "other", "such", "no", "nor", "not",
    "only", "own", "so", "too", "very", "can", "cannot", "do", "does", "did", "doing", "will",
    "would", "shall", "should", "may", "might", "must", "have", "has", "had", "having", "and",
    "but", "or", "if", "because", "as", "until", "while", "what", "which", "who", "whom",
    "this", "that", "these", "those", "then", "once", "than",
];

/// A single token produced by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Lowercased surface form.
    pub text:  CompactString,
    /// Dictionary form of the token.
    pub lemma: CompactString,
    /// Whether the token is a function word.
    pub stop:  bool
}

/// Tokenizer and lemmatizer seam used by the matcher pipeline.
pub trait Analyzer: Send + Sync {
    /// Split `text` into lowercased tokens with lemma and stopword flags.
    fn analyze(&self, text: &str) -> Vec<Token>;
}

/// Rule-based analyzer with a built-in English stopword list.
///
/// Lemmatization covers plural and third-person `-s` forms plus a small
/// irregular table; deeper inflection is handled downstream by the stem
/// stage.
pub struct SimpleAnalyzer {
    stopwords: HashSet<&'static str>
}

impl Default for SimpleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleAnalyzer {
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect()
        }
    }

    /// Dictionary form of a lowercased token.
    fn lemma(word: &str) -> CompactString {
        match word {
            "children" => return CompactString::const_new("child"),
            "men" => return CompactString::const_new("man"),
            "women" => return CompactString::const_new("woman"),
            "people" => return CompactString::const_new("person"),
            "feet" => return CompactString::const_new("foot"),
            "teeth" => return CompactString::const_new("tooth"),
            "mice" => return CompactString::const_new("mouse"),
            _ => {}
        }
        if let Some(base) = word.strip_suffix("ies")
            && word.len() > 4
        {
            return CompactString::from(format!("{}y", base));
        }
        if let Some(base) = word.strip_suffix("es")
            && word.len() > 3
            && (base.ends_with("ch")
                || base.ends_with("sh")
                || base.ends_with('x')
                || base.ends_with('z')
                || base.ends_with('s'))
        {
            return CompactString::from(base);
        }
        if let Some(base) = word.strip_suffix('s')
            && word.len() > 3
            && !word.ends_with("ss")
            && !word.ends_with("us")
            && !word.ends_with("is")
        {
            return CompactString::from(base);
        }
        CompactString::from(word)
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .map(|w| Token {
                text:  CompactString::from(w),
                lemma: Self::lemma(w),
                stop:  self.stopwords.contains(w)
            })
            .collect()
    }
}

/// Replace punctuation with spaces, preserving word characters.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Number of whitespace-separated words after cleaning.
pub fn word_count(text: &str) -> usize {
    clean_text(text).split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let analyzer = SimpleAnalyzer::new();
        let tokens = analyzer.analyze("Buy Tesla STOCK!");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["buy", "tesla", "stock"]);
    }

    #[test]
    fn test_stopword_flags() {
        let analyzer = SimpleAnalyzer::new();
        let tokens = analyzer.analyze("is it good");
        assert!(tokens[0].stop);
        assert!(tokens[1].stop);
        assert!(!tokens[2].stop);
    }

    #[test]
    fn test_lemma_plural_s() {
        assert_eq!(SimpleAnalyzer::lemma("invests"), "invest");
        assert_eq!(SimpleAnalyzer::lemma("stocks"), "stock");
    }

    #[test]
    fn test_lemma_sibilant_plural() {
        assert_eq!(SimpleAnalyzer::lemma("matches"), "match");
        assert_eq!(SimpleAnalyzer::lemma("boxes"), "box");
    }

    #[test]
    fn test_lemma_ies_plural() {
        assert_eq!(SimpleAnalyzer::lemma("stories"), "story");
    }

    #[test]
    fn test_lemma_preserves_ss_us_is() {
        assert_eq!(SimpleAnalyzer::lemma("class"), "class");
        assert_eq!(SimpleAnalyzer::lemma("virus"), "virus");
        assert_eq!(SimpleAnalyzer::lemma("analysis"), "analysis");
    }

    #[test]
    fn test_lemma_irregular() {
        assert_eq!(SimpleAnalyzer::lemma("children"), "child");
        assert_eq!(SimpleAnalyzer::lemma("people"), "person");
    }

    #[test]
    fn test_clean_text_strips_punctuation() {
        assert_eq!(clean_text("kill-myself, now!"), "kill myself  now ");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("Hello there."), 2);
        assert_eq!(word_count("  "), 0);
        assert_eq!(word_count("one, two; three"), 3);
    }

    #[test]
    fn test_whitelist_size() {
        assert!(COMMON_WORD_WHITELIST.len() >= 100);
    }
}
