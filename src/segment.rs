//! Segment boundary detection.
//!
//! Decides when the unsent suffix of the explanation buffer is complete
//! enough to submit for analysis. Detection is an ordered set of
//! [`BoundaryRule`]s combined with OR: any single rule firing is enough.
//! Rules look for semantic completion signals -- finished sentences, a
//! closed paragraph, a summarizing phrase, a wrapped-up list -- not raw
//! length alone.

use crate::dialogue::Comment;
use crate::metric::semantic_length;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Terminal punctuation across the supported scripts.
const TERMINALS: &[char] = &['。', '！', '？', '!', '?', '.'];

/// Minimum terminal punctuation marks for the sentence-count rule.
const MIN_SENTENCES: usize = 3;

/// Minimum semantic length for the length rule.
const MIN_LENGTH: usize = 200;

/// Minimum list items for the enumerated-list rule.
const MIN_LIST_ITEMS: usize = 2;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("paragraph regex"));

/// Discourse markers that signal a summary or an example is wrapping up,
/// followed eventually by terminal punctuation.
static CLOSING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(总之|总而言之|综上所述|换句话说|因此|所以说|举个例子|例如|比如说|in summary|in conclusion|to sum up|in short|therefore|for example|for instance)[^。！？!?.]*[。！？!?.]",
    )
    .expect("closing phrase regex")
});

/// One enumerated list item: a digit or CJK numeral, a separator, item text,
/// terminal punctuation.
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]+|[一二三四五六七八九十])[、．.)）:：][^。！？!?.\n]*[。！？!?.]")
        .expect("list item regex")
});

/// A single boundary heuristic over the unsent suffix.
///
/// Rules are objects so additional languages or heuristics can be added
/// without touching the evaluator.
pub trait BoundaryRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, unsent: &str) -> bool;
}

/// At least three complete sentences.
pub struct SentenceCount;

impl BoundaryRule for SentenceCount {
    fn name(&self) -> &'static str {
        "sentence-count"
    }

    fn matches(&self, unsent: &str) -> bool {
        unsent.chars().filter(|c| TERMINALS.contains(c)).count() >= MIN_SENTENCES
    }
}

/// Enough semantic length regardless of punctuation.
pub struct SufficientLength;

impl BoundaryRule for SufficientLength {
    fn name(&self) -> &'static str {
        "length"
    }

    fn matches(&self, unsent: &str) -> bool {
        semantic_length(unsent) >= MIN_LENGTH
    }
}

/// A blank line: two line breaks separated only by horizontal whitespace.
pub struct ParagraphBreak;

impl BoundaryRule for ParagraphBreak {
    fn name(&self) -> &'static str {
        "paragraph-break"
    }

    fn matches(&self, unsent: &str) -> bool {
        PARAGRAPH_BREAK.is_match(unsent)
    }
}

/// A closing or bridging discourse marker reaching terminal punctuation.
pub struct ClosingPhrase;

impl BoundaryRule for ClosingPhrase {
    fn name(&self) -> &'static str {
        "closing-phrase"
    }

    fn matches(&self, unsent: &str) -> bool {
        CLOSING_PHRASE.is_match(unsent)
    }
}

/// Two or more enumerated list items, each ended with terminal punctuation.
pub struct EnumeratedList;

impl BoundaryRule for EnumeratedList {
    fn name(&self) -> &'static str {
        "enumerated-list"
    }

    fn matches(&self, unsent: &str) -> bool {
        LIST_ITEM.find_iter(unsent).count() >= MIN_LIST_ITEMS
    }
}

/// Evaluates the rule set against the unsent suffix of the buffer.
pub struct SegmentationTrigger {
    rules: Vec<Box<dyn BoundaryRule>>,
}

impl Default for SegmentationTrigger {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(SentenceCount),
                Box::new(SufficientLength),
                Box::new(ParagraphBreak),
                Box::new(ClosingPhrase),
                Box::new(EnumeratedList),
            ],
        }
    }
}

impl SegmentationTrigger {
    #[must_use]
    pub fn new(rules: Vec<Box<dyn BoundaryRule>>) -> Self {
        Self { rules }
    }

    pub fn push_rule(&mut self, rule: Box<dyn BoundaryRule>) {
        self.rules.push(rule);
    }

    /// True if any rule fires on the unsent suffix. An empty suffix never
    /// triggers.
    #[must_use]
    pub fn should_trigger(&self, unsent: &str) -> bool {
        if unsent.trim().is_empty() {
            return false;
        }

        for rule in &self.rules {
            if rule.matches(unsent) {
                debug!(rule = rule.name(), "segment boundary detected");
                return true;
            }
        }

        false
    }
}

/// One submitted chunk and the AI's reaction to it.
#[derive(Debug, Clone)]
pub struct Segment {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub comments: Vec<Comment>,
}

impl Segment {
    #[must_use]
    pub fn new(content: String, comments: Vec<Comment>) -> Self {
        Self {
            content,
            timestamp: Utc::now(),
            comments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> SegmentationTrigger {
        SegmentationTrigger::default()
    }

    #[test]
    fn test_empty_never_triggers() {
        assert!(!trigger().should_trigger(""));
        assert!(!trigger().should_trigger("   \n  "));
    }

    #[test]
    fn test_three_sentences_trigger() {
        // Three terminal marks regardless of total length
        assert!(trigger().should_trigger("A. B. C."));
        assert!(trigger().should_trigger("对。好！是吗？"));
    }

    #[test]
    fn test_two_sentences_do_not_trigger() {
        assert!(!trigger().should_trigger("A. B"));
        assert!(!trigger().should_trigger("This is one. And two"));
    }

    #[test]
    fn test_length_alone_triggers() {
        // 220 CJK characters with no punctuation at all: conditions are
        // OR'd, so the length rule fires on its own.
        let text = "光".repeat(220);
        assert!(trigger().should_trigger(&text));
    }

    #[test]
    fn test_short_plain_text_does_not_trigger() {
        let text = "photosynthesis turns light into sugar";
        assert!(!trigger().should_trigger(text));
    }

    #[test]
    fn test_paragraph_break_triggers() {
        assert!(trigger().should_trigger("first thought\n\nsecond thought"));
        assert!(trigger().should_trigger("first\n  \nsecond"));
        assert!(!trigger().should_trigger("single\nline\nbreaks"));
    }

    #[test]
    fn test_closing_phrase_triggers() {
        assert!(trigger().should_trigger("总之，光合作用把光变成糖。"));
        assert!(trigger().should_trigger("In summary, light becomes sugar."));
        assert!(trigger().should_trigger("Therefore the cycle repeats."));
        // Marker without reaching terminal punctuation
        assert!(!trigger().should_trigger("in summary light becomes"));
    }

    #[test]
    fn test_enumerated_list_triggers() {
        assert!(trigger().should_trigger("1、吸收光能。2、固定二氧化碳。"));
        assert!(trigger().should_trigger("一、光反应。二、暗反应。"));
        // One item is not a list
        assert!(!trigger().should_trigger("1、吸收光能。"));
    }

    #[test]
    fn test_custom_rule_is_consulted() {
        struct Always;
        impl BoundaryRule for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn matches(&self, _unsent: &str) -> bool {
                true
            }
        }

        let mut t = SegmentationTrigger::new(vec![]);
        assert!(!t.should_trigger("anything"));
        t.push_rule(Box::new(Always));
        assert!(t.should_trigger("anything"));
    }
}
