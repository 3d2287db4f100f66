use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use telos_core::config::GuardrailConfig;

pub const DEFAULT_MAX_WORDS: usize = 200;
pub const DEFAULT_SHORT_REPLY_CHARS: usize = 50;

const SENTENCE_BOUNDARY_RATIO: f64 = 0.7;
const ELLIPSIS: &str = "...";

const ON_TOPIC_KEYWORDS: &[&str] = &[
    "automation",
    "ai",
    "artificial intelligence",
    "machine learning",
    "workflow",
    "process",
    "system",
    "integration",
    "software",
    "technology",
    "digital",
    "business",
    "company",
    "project",
    "solution",
    "strategy",
    "consulting",
    "development",
    "build",
    "create",
    "design",
    "implement",
    "optimize",
    "efficiency",
    "productivity",
    "roi",
    "budget",
    "timeline",
    "deliverable",
    "quote",
    "proposal",
    "estimate",
    "audit",
    "assessment",
    "transformation",
    "humanity",
    "human",
    "amplify",
    "telos",
    "are you human",
];

const OFF_TOPIC_KEYWORDS: &[&str] = &[
    "recipe",
    "cooking",
    "weather",
    "sports",
    "politics",
    "religion",
    "medical advice",
    "legal advice",
    "financial advice",
    "investment",
    "stock",
    "crypto",
    "bitcoin",
    "gambling",
    "dating",
    "relationship advice",
    "personal problems",
    "therapy",
    "counseling",
    "health",
    "diet",
    "exercise",
    "entertainment",
    "movies",
    "music",
    "celebrity",
    "gossip",
    "news",
    "current events",
    "history",
    "philosophy",
    "science fiction",
    "fantasy",
];

pub const REDIRECT_MESSAGES: &[&str] = &[
    "Interesting tangent! But let's focus on what we do best: amplifying your humanity through intelligent automation. What challenge are you looking to solve?",
    "I appreciate the curiosity, but I'm here to help with automation, AI strategy, and digital transformation. What's your project about?",
    "That's outside my expertise! I specialize in helping businesses automate workflows and build AI solutions. What can I help you automate?",
    "Let's pivot back to what I'm built for: turning your ideas into intelligent systems. What problem are you trying to solve?",
    "I'm laser-focused on automation and AI solutions. What's the biggest inefficiency in your current workflow?",
    "While that's fascinating, I'm here to help with digital transformation and automation. What's your project vision?",
    "That's not quite my domain! I help businesses amplify their humanity through smart automation. What challenge can we tackle together?",
    "Interesting, but let's get back to what I do best: building intelligent systems. What automation opportunity are you exploring?",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardrailVerdict {
    pub is_valid: bool,
    pub is_off_topic: bool,
    pub word_count: usize,
    pub max_words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_message: Option<String>,
}

impl GuardrailVerdict {
    pub fn is_over_length(&self) -> bool {
        self.word_count > self.max_words
    }
}

/// Post-hoc topic and length policy for model replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseGuardrail {
    max_words: usize,
    short_reply_chars: usize,
}

impl Default for ResponseGuardrail {
    fn default() -> Self {
        Self { max_words: DEFAULT_MAX_WORDS, short_reply_chars: DEFAULT_SHORT_REPLY_CHARS }
    }
}

impl From<&GuardrailConfig> for ResponseGuardrail {
    fn from(config: &GuardrailConfig) -> Self {
        Self { max_words: config.max_words, short_reply_chars: config.short_reply_chars }
    }
}

impl ResponseGuardrail {
    pub fn new(max_words: usize, short_reply_chars: usize) -> Self {
        Self { max_words, short_reply_chars }
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Keyword heuristic. An off-topic keyword loses to any on-topic keyword;
    /// keyword-free text passes only when it is short enough to be an acknowledgement.
    pub fn classify_topic(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let lowered = text.to_lowercase();
        let has_on_topic = ON_TOPIC_KEYWORDS.iter().any(|keyword| lowered.contains(keyword));
        let has_off_topic = OFF_TOPIC_KEYWORDS.iter().any(|keyword| lowered.contains(keyword));

        if has_off_topic {
            return has_on_topic;
        }
        has_on_topic || text.chars().count() < self.short_reply_chars
    }

    pub fn validate(&self, text: &str) -> GuardrailVerdict {
        self.validate_with_rng(text, &mut rand::thread_rng())
    }

    pub fn validate_with_rng<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> GuardrailVerdict {
        let word_count = count_words(text);
        let is_off_topic = !self.classify_topic(text);
        let mut verdict = GuardrailVerdict {
            is_valid: true,
            is_off_topic,
            word_count,
            max_words: self.max_words,
            redirect_message: None,
        };

        if word_count > self.max_words {
            verdict.is_valid = false;
            return verdict;
        }

        if is_off_topic {
            verdict.is_valid = false;
            verdict.redirect_message = Some(redirect_message(rng).to_string());
        }

        verdict
    }

    pub fn truncate(&self, text: &str) -> String {
        truncate_to_word_limit(text, self.max_words)
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn redirect_message<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    REDIRECT_MESSAGES.choose(rng).copied().unwrap_or(REDIRECT_MESSAGES[0])
}

/// Cuts to `max_words`, preferring a sentence end in the last 30% of the kept
/// text over an exact word count. Text already within the limit comes back as-is.
pub fn truncate_to_word_limit(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }

    let truncated = words[..max_words].join(" ");
    let boundary = truncated.rfind(['.', '!', '?']);

    match boundary {
        Some(index) if index as f64 > truncated.len() as f64 * SENTENCE_BOUNDARY_RATIO => {
            truncated[..=index].trim().to_string()
        }
        _ => format!("{}{ELLIPSIS}", truncated.trim()),
    }
}
