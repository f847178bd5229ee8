//! Sequencer model: token sample sets and their randomness statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a token analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Configured,
    Collecting,
    Analyzing,
    Completed,
    Error,
}

/// How token samples are pulled out of captured responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "extraction_type", content = "extraction_pattern")]
pub enum ExtractionRecipe {
    /// Value of the named response header
    Header(String),
    /// Value of the named cookie in `Set-Cookie`
    Cookie(String),
    /// First capture group (or whole match) of a regex over the body
    BodyRegex(String),
    /// Dot-separated path into a JSON body (`session.token`)
    BodyJson(String),
}

/// A named token-randomness analysis with its accumulated samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAnalysis {
    pub id: Uuid,
    pub name: String,
    pub status: AnalysisStatus,

    /// Exchange the recipe was configured against, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_exchange_id: Option<Uuid>,
    #[serde(flatten)]
    pub recipe: ExtractionRecipe,

    /// Target number of samples to collect
    pub sample_count: u32,
    pub samples: Vec<String>,

    /// Populated by `analyze`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<TokenStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TokenAnalysis {
    /// Create a `configured` analysis with the given recipe
    pub fn new(name: impl Into<String>, recipe: ExtractionRecipe) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: AnalysisStatus::Configured,
            source_exchange_id: None,
            recipe,
            sample_count: 100,
            samples: Vec::new(),
            results: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Frequency of one character across the concatenated samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharFrequency {
    pub character: String,
    pub count: u64,
    pub percentage: f64,
}

/// Entropy summary for a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyReport {
    /// Mean per-token Shannon entropy in bits
    pub entropy_bits: f64,
    /// log₂ of the observed character-set size
    pub max_entropy: f64,
    /// `entropy_bits / max_entropy`
    pub efficiency: f64,
    /// Human rating: Excellent / Good / Fair / Poor
    pub rating: String,
}

/// Structural patterns detected in a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub has_sequential: bool,
    pub has_repeated: bool,
    pub common_prefixes: Vec<String>,
    pub common_suffixes: Vec<String>,
}

/// Full statistics computed over a token sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatistics {
    pub total_samples: u64,
    pub unique_samples: u64,
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
    /// Sorted distinct code points across all tokens
    pub character_set: Vec<String>,
    /// Top-20 character frequencies over the concatenation
    pub character_frequencies: Vec<CharFrequency>,
    pub entropy: EntropyReport,
    pub patterns: PatternReport,
    pub recommendation: String,
}
