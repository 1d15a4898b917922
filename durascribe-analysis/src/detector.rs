//! Repetition and phrase-loop detection for transcript text.
//!
//! `analyze()` is a pure function over the input string: no I/O, no caches,
//! no hidden state. The pipeline calls it after every segment, so the whole
//! pass is token scanning and hash counting - well under a millisecond for
//! transcripts of a few hundred words.

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Texts shorter than this many words report a repetition ratio of 0.0.
const MIN_WORDS_FOR_REPETITION: usize = 10;

/// Texts shorter than this many words report a diversity ratio of 1.0.
const MIN_WORDS_FOR_DIVERSITY: usize = 5;

/// N-gram sizes counted for the repetition ratio.
const NGRAM_SIZES: std::ops::RangeInclusive<usize> = 2..=4;

/// Classification of a detected output pathology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// A short word sequence repeats consecutively
    PhraseLoop,
    /// Vocabulary collapsed without a clean consecutive run
    LowDiversity,
    /// No pathology detected
    None,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::PhraseLoop => write!(f, "phrase_loop"),
            PatternKind::LowDiversity => write!(f, "low_diversity"),
            PatternKind::None => write!(f, "none"),
        }
    }
}

/// Outcome of one detection pass over a transcript
///
/// Recomputed on demand; never cached across different texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDetectionResult {
    /// True when any pathology was classified
    pub is_loop: bool,
    /// Detection confidence in `[0, 1]`
    pub confidence: f64,
    /// Which pathology, if any
    pub pattern_kind: PatternKind,
    /// Unique words over total words (1.0 when too short to judge)
    pub diversity_ratio: f64,
    /// Most frequent n-gram count over total words (0.0 when too short)
    pub repetition_ratio: f64,
    /// Short excerpt of the offending run, for logs
    pub sample: Option<String>,
}

/// Detection thresholds
///
/// Defaults are tuned on observed recognizer failures; treat them as
/// adjustable, not as contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum consecutive occurrences that count as a phrase loop
    pub min_run_length: usize,
    /// Longest phrase (in words) scanned for consecutive runs
    pub max_phrase_words: usize,
    /// Repetition ratio above this classifies as low diversity
    pub max_repetition_ratio: f64,
    /// Diversity ratio below this classifies as low diversity
    pub min_diversity_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_run_length: 3,
            max_phrase_words: 3,
            max_repetition_ratio: 0.7,
            min_diversity_ratio: 0.3,
        }
    }
}

impl DetectorConfig {
    /// Set the minimum consecutive run length
    pub fn with_min_run_length(mut self, len: usize) -> Self {
        self.min_run_length = len;
        self
    }

    /// Set the longest phrase size scanned for runs
    pub fn with_max_phrase_words(mut self, words: usize) -> Self {
        self.max_phrase_words = words;
        self
    }

    /// Set the repetition-ratio threshold
    pub fn with_max_repetition_ratio(mut self, ratio: f64) -> Self {
        self.max_repetition_ratio = ratio;
        self
    }

    /// Set the diversity-ratio threshold
    pub fn with_min_diversity_ratio(mut self, ratio: f64) -> Self {
        self.min_diversity_ratio = ratio;
        self
    }

    /// Validate threshold ranges
    pub fn validate(&self) -> Result<()> {
        if self.min_run_length < 2 {
            return Err(AnalysisError::detector_config(format!(
                "min_run_length must be at least 2, got {}",
                self.min_run_length
            )));
        }
        if self.max_phrase_words == 0 {
            return Err(AnalysisError::detector_config(
                "max_phrase_words must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_repetition_ratio) {
            return Err(AnalysisError::detector_config(format!(
                "max_repetition_ratio must be in [0.0, 1.0], got {}",
                self.max_repetition_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.min_diversity_ratio) {
            return Err(AnalysisError::detector_config(format!(
                "min_diversity_ratio must be in [0.0, 1.0], got {}",
                self.min_diversity_ratio
            )));
        }
        Ok(())
    }
}

struct PhraseRun {
    phrase: String,
    count: usize,
}

/// Stateless detector for repetition collapse in recognizer output
///
/// # Example
///
/// ```
/// use durascribe_analysis::{DetectorConfig, RepetitionDetector};
///
/// let detector = RepetitionDetector::new(DetectorConfig::default())?;
/// let looped = detector.analyze("o que é o que é o que é o que é");
/// assert!(looped.is_loop);
///
/// let clean = detector.analyze("Esta é uma transcrição normal sem problemas.");
/// assert!(!clean.is_loop);
/// # Ok::<(), durascribe_analysis::AnalysisError>(())
/// ```
pub struct RepetitionDetector {
    config: DetectorConfig,
    word_re: Regex,
}

impl RepetitionDetector {
    /// Create a detector, validating the configuration
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let word_re = Regex::new(r"[\p{L}\p{N}']+")
            .map_err(|e| AnalysisError::pattern(e.to_string()))?;
        Ok(Self { config, word_re })
    }

    /// Detector configuration in effect
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyze a transcript for repetition pathologies
    ///
    /// Classification rules:
    /// - a consecutive run of the same 1-3-word phrase (case-insensitive,
    ///   punctuation ignored) at least `min_run_length` times is a
    ///   `PhraseLoop` with confidence 1.0;
    /// - otherwise a repetition ratio above `max_repetition_ratio` or a
    ///   diversity ratio below `min_diversity_ratio` is `LowDiversity`;
    /// - confidence for non-run cases is
    ///   `max(repetition_ratio, 1 - diversity_ratio)`.
    pub fn analyze(&self, text: &str) -> LoopDetectionResult {
        let words = self.tokenize(text);
        let total = words.len();

        let diversity_ratio = if total < MIN_WORDS_FOR_DIVERSITY {
            1.0
        } else {
            raw_diversity(&words)
        };
        let repetition_ratio = if total < MIN_WORDS_FOR_REPETITION {
            0.0
        } else {
            ngram_repetition_ratio(&words)
        };

        if let Some(run) = self.find_phrase_run(&words) {
            return LoopDetectionResult {
                is_loop: true,
                confidence: 1.0,
                pattern_kind: PatternKind::PhraseLoop,
                diversity_ratio,
                repetition_ratio,
                sample: Some(format!("{} x{}", run.phrase, run.count)),
            };
        }

        let pattern_kind = if repetition_ratio > self.config.max_repetition_ratio
            || diversity_ratio < self.config.min_diversity_ratio
        {
            PatternKind::LowDiversity
        } else {
            PatternKind::None
        };
        let confidence = repetition_ratio.max(1.0 - diversity_ratio).clamp(0.0, 1.0);

        LoopDetectionResult {
            is_loop: pattern_kind != PatternKind::None,
            confidence,
            pattern_kind,
            diversity_ratio,
            repetition_ratio,
            sample: None,
        }
    }

    /// Raw vocabulary diversity of `text`: unique words over total words
    ///
    /// Unlike the `diversity_ratio` reported by [`analyze`](Self::analyze),
    /// this applies no short-text neutral rule.
    pub fn calculate_diversity(&self, text: &str) -> f64 {
        raw_diversity(&self.tokenize(text))
    }

    /// Number of word tokens extracted from `text`
    pub fn word_count(&self, text: &str) -> usize {
        self.word_re.find_iter(text).count()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        self.word_re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    /// Scan for `min_run_length` consecutive occurrences of any phrase of
    /// 1..=`max_phrase_words` words. Returns the first qualifying run.
    fn find_phrase_run(&self, words: &[String]) -> Option<PhraseRun> {
        let total = words.len();
        for n in 1..=self.config.max_phrase_words {
            if total < n * self.config.min_run_length {
                continue;
            }
            for i in 0..=(total - n) {
                let mut count = 1;
                let mut j = i + n;
                while j + n <= total && words[j..j + n] == words[i..i + n] {
                    count += 1;
                    j += n;
                }
                if count >= self.config.min_run_length {
                    return Some(PhraseRun {
                        phrase: words[i..i + n].join(" "),
                        count,
                    });
                }
            }
        }
        None
    }
}

fn raw_diversity(words: &[String]) -> f64 {
    if words.is_empty() {
        return 1.0;
    }
    let unique: HashSet<&str> = words.iter().map(|w| w.as_str()).collect();
    unique.len() as f64 / words.len() as f64
}

fn ngram_repetition_ratio(words: &[String]) -> f64 {
    let total = words.len();
    let mut max_count = 0usize;
    for n in NGRAM_SIZES {
        if total < n {
            break;
        }
        let mut counts: HashMap<&[String], usize> = HashMap::new();
        for gram in words.windows(n) {
            let count = counts.entry(gram).or_insert(0);
            *count += 1;
            if *count > max_count {
                max_count = *count;
            }
        }
    }
    (max_count as f64 / total as f64).min(1.0)
}
