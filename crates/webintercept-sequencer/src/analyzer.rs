//! Token statistics
//!
//! Pure functions: same input, same output, no I/O. Entropy is Shannon
//! entropy per token, reported as the mean across the sample set; the ceiling
//! is log₂ of the observed character-set size.

use std::collections::{BTreeSet, HashMap, HashSet};
use webintercept_core::model::{
    CharFrequency, EntropyReport, PatternReport, TokenStatistics,
};

/// Shannon entropy of one string in bits
pub fn shannon_entropy(data: &str) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq: HashMap<char, usize> = HashMap::new();
    let mut length = 0usize;
    for c in data.chars() {
        *freq.entry(c).or_insert(0) += 1;
        length += 1;
    }
    let length = length as f64;
    freq.values()
        .map(|&count| {
            let p = count as f64 / length;
            -p * p.log2()
        })
        .sum()
}

/// Rating thresholds over entropy efficiency
pub fn entropy_rating(efficiency: f64) -> &'static str {
    if efficiency >= 0.9 {
        "Excellent"
    } else if efficiency >= 0.7 {
        "Good"
    } else if efficiency >= 0.5 {
        "Fair"
    } else {
        "Poor"
    }
}

/// Sequential pattern: the first ten tokens parse as integers with a common
/// difference, or are all single alphabetic characters with a common
/// ordinal difference.
pub fn has_sequential_pattern(tokens: &[String]) -> bool {
    if tokens.len() < 3 {
        return false;
    }
    let head: Vec<&String> = tokens.iter().take(10).collect();

    if let Ok(nums) = head.iter().map(|t| t.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
        let diffs: HashSet<i64> = nums.windows(2).map(|w| w[1] - w[0]).collect();
        if diffs.len() == 1 {
            return true;
        }
    }

    if head
        .iter()
        .all(|t| t.chars().count() == 1 && t.chars().all(|c| c.is_alphabetic()))
    {
        let ords: Vec<i64> = head
            .iter()
            .filter_map(|t| t.chars().next())
            .map(|c| c as i64)
            .collect();
        let diffs: HashSet<i64> = ords.windows(2).map(|w| w[1] - w[0]).collect();
        if diffs.len() == 1 {
            return true;
        }
    }
    false
}

/// Repeated pattern: more than 10% of the samples are duplicates
pub fn has_repeated_pattern(tokens: &[String]) -> bool {
    if tokens.len() < 2 {
        return false;
    }
    let unique: HashSet<&String> = tokens.iter().collect();
    (unique.len() as f64) < (tokens.len() as f64) * 0.9
}

/// Which end of the token an affix search inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffixEnd {
    Prefix,
    Suffix,
}

/// Affixes of length 2–5 appearing in at least half the tokens, longest
/// first, capped at five
pub fn common_affixes(tokens: &[String], end: AffixEnd) -> Vec<String> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 3 {
            continue;
        }
        for length in 2..=5.min(chars.len() - 1) {
            let affix: String = match end {
                AffixEnd::Prefix => chars[..length].iter().collect(),
                AffixEnd::Suffix => chars[chars.len() - length..].iter().collect(),
            };
            *counts.entry(affix).or_insert(0) += 1;
        }
    }

    let threshold = (tokens.len() as f64) * 0.5;
    let mut common: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count as f64 >= threshold)
        .map(|(affix, _)| affix)
        .collect();
    common.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    common.truncate(5);
    common
}

fn recommendation(
    efficiency: f64,
    has_sequential: bool,
    has_repeated: bool,
    unique_ratio: f64,
) -> String {
    let mut issues = Vec::new();
    if efficiency < 0.5 {
        issues.push("Low entropy indicates predictable token generation");
    }
    if has_sequential {
        issues.push("Sequential patterns detected - tokens may be guessable");
    }
    if has_repeated {
        issues.push("Repeated tokens found - possible collision risk");
    }
    if unique_ratio < 0.95 {
        issues.push("High duplicate rate suggests weak randomness");
    }

    if issues.is_empty() {
        return "Token generation appears to be cryptographically secure with good randomness."
            .to_string();
    }
    format!(
        "Security concerns: {}. Consider using a cryptographically secure random number generator.",
        issues.join("; ")
    )
}

/// Full analysis over a token sample set
pub fn analyze_tokens(tokens: &[String]) -> TokenStatistics {
    if tokens.is_empty() {
        return TokenStatistics {
            total_samples: 0,
            unique_samples: 0,
            min_length: 0,
            max_length: 0,
            avg_length: 0.0,
            character_set: Vec::new(),
            character_frequencies: Vec::new(),
            entropy: EntropyReport {
                entropy_bits: 0.0,
                max_entropy: 0.0,
                efficiency: 0.0,
                rating: "N/A".to_string(),
            },
            patterns: PatternReport {
                has_sequential: false,
                has_repeated: false,
                common_prefixes: Vec::new(),
                common_suffixes: Vec::new(),
            },
            recommendation: "No tokens provided for analysis.".to_string(),
        };
    }

    let total_samples = tokens.len() as u64;
    let unique_samples = tokens.iter().collect::<HashSet<_>>().len() as u64;
    let lengths: Vec<usize> = tokens.iter().map(|t| t.chars().count()).collect();
    let min_length = lengths.iter().copied().min().unwrap_or(0);
    let max_length = lengths.iter().copied().max().unwrap_or(0);
    let avg_length = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;

    // Character statistics over the concatenation.
    let mut char_counts: HashMap<char, u64> = HashMap::new();
    let mut total_chars = 0u64;
    for token in tokens {
        for c in token.chars() {
            *char_counts.entry(c).or_insert(0) += 1;
            total_chars += 1;
        }
    }
    let character_set: Vec<String> = char_counts
        .keys()
        .copied()
        .collect::<BTreeSet<char>>()
        .into_iter()
        .map(display_char)
        .collect();

    let mut frequencies: Vec<(char, u64)> = char_counts.iter().map(|(&c, &n)| (c, n)).collect();
    frequencies.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let character_frequencies: Vec<CharFrequency> = frequencies
        .into_iter()
        .take(20)
        .map(|(c, count)| CharFrequency {
            character: display_char(c),
            count,
            percentage: round4(count as f64 / total_chars as f64 * 100.0),
        })
        .collect();

    // Mean per-token entropy against the charset ceiling.
    let entropy_bits =
        tokens.iter().map(|t| shannon_entropy(t)).sum::<f64>() / tokens.len() as f64;
    let charset_size = char_counts.len();
    let max_entropy = if charset_size > 1 {
        (charset_size as f64).log2()
    } else {
        0.0
    };
    let efficiency = if max_entropy > 0.0 {
        entropy_bits / max_entropy
    } else {
        0.0
    };
    let entropy = EntropyReport {
        entropy_bits: round4(entropy_bits),
        max_entropy: round4(max_entropy),
        efficiency: round4(efficiency),
        rating: entropy_rating(efficiency).to_string(),
    };

    let has_sequential = has_sequential_pattern(tokens);
    let has_repeated = has_repeated_pattern(tokens);
    let patterns = PatternReport {
        has_sequential,
        has_repeated,
        common_prefixes: common_affixes(tokens, AffixEnd::Prefix),
        common_suffixes: common_affixes(tokens, AffixEnd::Suffix),
    };

    let unique_ratio = unique_samples as f64 / total_samples as f64;
    let recommendation = recommendation(efficiency, has_sequential, has_repeated, unique_ratio);

    TokenStatistics {
        total_samples,
        unique_samples,
        min_length,
        max_length,
        avg_length: round2(avg_length),
        character_set,
        character_frequencies,
        entropy,
        patterns,
        recommendation,
    }
}

fn display_char(c: char) -> String {
    if c.is_control() || !c.is_ascii() && c.is_whitespace() {
        format!("\\x{:02x}", c as u32)
    } else {
        c.to_string()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn entropy_of_uniform_string_is_log2_alphabet() {
        // Four distinct characters, equal counts: exactly 2 bits.
        let entropy = shannon_entropy("abcdabcd");
        assert!((entropy - 2.0).abs() < 1e-9);
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
    }

    #[test]
    fn random_tokens_land_near_theoretical_entropy() {
        // Uniformly random 32-char tokens over a 62-char alphabet, 1000
        // samples: entropy measured across the pooled sample sits within 5%
        // of log2(62) ≈ 5.954 bits.
        const ALPHABET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::rng();
        let tokens: Vec<String> = (0..1000)
            .map(|_| {
                (0..32)
                    .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                    .collect()
            })
            .collect();

        let expected = 62f64.log2();
        let pooled = shannon_entropy(&tokens.concat());
        assert!(
            (pooled - expected).abs() / expected < 0.05,
            "pooled entropy {pooled} not within 5% of {expected}"
        );

        // The per-token mean is bounded by log2(token length) but still
        // rates at least Good against the charset ceiling.
        let stats = analyze_tokens(&tokens);
        assert_eq!(stats.total_samples, 1000);
        assert_eq!(stats.unique_samples, 1000);
        assert!(stats.entropy.efficiency >= 0.7, "efficiency {}", stats.entropy.efficiency);
        assert!(!stats.patterns.has_sequential);
        assert!(!stats.patterns.has_repeated);
    }

    #[test]
    fn sequential_integers_are_detected() {
        let tokens: Vec<String> = (100..120).map(|i| i.to_string()).collect();
        assert!(has_sequential_pattern(&tokens));

        let stepped: Vec<String> = (0..10).map(|i| (i * 5).to_string()).collect();
        assert!(has_sequential_pattern(&stepped));

        let random = vec!["91".to_string(), "14".to_string(), "77".to_string(), "3".to_string()];
        assert!(!has_sequential_pattern(&random));
    }

    #[test]
    fn sequential_letters_are_detected() {
        let tokens: Vec<String> = ('a'..='j').map(|c| c.to_string()).collect();
        assert!(has_sequential_pattern(&tokens));
    }

    #[test]
    fn repeated_tokens_are_detected() {
        let mut tokens: Vec<String> = (0..8).map(|i| format!("tok{i}")).collect();
        tokens.push("tok0".to_string());
        tokens.push("tok0".to_string());
        // 8 unique out of 10 => below the 0.9 ratio.
        assert!(has_repeated_pattern(&tokens));

        let distinct: Vec<String> = (0..10).map(|i| format!("tok{i}")).collect();
        assert!(!has_repeated_pattern(&distinct));
    }

    #[test]
    fn common_prefixes_rank_longest_first() {
        let tokens: Vec<String> = (0..10).map(|i| format!("sess_{i:04x}")).collect();
        let prefixes = common_affixes(&tokens, AffixEnd::Prefix);
        assert_eq!(prefixes.first().map(String::as_str), Some("sess_"));
        assert!(prefixes.len() <= 5);
        assert!(prefixes.iter().all(|p| p.len() >= 2 && p.len() <= 5));
    }

    #[test]
    fn suffix_mining_works() {
        let tokens: Vec<String> = (0..10).map(|i| format!("{i:06}_end")).collect();
        let suffixes = common_affixes(&tokens, AffixEnd::Suffix);
        assert!(suffixes.iter().any(|s| s == "_end"));
    }

    #[test]
    fn recommendation_reflects_findings() {
        let weak: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        let stats = analyze_tokens(&weak);
        assert!(stats.recommendation.contains("Security concerns"));
        assert!(stats.recommendation.contains("Sequential"));

        let empty = analyze_tokens(&[]);
        assert_eq!(empty.recommendation, "No tokens provided for analysis.");
        assert_eq!(empty.entropy.rating, "N/A");
    }

    #[test]
    fn frequencies_are_capped_at_twenty() {
        let tokens = vec!["abcdefghijklmnopqrstuvwxyz0123456789".to_string()];
        let stats = analyze_tokens(&tokens);
        assert_eq!(stats.character_frequencies.len(), 20);
        assert_eq!(stats.character_set.len(), 36);
    }
}
