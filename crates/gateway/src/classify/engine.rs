//! The scoring engine behind every channel processor.
//!
//! Rule sets are compiled once at construction from a fixed, enumerated
//! set per channel kind: keyword lists, named regex patterns, and
//! structural signals (punctuation excess, caps ratio, repeated runs,
//! suspicious TLDs, link shorteners). Every triggered signal contributes
//! a fixed increment to its dimension (clamped at 1.0) and one
//! human-readable indicator string, in trigger order.

use regex::Regex;

use aegis_domain::{ChannelKind, Classification};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct KeywordRule {
    dimension: &'static str,
    keyword: &'static str,
    weight: f64,
}

struct PatternRule {
    name: &'static str,
    dimension: &'static str,
    weight: f64,
    regex: Regex,
}

const SPAM_KEYWORDS: &[(&str, f64)] = &[
    ("free money", 0.3),
    ("win big", 0.25),
    ("prize", 0.25),
    ("winner", 0.2),
    ("limited time", 0.25),
    ("act now", 0.25),
    ("cash bonus", 0.25),
    ("click", 0.2),
    ("no cost", 0.2),
];

const PHISHING_KEYWORDS: &[(&str, f64)] = &[
    ("verify your account", 0.3),
    ("confirm your identity", 0.3),
    ("click here", 0.25),
    ("account suspended", 0.25),
    ("password expired", 0.25),
    ("unusual activity", 0.25),
];

const SOCIAL_ENG_KEYWORDS: &[(&str, f64)] = &[
    ("urgent", 0.3),
    ("security alert", 0.3),
    ("wire transfer", 0.3),
    ("gift card", 0.3),
    ("verify", 0.25),
    ("immediately", 0.2),
    ("account", 0.2),
];

const BOT_KEYWORDS: &[(&str, f64)] = &[
    ("airdrop", 0.3),
    ("crypto giveaway", 0.3),
    ("dm me", 0.25),
    ("join my server", 0.25),
];

/// Increment per identical message already in the source's recent ring.
pub const FLOOD_REPEAT_WEIGHT: f64 = 0.15;

/// Malware boost for double-extension attachments (`.pdf.exe`).
pub const DOUBLE_EXTENSION_WEIGHT: f64 = 0.5;

/// Phishing boost per failed authentication header (SPF/DKIM/DMARC).
pub const AUTH_FAIL_WEIGHT: f64 = 0.2;

fn pattern_rules() -> Vec<PatternRule> {
    let shortener = r"(?i)\b(?:bit\.ly|tinyurl\.com|goo\.gl|t\.co|is\.gd|ow\.ly)/";
    let suspicious_tld = r"(?i)https?://[^\s/]+\.(?:tk|ml|ga|cf|gq|xyz)\b";
    vec![
        PatternRule {
            name: "url_shortener",
            dimension: "phishing",
            weight: 0.25,
            regex: Regex::new(shortener).expect("static regex"),
        },
        PatternRule {
            name: "url_shortener",
            dimension: "spam",
            weight: 0.15,
            regex: Regex::new(shortener).expect("static regex"),
        },
        PatternRule {
            name: "suspicious_tld",
            dimension: "phishing",
            weight: 0.2,
            regex: Regex::new(suspicious_tld).expect("static regex"),
        },
    ]
}

fn keyword_rules(dimensions: &[&'static str]) -> Vec<KeywordRule> {
    let mut rules = Vec::new();
    let mut push = |dimension: &'static str, set: &[(&'static str, f64)]| {
        for (keyword, weight) in set {
            rules.push(KeywordRule {
                dimension,
                keyword,
                weight: *weight,
            });
        }
    };
    for dimension in dimensions {
        match *dimension {
            "spam" => push("spam", SPAM_KEYWORDS),
            "phishing" => push("phishing", PHISHING_KEYWORDS),
            "social_eng" => push("social_eng", SOCIAL_ENG_KEYWORDS),
            "bot" => push("bot", BOT_KEYWORDS),
            // malware and flood have no keyword component; they are fed
            // by structural signals and processor-level boosts.
            _ => {}
        }
    }
    rules
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ClassifierEngine {
    dimensions: Vec<&'static str>,
    keywords: Vec<KeywordRule>,
    patterns: Vec<PatternRule>,
}

impl ClassifierEngine {
    /// Build the engine for one channel kind. The dimension set is fixed
    /// per kind; dimensions a kind never scores are simply absent.
    pub fn for_kind(kind: ChannelKind) -> Self {
        let dimensions: Vec<&'static str> = match kind {
            ChannelKind::Sms => vec!["spam", "phishing", "flood"],
            ChannelKind::Voice => vec!["social_eng", "bot", "spam"],
            ChannelKind::Irc => vec!["spam", "flood", "bot"],
            ChannelKind::Discord => vec!["spam", "flood", "social_eng", "bot"],
            ChannelKind::Email => vec!["spam", "phishing", "malware", "social_eng"],
        };
        let keywords = keyword_rules(&dimensions);
        let patterns = pattern_rules()
            .into_iter()
            .filter(|p| dimensions.contains(&p.dimension))
            .collect();
        Self {
            dimensions,
            keywords,
            patterns,
        }
    }

    pub fn dimensions(&self) -> &[&'static str] {
        &self.dimensions
    }

    fn has_dimension(&self, dimension: &str) -> bool {
        self.dimensions.contains(&dimension)
    }

    /// Score `text` against keyword, regex, and structural rules. The
    /// result is not finalized — processors may add channel-specific
    /// boosts before calling [`ClassifierEngine::complete`].
    pub fn classify_text(&self, text: &str) -> Classification {
        let mut c = Classification::benign(&self.dimensions);
        let lowered = text.to_lowercase();

        // 1. Keywords.
        for rule in &self.keywords {
            if lowered.contains(rule.keyword) {
                bump(
                    &mut c,
                    rule.dimension,
                    rule.weight,
                    format!("{} keyword: {}", rule.dimension, rule.keyword),
                );
            }
        }

        // 2. Named patterns.
        for rule in &self.patterns {
            if rule.regex.is_match(text) {
                bump(
                    &mut c,
                    rule.dimension,
                    rule.weight,
                    format!("pattern: {}", rule.name),
                );
            }
        }

        // 3. Structural signals.
        let exclamations = text.chars().filter(|c| *c == '!' || *c == '?').count();
        if exclamations >= 4 && self.has_dimension("spam") {
            bump(&mut c, "spam", 0.2, "excessive punctuation");
        }

        let alpha: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if alpha.len() >= 8 {
            let upper = alpha.iter().filter(|c| c.is_uppercase()).count();
            if upper as f64 / alpha.len() as f64 > 0.5 && self.has_dimension("spam") {
                bump(&mut c, "spam", 0.2, "high caps ratio");
            }
        }

        if let Some(run) = longest_repeat_run(text) {
            if run >= 10 {
                if self.has_dimension("flood") {
                    bump(&mut c, "flood", 0.3, format!("repeated character run ({run})"));
                }
                if self.has_dimension("spam") {
                    bump(&mut c, "spam", 0.1, "repeated character run");
                }
            }
        }

        let links = text.matches("http://").count() + text.matches("https://").count();
        if links >= 3 && self.has_dimension("bot") {
            bump(&mut c, "bot", 0.3, format!("link burst ({links} links)"));
        }

        c
    }

    /// Fold in flood repeats observed by the source tracker.
    pub fn apply_flood(&self, c: &mut Classification, repeats: usize) {
        if repeats > 0 && self.has_dimension("flood") {
            bump(
                c,
                "flood",
                repeats as f64 * FLOOD_REPEAT_WEIGHT,
                format!("message repeated {repeats}x by source"),
            );
        }
    }

    /// Attach recommendations and finalize confidence + threat level.
    pub fn complete(&self, mut c: Classification) -> Classification {
        for (dimension, threshold, action) in RECOMMENDATIONS {
            if c.score(dimension) >= *threshold {
                c.recommendations.push((*action).to_string());
            }
        }
        c.finalize()
    }
}

/// Fixed mapping from dimension thresholds to action strings.
const RECOMMENDATIONS: &[(&str, f64, &str)] = &[
    ("spam", 0.5, "filter sender"),
    ("phishing", 0.5, "quarantine message and verify sender out-of-band"),
    ("malware", 0.3, "block attachment and scan recipient host"),
    ("flood", 0.5, "rate-limit source"),
    ("bot", 0.5, "challenge sender"),
    ("social_eng", 0.4, "escalate to human review"),
];

/// Add `amount` to a dimension (clamped at 1.0) and record the indicator.
pub fn bump(c: &mut Classification, dimension: &str, amount: f64, indicator: impl Into<String>) {
    let slot = c.scores.entry(dimension.to_string()).or_insert(0.0);
    *slot = (*slot + amount).min(1.0);
    c.indicators.push(indicator.into());
}

fn longest_repeat_run(text: &str) -> Option<usize> {
    let mut best = 0usize;
    let mut current = 0usize;
    let mut previous: Option<char> = None;
    for ch in text.chars() {
        if Some(ch) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(ch);
        }
        best = best.max(current);
    }
    (best > 1).then_some(best)
}
