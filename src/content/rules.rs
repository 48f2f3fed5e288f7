//! Deterministic rule-based content analysis.
//!
//! Keyword rules for urgency and category, phrase patterns for action
//! items and word frequency for topics. Used whenever the content service
//! is disabled, slow or failing.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Category, ContentAnalysis, ContentAnalyzer, Urgency};
use crate::error::Result;

/// Action items shorter than this are treated as fragments.
const MIN_ACTION_ITEM_LEN: usize = 11;
const MAX_ACTION_ITEMS: usize = 5;

/// Weight of a category rule hit in the subject (body hits weigh 1).
const SUBJECT_HIT_WEIGHT: u32 = 3;
const UNSUBSCRIBE_BOOST: u32 = 2;
const SPAM_WIN_SCORE: u32 = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "re", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "fw", "fwd", "hi", "hello", "thanks", "regards",
];

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

fn high_urgency_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        compile_all(&[
            r"\b(urgent|asap|immediately|emergency|now)\b",
            r"\b(due today|due tomorrow)\b",
            r"\b(critical|crucial|vital)\b",
        ])
    })
}

fn medium_urgency_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        compile_all(&[
            r"\b(important|priority|attention)\b",
            r"\b(please respond|please reply|needs response)\b",
            r"\b(deadline|due this week|due soon)\b",
        ])
    })
}

fn category_patterns() -> &'static [(Category, Vec<Regex>)] {
    static RE: OnceLock<Vec<(Category, Vec<Regex>)>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            (
                Category::Newsletter,
                compile_all(&[
                    r"\b(newsletter|update|digest)\b",
                    r"unsubscribe",
                    r"\b(weekly|monthly|quarterly)\s+update",
                ]),
            ),
            (
                Category::Promotional,
                compile_all(&[
                    r"\b(offer|discount|sale|promo|marketing)\b",
                    r"unsubscribe",
                    r"\b(limited time|exclusive)\b",
                ]),
            ),
            (
                Category::Personal,
                compile_all(&[
                    r"\b(hey|hi|hello|greetings)\b",
                    r"\b(how are you|hope you|thinking of you)\b",
                    r"family|friend|personal",
                ]),
            ),
            (
                Category::Professional,
                compile_all(&[
                    r"\b(meeting|discussion|project|report|business|client|colleague)\b",
                    r"\b(regards|sincerely|best|team)\b",
                ]),
            ),
            (
                Category::Transactional,
                compile_all(&[
                    r"\b(order|invoice|receipt|payment|transaction|shipping|booking|confirmation)\b",
                    r"\b(confirm|confirmed)\b",
                ]),
            ),
            (
                Category::Spam,
                compile_all(&[
                    r"\b(viagra|cialis|pharmacy|loan|mortgage|refinance|degree|online degree)\b",
                    r"click here",
                    r"unsubscribe at",
                ]),
            ),
        ]
    })
}

/// Tie-break order among equally scored categories.
const CATEGORY_TIE_ORDER: &[Category] = &[
    Category::Transactional,
    Category::Professional,
    Category::Personal,
    Category::Newsletter,
    Category::Promotional,
];

fn action_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        compile_all(&[
            r"(?i)(?:please|kindly|can you|could you)[^.!?]*\?",
            r"(?i)(?:please|kindly|can you|could you)[^.!?]*(?:\.|$)",
            r"(?i)(?:need to|needs to|must|should)[^.!?]*(?:\.|$)",
            r"(?i)(?:don't forget to|remember to)[^.!?]*(?:\.|$)",
            r"(?i)action (?:needed|required|item)[^.!?]*(?:\.|$)",
            r"(?i)deadline[^.!?]*(?:\.|$)",
            r"(?i)by (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|next week|today|eod|eow)",
            r"(?i)due (?:date|by)[^.!?]*(?:\.|$)",
        ])
    })
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").unwrap())
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://\S+|\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b|\b(?:\+\d{1,2}\s?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
        )
        .unwrap()
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub fn analyze_urgency(subject: &str, body: &str) -> Urgency {
    let text = format!("{} {}", subject, body).to_lowercase();
    let high = high_urgency_patterns().iter().filter(|re| re.is_match(&text)).count();
    let medium = medium_urgency_patterns().iter().filter(|re| re.is_match(&text)).count();

    if high >= 2 || (high >= 1 && medium >= 1) {
        Urgency::High
    } else if medium >= 1 || high >= 1 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

pub fn categorize(subject: &str, body: &str) -> Category {
    let subject_lower = subject.to_lowercase();
    let text = format!("{} {}", subject, body).to_lowercase();
    let has_unsubscribe = text.contains("unsubscribe");

    let mut scores: HashMap<Category, u32> = HashMap::new();
    for (category, patterns) in category_patterns() {
        let mut score: u32 = patterns
            .iter()
            .map(|re| {
                if re.is_match(&subject_lower) {
                    SUBJECT_HIT_WEIGHT
                } else if re.is_match(&text) {
                    1
                } else {
                    0
                }
            })
            .sum();
        if category.is_bulk() && has_unsubscribe {
            score += UNSUBSCRIBE_BOOST;
        }
        scores.insert(*category, score);
    }

    let best = scores.values().copied().max().unwrap_or(0);
    if best == 0 {
        return Category::General;
    }
    if scores.get(&Category::Spam).copied().unwrap_or(0) >= SPAM_WIN_SCORE {
        return Category::Spam;
    }
    CATEGORY_TIE_ORDER
        .iter()
        .copied()
        .find(|c| scores.get(c) == Some(&best))
        .unwrap_or(Category::Spam)
}

pub fn extract_action_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for sentence in sentence_re().find_iter(text) {
        let sentence = sentence.as_str().trim();
        if sentence.is_empty() {
            continue;
        }
        for re in action_patterns() {
            for m in re.find_iter(sentence) {
                let action = m.as_str().trim();
                if action.len() < MIN_ACTION_ITEM_LEN {
                    continue;
                }
                let key = whitespace_re().replace_all(&action.to_lowercase(), " ").trim().to_string();
                if seen.insert(key) {
                    items.push(capitalize(action));
                }
            }
        }
    }

    items.truncate(MAX_ACTION_ITEMS);
    items
}

/// Most frequent meaningful words, ties broken by first appearance.
pub fn extract_topics(text: &str, count: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = noise_re().replace_all(&lowered, " ");

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in cleaned
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && t.chars().all(char::is_alphabetic))
        .filter(|t| !STOP_WORDS.contains(t))
        .enumerate()
    {
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(count)
        .map(|(word, _)| word.to_string())
        .collect()
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuleBasedAnalyzer {
    topic_count: usize,
}

impl Default for RuleBasedAnalyzer {
    fn default() -> Self {
        Self { topic_count: 3 }
    }
}

impl RuleBasedAnalyzer {
    pub fn new(topic_count: usize) -> Self {
        Self { topic_count }
    }

    /// Synchronous analysis; never fails.
    pub fn analyze_now(&self, subject: &str, body: &str) -> ContentAnalysis {
        let combined = format!("{} {}", subject, body);
        ContentAnalysis {
            topics: extract_topics(&combined, self.topic_count),
            action_items: extract_action_items(&combined),
            urgency: analyze_urgency(subject, body),
            category: categorize(subject, body),
            ..Default::default()
        }
    }

    /// Leading topic, capitalized.
    pub fn folder_name_now(&self, subject: &str, body: &str) -> Option<String> {
        extract_topics(&format!("{} {}", subject, body), 1)
            .first()
            .map(|t| capitalize(t))
    }
}

#[async_trait]
impl ContentAnalyzer for RuleBasedAnalyzer {
    fn name(&self) -> &str {
        "rules"
    }

    async fn analyze(&self, subject: &str, body: &str, _sender: &str) -> Result<ContentAnalysis> {
        Ok(self.analyze_now(subject, body))
    }

    async fn suggest_folder_name(
        &self,
        subject: &str,
        body: &str,
        _category: Category,
    ) -> Result<Option<String>> {
        Ok(self.folder_name_now(subject, body))
    }
}
