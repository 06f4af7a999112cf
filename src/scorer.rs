//! Static robustness scoring

use crate::config::{EngineConfig, ScoringWeights};
use crate::generator::{TEST_ID_ATTRIBUTES, is_generated_id};
use crate::types::{ElementSnapshot, LocatorCandidate, LocatorStrategy, RankedLocatorSet};

/// Assigns 0-100 survivability scores from the shape of an expression and the
/// values it depends on. Never touches the page.
#[derive(Debug, Clone)]
pub struct RobustnessScorer {
    pub weights: ScoringWeights,
    pub verbose_text_threshold: usize,
    pub robust_threshold: u8,
}

impl Default for RobustnessScorer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RobustnessScorer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            weights: config.scoring.clone(),
            verbose_text_threshold: config.verbose_text_threshold,
            robust_threshold: config.robust_threshold,
        }
    }

    fn base(&self, strategy: LocatorStrategy) -> i32 {
        let w = &self.weights;
        match strategy {
            LocatorStrategy::StableId => w.stable_id,
            LocatorStrategy::AccessibilityAttribute => w.accessibility_attribute,
            LocatorStrategy::CssPath => w.css_path,
            LocatorStrategy::TextContent => w.text_content,
            LocatorStrategy::RelativePosition => w.relative_position,
            LocatorStrategy::XPath => w.xpath,
        }
    }

    /// Score one candidate. Same inputs, same score.
    pub fn score(&self, candidate: &LocatorCandidate, snapshot: &ElementSnapshot) -> u8 {
        let mut score = self.base(candidate.strategy);

        let digit_free = candidate
            .signal
            .as_deref()
            .is_some_and(|s| !s.is_empty() && !s.chars().any(|c| c.is_ascii_digit()));
        if digit_free {
            score += self.weights.no_digit_bonus;
        }

        if candidate.selector.chain_length() > self.weights.max_chain_length {
            score -= self.weights.deep_chain_penalty;
        }

        if candidate.strategy == LocatorStrategy::TextContent {
            let length = candidate
                .signal
                .as_deref()
                .unwrap_or(snapshot.text.as_str())
                .chars()
                .count();
            if length > self.verbose_text_threshold {
                score -= self.weights.verbose_text_penalty;
            }
        }

        score.clamp(0, 100) as u8
    }

    /// Score every candidate and sort into a ranked set with suggestions
    pub fn rank(
        &self,
        candidates: Vec<LocatorCandidate>,
        snapshot: &ElementSnapshot,
    ) -> RankedLocatorSet {
        let scored = candidates
            .into_iter()
            .map(|c| {
                let score = self.score(&c, snapshot);
                c.with_score(score)
            })
            .collect();
        let set = RankedLocatorSet::from_scored(scored);
        let suggestions = self.suggestions(&set, snapshot);
        set.with_suggestions(suggestions)
    }

    pub fn is_robust(&self, score: u8) -> bool {
        score >= self.robust_threshold
    }

    /// Advice for making the element easier to address. Empty when the best
    /// candidate is already robust.
    pub fn suggestions(&self, set: &RankedLocatorSet, snapshot: &ElementSnapshot) -> Vec<String> {
        if self.is_robust(set.top_score()) {
            return Vec::new();
        }

        let mut suggestions = Vec::new();
        let has = |strategy| set.iter().any(|c| c.strategy == strategy);

        let rejected: Vec<String> = std::iter::once("id")
            .chain(TEST_ID_ATTRIBUTES)
            .filter_map(|attr| {
                snapshot
                    .attr(attr)
                    .filter(|v| is_generated_id(v))
                    .map(|v| format!("{}=\"{}\"", attr, v))
            })
            .collect();
        if !rejected.is_empty() {
            suggestions.push(format!(
                "Generated-looking identifiers were ignored ({}); replace them with stable values",
                rejected.join(", ")
            ));
        }

        if !has(LocatorStrategy::StableId) {
            suggestions.push(format!(
                "Add a stable test id, e.g. data-testid, to the <{}> element",
                snapshot.tag
            ));
        }
        if !has(LocatorStrategy::AccessibilityAttribute) {
            suggestions.push("Add an aria-label describing the element's purpose".to_string());
        }
        if set.iter().any(|c| {
            c.strategy != LocatorStrategy::XPath
                && c.selector.chain_length() > self.weights.max_chain_length
        }) {
            suggestions.push(
                "Shorten deep selector chains by anchoring on a nearby element with a stable id"
                    .to_string(),
            );
        }
        if set.best().map(|c| c.strategy) == Some(LocatorStrategy::XPath) {
            suggestions.push(
                "Avoid positional XPath; it breaks whenever surrounding markup changes".to_string(),
            );
        }
        suggestions
    }
}

#[cfg(test)]
#[path = "scorer_test.rs"]
mod scorer_test;
