use super::*;
use crate::generator::CandidateGenerator;
use crate::types::{AncestorNode, Selector};
use std::sync::Arc;

fn detached(strategy: LocatorStrategy, selector: Selector, signal: Option<&str>) -> LocatorCandidate {
    LocatorCandidate::detached(strategy, selector, signal.map(str::to_string))
}

#[test]
fn test_stable_id_scores_at_least_90() {
    let scorer = RobustnessScorer::default();
    let snapshot = ElementSnapshot::new("button");
    for id in ["login", "submit2", "checkout-v3"] {
        let candidate = detached(
            LocatorStrategy::StableId,
            Selector::css(format!("#{}", id)),
            Some(id),
        );
        assert!(scorer.score(&candidate, &snapshot) >= 90, "{}", id);
    }
}

#[test]
fn test_base_scores_and_digit_bonus() {
    let scorer = RobustnessScorer::default();
    let snapshot = ElementSnapshot::new("button");

    let plain = detached(LocatorStrategy::StableId, Selector::css("#login"), Some("login"));
    assert_eq!(scorer.score(&plain, &snapshot), 100);

    let digits = detached(LocatorStrategy::StableId, Selector::css("#step2"), Some("step2"));
    assert_eq!(scorer.score(&digits, &snapshot), 95);

    let aria = detached(
        LocatorStrategy::AccessibilityAttribute,
        Selector::css("button[aria-label=\"Close\"]"),
        Some("Close"),
    );
    assert_eq!(scorer.score(&aria, &snapshot), 95);

    let xpath = detached(LocatorStrategy::XPath, Selector::xpath("//button[1]"), None);
    assert_eq!(scorer.score(&xpath, &snapshot), 30);
}

#[test]
fn test_deep_chain_penalty() {
    let scorer = RobustnessScorer::default();
    let snapshot = ElementSnapshot::new("button");

    let short = detached(LocatorStrategy::XPath, Selector::xpath("/html[1]/body[1]/div[1]/button[1]"), None);
    assert_eq!(scorer.score(&short, &snapshot), 30);

    let deep = detached(
        LocatorStrategy::XPath,
        Selector::xpath("/html[1]/body[1]/div[1]/div[2]/button[1]"),
        None,
    );
    assert_eq!(scorer.score(&deep, &snapshot), 15);
}

#[test]
fn test_verbose_text_penalty() {
    let scorer = RobustnessScorer::default();
    let text = "Click here to learn more about our pricing";
    let snapshot = ElementSnapshot::new("a").with_text(text);
    let candidate = detached(
        LocatorStrategy::TextContent,
        Selector::xpath(format!("//a[normalize-space(.)='{}']", text)),
        Some(text),
    );
    // 55 base + 10 no digits - 20 verbose
    assert_eq!(scorer.score(&candidate, &snapshot), 45);
}

#[test]
fn test_score_is_clamped() {
    let mut scorer = RobustnessScorer::default();
    scorer.weights.xpath = -50;
    let snapshot = ElementSnapshot::new("td");
    let candidate = detached(LocatorStrategy::XPath, Selector::xpath("//td[1]"), None);
    assert_eq!(scorer.score(&candidate, &snapshot), 0);
}

#[test]
fn test_scoring_is_idempotent() {
    let scorer = RobustnessScorer::default();
    let snapshot = Arc::new(
        ElementSnapshot::new("button")
            .with_attribute("aria-label", "Save")
            .with_text("Save")
            .with_ancestor(AncestorNode::new("html"))
            .with_ancestor(AncestorNode::new("body")),
    );
    let candidates = CandidateGenerator::default().generate(&snapshot);
    let first = scorer.rank(candidates.clone(), &snapshot);
    let second = scorer.rank(candidates, &snapshot);
    assert_eq!(first, second);
}

#[test]
fn test_rank_orders_submit_button_candidates() {
    let scorer = RobustnessScorer::default();
    let snapshot = Arc::new(
        ElementSnapshot::new("button")
            .with_attribute("id", "submit")
            .with_attribute("aria-label", "Submit order")
            .with_attribute("type", "submit")
            .with_text("Submit")
            .with_ancestor(AncestorNode::new("html"))
            .with_ancestor(AncestorNode::new("body"))
            .with_ancestor(AncestorNode::new("form")),
    );
    let set = scorer.rank(CandidateGenerator::default().generate(&snapshot), &snapshot);

    let best = set.best().unwrap();
    assert_eq!(best.strategy, LocatorStrategy::StableId);
    assert_eq!(best.expression(), "#submit");
    assert!(best.score >= 90);
    assert_eq!(set.candidates()[1].strategy, LocatorStrategy::AccessibilityAttribute);
    assert_eq!(set.candidates().last().unwrap().strategy, LocatorStrategy::XPath);
    assert!(set.suggestions.is_empty());
}

#[test]
fn test_text_only_link_ranks_text_above_xpath_and_suggests() {
    let scorer = RobustnessScorer::default();
    let snapshot = Arc::new(
        ElementSnapshot::new("a")
            .with_text("Forgot password?")
            .with_ancestor(AncestorNode::new("html"))
            .with_ancestor(AncestorNode::new("body"))
            .with_ancestor(AncestorNode::new("div").nth(2))
            .nth(3),
    );
    let set = scorer.rank(CandidateGenerator::default().generate(&snapshot), &snapshot);
    let strategies: Vec<LocatorStrategy> = set.iter().map(|c| c.strategy).collect();
    assert_eq!(
        strategies,
        vec![LocatorStrategy::TextContent, LocatorStrategy::XPath]
    );
    assert_eq!(set.top_score(), 65);
    assert!(!set.suggestions.is_empty());
    assert!(set.suggestions.iter().any(|s| s.contains("data-testid")));
}

#[test]
fn test_suggestions_name_rejected_ids() {
    let scorer = RobustnessScorer::default();
    let snapshot = Arc::new(ElementSnapshot::new("div").with_attribute("id", "ember1234"));
    let set = scorer.rank(CandidateGenerator::default().generate(&snapshot), &snapshot);
    assert!(set.suggestions.iter().any(|s| s.contains("id=\"ember1234\"")));
    assert!(set.suggestions.iter().any(|s| s.contains("positional XPath")));
}
