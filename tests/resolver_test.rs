// Fallback chain behaviour against an in-memory page

mod common;

use common::{FakePage, under_body};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use locprobe::{
    AttemptOutcome, ElementSnapshot, FallbackResolver, LocatorCandidate, LocatorStrategy,
    RankedLocatorSet, ResolutionOutcome, Selector,
};

fn candidate(strategy: LocatorStrategy, selector: Selector, score: u8) -> LocatorCandidate {
    LocatorCandidate::detached(strategy, selector, None).with_score(score)
}

fn chain() -> RankedLocatorSet {
    RankedLocatorSet::from_scored(vec![
        candidate(LocatorStrategy::StableId, Selector::css("#save"), 100),
        candidate(
            LocatorStrategy::AccessibilityAttribute,
            Selector::css("button[aria-label=\"Save\"]"),
            95,
        ),
        candidate(
            LocatorStrategy::XPath,
            Selector::xpath("/html[1]/body[1]/button[1]"),
            30,
        ),
    ])
}

fn save_button() -> ElementSnapshot {
    under_body(
        ElementSnapshot::new("button")
            .with_attribute("id", "save")
            .with_attribute("aria-label", "Save"),
        vec![],
    )
}

#[tokio::test(start_paused = true)]
async fn test_top_candidate_wins_without_trying_others() {
    let page = FakePage::new("https://example.com").element(save_button(), &[]);
    let resolver = FallbackResolver::default();

    let result = resolver
        .resolve(&page, &chain(), Duration::from_secs(2), &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 0 });
    assert_eq!(result.winner.as_ref().unwrap().expression(), "#save");
    assert_eq!(result.match_count, 1);
    assert_eq!(result.attempted_expressions(), vec!["#save"]);
    assert_eq!(page.queries(), vec![Selector::css("#save")]);
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_when_top_candidate_matches_nothing() {
    // id renamed; aria-label survived
    let renamed = under_body(
        ElementSnapshot::new("button")
            .with_attribute("id", "save-v2")
            .with_attribute("aria-label", "Save"),
        vec![],
    );
    let page = FakePage::new("https://example.com").element(renamed, &[]);
    let resolver = FallbackResolver::default();

    let result = resolver
        .resolve(&page, &chain(), Duration::from_secs(3), &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 1 });
    assert_eq!(
        result.winner.unwrap().expression(),
        "button[aria-label=\"Save\"]"
    );
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::NoMatch);
    assert_eq!(result.attempts[1].outcome, AttemptOutcome::Matched);
    assert_eq!(result.attempts.len(), 2);
    // the first candidate used its whole slice
    assert!(result.elapsed_ms >= 1000);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_candidate_is_skipped() {
    let first = under_body(
        ElementSnapshot::new("button").with_attribute("aria-label", "Save"),
        vec![],
    );
    let second = under_body(
        ElementSnapshot::new("button")
            .with_attribute("aria-label", "Save")
            .nth(2),
        vec![],
    );
    let page = FakePage::new("https://example.com")
        .element(first, &[])
        .element(second, &[]);
    let set = RankedLocatorSet::from_scored(vec![
        candidate(
            LocatorStrategy::AccessibilityAttribute,
            Selector::css("button[aria-label=\"Save\"]"),
            95,
        ),
        candidate(
            LocatorStrategy::XPath,
            Selector::xpath("/html[1]/body[1]/button[2]"),
            30,
        ),
    ]);

    let result = FallbackResolver::default()
        .resolve(&page, &set, Duration::from_secs(2), &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 1 });
    assert_eq!(
        result.attempts[0].outcome,
        AttemptOutcome::Ambiguous { count: 2 }
    );
    // ambiguity is detected on the first poll, no waiting
    assert!(result.elapsed_ms < 100);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_within_timeout_lists_every_attempt() {
    let page = FakePage::new("https://example.com");
    let started = tokio::time::Instant::now();

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::from_secs(2), &CancellationToken::new())
        .await;

    let elapsed = started.elapsed();
    assert_eq!(result.outcome, ResolutionOutcome::Exhausted);
    assert!(elapsed >= Duration::from_millis(1900), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2100), "{:?}", elapsed);
    assert_eq!(
        result.attempted_expressions(),
        vec!["#save", "button[aria-label=\"Save\"]", "/html[1]/body[1]/button[1]"]
    );
    let scores: Vec<u8> = result.attempts.iter().map(|a| a.score).collect();
    assert_eq!(scores, vec![100, 95, 30]);

    match result.into_winner() {
        Err(locprobe::LocatorError::Exhausted { attempts }) => assert_eq!(attempts.len(), 3),
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_late_element_within_slice() {
    let page = FakePage::new("https://example.com").element_after(
        save_button(),
        &[],
        Duration::from_millis(350),
    );

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::from_secs(3), &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 0 });
    // polled every 100ms until it appeared
    assert!(page.queries().len() >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_driver_error_is_recorded_and_skipped() {
    let page = FakePage::new("https://example.com")
        .element(save_button(), &[])
        .failing("#save");

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::from_secs(2), &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 1 });
    assert!(matches!(
        result.attempts[0].outcome,
        AttemptOutcome::Failed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_chain() {
    let page = FakePage::new("https://example.com");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::from_secs(30), &cancel)
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Cancelled);
    assert!(result.winner.is_none());
    assert!(result.elapsed_ms < 1000);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_attempts_nothing() {
    let page = FakePage::new("https://example.com").element(save_button(), &[]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::from_secs(2), &cancel)
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Cancelled);
    assert!(result.attempts.is_empty());
    assert!(page.queries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_resolves() {
    let page = FakePage::new("https://example.com").element(save_button(), &[]);

    let result = FallbackResolver::default()
        .resolve(&page, &chain(), Duration::MAX, &CancellationToken::new())
        .await;

    assert_eq!(result.outcome, ResolutionOutcome::Resolved { index: 0 });
    assert_eq!(result.winner.unwrap().expression(), "#save");
}
