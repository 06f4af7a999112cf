//! Fallback chain execution against a live page

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::generator::css_path_variants;
use crate::page::{PageSession, deadline_after, wait_for};
use crate::types::{
    AttemptOutcome, ElementSnapshot, LocatorCandidate, LocatorStrategy, RankedLocatorSet,
    ResolutionAttempt, ResolutionOutcome, ResolutionResult, Selector,
};

/// Tries ranked candidates in order until one matches exactly one element
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    pub poll_interval: Duration,
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl FallbackResolver {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Run the chain.
    ///
    /// Each candidate gets an equal share of what is left of `timeout`, and
    /// at least one probe. The first candidate with exactly one match wins and
    /// nothing below it is queried. Scores are never changed here.
    pub async fn resolve<P: PageSession + ?Sized>(
        &self,
        page: &P,
        set: &RankedLocatorSet,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        let started = Instant::now();
        let deadline = deadline_after(timeout);
        let mut attempts = Vec::with_capacity(set.len());
        info!(
            "Resolving {} candidates within {}ms",
            set.len(),
            timeout.as_millis()
        );

        for (index, candidate) in set.iter().enumerate() {
            if cancel.is_cancelled() {
                return finish(ResolutionOutcome::Cancelled, None, 0, attempts, started);
            }

            let remaining_candidates = (set.len() - index) as u32;
            let slice = deadline.saturating_duration_since(Instant::now()) / remaining_candidates;

            let outcome = match self.attempt(page, candidate, slice, cancel).await {
                Ok(outcome) => outcome,
                Err(LocatorError::Cancelled) => {
                    return finish(ResolutionOutcome::Cancelled, None, 0, attempts, started);
                }
                Err(e) => AttemptOutcome::Failed {
                    error: e.to_string(),
                },
            };
            debug!(
                "Candidate {} [{}, score {}]: {}",
                candidate.selector, candidate.strategy, candidate.score, outcome
            );

            let matched = outcome == AttemptOutcome::Matched;
            attempts.push(ResolutionAttempt {
                strategy: candidate.strategy,
                expression: candidate.expression().to_string(),
                score: candidate.score,
                outcome,
            });

            if matched {
                info!("Resolved with {} ({})", candidate.selector, candidate.strategy);
                return finish(
                    ResolutionOutcome::Resolved { index },
                    Some(candidate.clone()),
                    1,
                    attempts,
                    started,
                );
            }
        }

        warn!("All {} candidates failed", attempts.len());
        finish(ResolutionOutcome::Exhausted, None, 0, attempts, started)
    }

    async fn attempt<P: PageSession + ?Sized>(
        &self,
        page: &P,
        candidate: &LocatorCandidate,
        slice: Duration,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, LocatorError> {
        let selector = &candidate.selector;
        let count = wait_for(slice, self.poll_interval, cancel, move || async move {
            let count = page.count(selector).await?;
            Ok((count > 0).then_some(count))
        })
        .await?;

        Ok(match count {
            None => AttemptOutcome::NoMatch,
            Some(1) => AttemptOutcome::Matched,
            Some(count) => AttemptOutcome::Ambiguous { count },
        })
    }
}

/// Swap the CSS-path candidate for the shortest chain that is unique on the
/// live page. Keeps the generated chain when no shorter one is.
pub async fn refine_css_path<P: PageSession + ?Sized>(
    page: &P,
    snapshot: &Arc<ElementSnapshot>,
    candidates: &mut [LocatorCandidate],
) {
    let Some(candidate) = candidates
        .iter_mut()
        .find(|c| c.strategy == LocatorStrategy::CssPath)
    else {
        return;
    };
    for variant in css_path_variants(snapshot) {
        if variant == candidate.selector.expression {
            return;
        }
        let selector = Selector::css(variant);
        match page.count(&selector).await {
            Ok(1) => {
                debug!("Shortest unique CSS path: {}", selector.expression);
                candidate.selector = selector;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("CSS path probe failed for {}: {}", selector, e);
                return;
            }
        }
    }
}

/// Narrow the CSS path, then record how many elements each candidate matches
/// on the live page. Candidates whose query fails keep an unknown count.
pub async fn check_live<P: PageSession + ?Sized>(
    page: &P,
    snapshot: &Arc<ElementSnapshot>,
    candidates: &mut [LocatorCandidate],
) {
    refine_css_path(page, snapshot, candidates).await;
    for candidate in candidates.iter_mut() {
        match page.count(&candidate.selector).await {
            Ok(count) => {
                if count != 1 {
                    debug!("{} matches {} elements", candidate.selector, count);
                }
                candidate.match_count = Some(count);
            }
            Err(e) => debug!("Live check failed for {}: {}", candidate.selector, e),
        }
    }
}

fn finish(
    outcome: ResolutionOutcome,
    winner: Option<LocatorCandidate>,
    match_count: usize,
    attempts: Vec<ResolutionAttempt>,
    started: Instant,
) -> ResolutionResult {
    ResolutionResult {
        outcome,
        winner,
        match_count,
        attempts,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
