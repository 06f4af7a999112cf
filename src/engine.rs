//! The six engine operations, wired from configuration

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{FormFailure, LocatorError, LocatorResult};
use crate::extractor::ElementExtractor;
use crate::form::{FormFieldMapper, FormMap};
use crate::generator::{CandidateGenerator, infer_signal, infer_strategy};
use crate::page::{PageSession, deadline_after, wait_for};
use crate::resolver::{FallbackResolver, check_live};
use crate::scorer::RobustnessScorer;
use crate::session::{
    FieldTarget, LoginRequest, Session, SuccessIndicator, click_target, fill_field,
    wait_for_success,
};
use crate::types::{
    ElementSnapshot, LocatorCandidate, LocatorStrategy, RankedLocatorSet, ResolutionOutcome,
    ResolutionResult, Selector, Target,
};

/// Wait, login and cancellation settings shared by the page operations
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Bounded wait for the target; the configured default when `None`
    pub wait_timeout: Option<Duration>,
    /// Log in first unless the session already covers the login URL. The
    /// page the session was on is opened again afterwards.
    pub need_login: bool,
    pub login: Option<LoginRequest>,
    pub cancel: CancellationToken,
}

impl PageOptions {
    pub fn with_wait(wait_timeout: Option<Duration>, cancel: &CancellationToken) -> Self {
        Self {
            wait_timeout,
            cancel: cancel.clone(),
            ..Self::default()
        }
    }

    fn login_request(&self) -> Option<&LoginRequest> {
        self.login.as_ref().filter(|_| self.need_login)
    }
}

/// Captured element plus its ranked locators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorReport {
    pub target: Target,
    pub snapshot: Arc<ElementSnapshot>,
    pub locators: RankedLocatorSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    pub expression: Selector,
    pub is_robust: bool,
    pub score: u8,
    pub strategy: LocatorStrategy,
    pub match_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// One value to enter into a form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInput {
    /// A detected field key (`email`, `name_2`) or a locator expression
    pub field: String,
    pub value: String,
}

impl FieldInput {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Entry point for callers: extraction, generation, scoring, resolution and
/// form automation behind one configured value
#[derive(Debug, Clone)]
pub struct LocatorEngine {
    config: EngineConfig,
    extractor: ElementExtractor,
    generator: CandidateGenerator,
    scorer: RobustnessScorer,
    resolver: FallbackResolver,
    mapper: FormFieldMapper,
}

impl Default for LocatorEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl LocatorEngine {
    pub fn new(config: EngineConfig) -> Self {
        let poll = config.poll_interval();
        let generator = CandidateGenerator::new(config.text_length_limit);
        let scorer = RobustnessScorer::from_config(&config);
        Self {
            extractor: ElementExtractor::new(config.min_description_confidence, poll),
            mapper: FormFieldMapper::new(generator.clone(), scorer.clone(), poll),
            resolver: FallbackResolver::new(poll),
            generator,
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &RobustnessScorer {
        &self.scorer
    }

    fn wait(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.config.default_wait())
    }

    /// Generate and score candidates for an already captured element
    pub fn candidates_for(&self, snapshot: &Arc<ElementSnapshot>) -> RankedLocatorSet {
        self.scorer
            .rank(self.generator.generate(snapshot), snapshot)
    }

    async fn ranked_for<P: PageSession + ?Sized>(
        &self,
        page: &P,
        snapshot: &Arc<ElementSnapshot>,
    ) -> RankedLocatorSet {
        let mut candidates = self.generator.generate(snapshot);
        check_live(page, snapshot, &mut candidates).await;
        self.scorer.rank(candidates, snapshot)
    }

    /// Log in when asked to and not yet authenticated for the login site,
    /// then go back to the page the session was on
    async fn login_first<P: PageSession>(
        &self,
        session: &mut Session<P>,
        options: &PageOptions,
    ) -> LocatorResult<()> {
        let Some(request) = options
            .login_request()
            .filter(|r| !session.is_authenticated_for(&r.login_url))
        else {
            return Ok(());
        };

        let origin = session.page().current_url().await?;
        self.authenticate(session, request, &options.cancel).await?;

        let page = session.page();
        let landed = page.current_url().await?;
        if is_blank(&origin) || same_url(&landed, &origin) {
            return Ok(());
        }
        info!("Returning to {} after login", origin);
        page.goto(&origin).await
    }

    /// Locate `target` and return every locator for it, best first
    pub async fn find_locator<P: PageSession>(
        &self,
        session: &mut Session<P>,
        target: &Target,
        options: PageOptions,
    ) -> LocatorResult<LocatorReport> {
        let timeout = self.wait(options.wait_timeout);
        self.login_first(session, &options).await?;

        let page = session.page();
        let snapshot = self
            .extractor
            .extract(page, target, timeout, &options.cancel)
            .await?;
        let locators = self.ranked_for(page, &snapshot).await;
        info!(
            "Found {} locators for {} (best score {})",
            locators.len(),
            target,
            locators.top_score()
        );
        Ok(LocatorReport {
            target: target.clone(),
            snapshot,
            locators,
        })
    }

    /// Ranked locators for the element a CSS selector currently matches
    pub async fn find_dynamic_locators<P: PageSession>(
        &self,
        session: &Session<P>,
        css_selector: &str,
        wait_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LocatorResult<RankedLocatorSet> {
        let target = Target::Css(css_selector.to_string());
        let page = session.page();
        let snapshot = self
            .extractor
            .extract(page, &target, self.wait(wait_timeout), cancel)
            .await?;
        Ok(self.ranked_for(page, &snapshot).await)
    }

    /// Static score of a caller-supplied expression against the first element
    /// it matches, penalised when it matches several
    pub async fn evaluate_robustness<P: PageSession>(
        &self,
        session: &Session<P>,
        expression: &str,
        wait_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LocatorResult<RobustnessReport> {
        let selector = Selector::parse(expression)?;
        let page = session.page();
        let query = &selector;
        let snapshots = wait_for(
            self.wait(wait_timeout),
            self.config.poll_interval(),
            cancel,
            move || async move {
                let found = page.snapshots(query).await?;
                Ok((!found.is_empty()).then_some(found))
            },
        )
        .await?
        .ok_or_else(|| LocatorError::NotFound(selector.to_string()))?;

        let strategy = infer_strategy(&selector);
        let signal = infer_signal(&selector, strategy);
        let candidate = LocatorCandidate::detached(strategy, selector.clone(), signal);
        let mut score = i32::from(self.scorer.score(&candidate, &snapshots[0]));
        if snapshots.len() > 1 {
            score -= self.config.ambiguity_penalty;
        }
        let score = score.clamp(0, 100) as u8;

        let set = RankedLocatorSet::single(candidate.with_score(score));
        let mut suggestions = self.scorer.suggestions(&set, &snapshots[0]);
        if snapshots.len() > 1 {
            suggestions.insert(
                0,
                format!(
                    "Matches {} elements; narrow it to a single element",
                    snapshots.len()
                ),
            );
        }
        if !self.scorer.is_robust(score) {
            let best = self.candidates_for(&Arc::new(snapshots[0].clone()));
            if let Some(better) = best.best().filter(|b| b.score > score) {
                suggestions.push(format!(
                    "Consider {} ({}, score {})",
                    better.selector, better.strategy, better.score
                ));
            }
        }

        Ok(RobustnessReport {
            expression: selector,
            is_robust: self.scorer.is_robust(score),
            score,
            strategy,
            match_count: snapshots.len(),
            suggestions,
        })
    }

    /// Map the first form on the page, or the controls inside `scope`
    pub async fn detect_form<P: PageSession>(
        &self,
        session: &mut Session<P>,
        scope: Option<&Selector>,
        options: PageOptions,
    ) -> LocatorResult<FormMap> {
        self.login_first(session, &options).await?;
        self.mapper
            .map_form(
                session.page(),
                scope,
                self.wait(options.wait_timeout),
                &options.cancel,
            )
            .await
    }

    /// Fill fields in order, optionally click submit and wait for success.
    ///
    /// Fields name a detected key or give a locator expression. `submit`
    /// works the same way; `Some("")` uses the detected submit control and
    /// `None` skips submission.
    pub async fn fill_form<P: PageSession>(
        &self,
        session: &mut Session<P>,
        fields: &[FieldInput],
        submit: Option<&str>,
        success: Option<&SuccessIndicator>,
        options: PageOptions,
    ) -> LocatorResult<()> {
        self.login_first(session, &options).await?;
        let timeout = self.wait(options.wait_timeout);
        let cancel = &options.cancel;
        let page = session.page();
        let form = match self.mapper.map_form(page, None, timeout, cancel).await {
            Ok(form) => Some(form),
            Err(LocatorError::Cancelled) => return Err(LocatorError::Cancelled),
            Err(e) => {
                debug!("No form detected: {}", e);
                None
            }
        };

        for input in fields {
            let target = field_target(form.as_ref(), &input.field).map_err(|e| {
                LocatorError::FormFailed(FormFailure::Fill {
                    field: input.field.clone(),
                    message: e.to_string(),
                })
            })?;
            fill_field(page, &self.resolver, target, &input.value, timeout, cancel)
                .await
                .map_err(|e| match e {
                    LocatorError::Cancelled => e,
                    other => LocatorError::FormFailed(FormFailure::Fill {
                        field: input.field.clone(),
                        message: other.to_string(),
                    }),
                })?;
            debug!("Filled {}", input.field);
        }

        let Some(submit) = submit else {
            info!("Filled {} fields", fields.len());
            return Ok(());
        };
        let submit_key = if submit.trim().is_empty() { "submit" } else { submit };
        let target = field_target(form.as_ref(), submit_key).map_err(|e| {
            LocatorError::FormFailed(FormFailure::Submit {
                message: e.to_string(),
            })
        })?;

        let before = page.current_url().await?;
        click_target(page, &self.resolver, target, timeout, cancel)
            .await
            .map_err(|e| match e {
                LocatorError::Cancelled => e,
                other => LocatorError::FormFailed(FormFailure::Submit {
                    message: other.to_string(),
                }),
            })?;

        if let Some(indicator) = success {
            let observed = wait_for_success(
                page,
                Some(indicator),
                &before,
                timeout,
                self.config.poll_interval(),
                cancel,
            )
            .await?;
            if !observed {
                warn!("Form submitted but success indicator not observed");
                return Err(LocatorError::FormFailed(FormFailure::SuccessNotObserved {
                    message: format!("{:?} within {}ms", indicator, timeout.as_millis()),
                }));
            }
        }
        info!("Filled {} fields and submitted", fields.len());
        Ok(())
    }

    /// Log the session in
    pub async fn authenticate<P: PageSession>(
        &self,
        session: &mut Session<P>,
        request: &LoginRequest,
        cancel: &CancellationToken,
    ) -> LocatorResult<()> {
        session
            .login(request, &self.resolver, &self.mapper, cancel)
            .await
    }

    /// Run the fallback chain for a ranked set
    pub async fn resolve<P: PageSession>(
        &self,
        session: &Session<P>,
        set: &RankedLocatorSet,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        self.resolver
            .resolve(session.page(), set, timeout, cancel)
            .await
    }

    /// Resolve, and when every candidate fails, capture `target` again and
    /// resolve once more with freshly generated candidates.
    ///
    /// Both rounds and the capture in between share one `timeout`; once it
    /// has run out each step still gets a single poll.
    pub async fn resolve_with_healing<P: PageSession>(
        &self,
        session: &Session<P>,
        target: &Target,
        set: &RankedLocatorSet,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<ResolutionResult> {
        let deadline = deadline_after(timeout);
        let first = self.resolve(session, set, timeout, cancel).await;
        if first.outcome != ResolutionOutcome::Exhausted {
            return Ok(first);
        }

        warn!("Fallback chain exhausted for {}; regenerating", target);
        let page = session.page();
        let remaining = || deadline.saturating_duration_since(Instant::now());
        let snapshot = self
            .extractor
            .extract(page, target, remaining(), cancel)
            .await?;
        let fresh = self.ranked_for(page, &snapshot).await;
        let mut second = self.resolve(session, &fresh, remaining(), cancel).await;

        let mut attempts = first.attempts;
        attempts.append(&mut second.attempts);
        second.attempts = attempts;
        second.elapsed_ms += first.elapsed_ms;
        Ok(second)
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// A fresh browser tab that was never pointed anywhere
fn is_blank(url: &str) -> bool {
    url.is_empty() || url.starts_with("about:") || url.starts_with("data:")
}

fn field_target(form: Option<&FormMap>, field: &str) -> LocatorResult<FieldTarget> {
    if let Some(descriptor) = form.and_then(|f| f.get(field)) {
        return Ok(FieldTarget::Ranked(descriptor.locators.clone()));
    }
    Selector::parse(field).map(FieldTarget::Selector)
}
