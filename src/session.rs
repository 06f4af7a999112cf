//! Page ownership and login state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{AuthStep, LocatorError, LocatorResult};
use crate::form::{FormFieldMapper, FormMap, SemanticField};
use crate::generator::infer_strategy;
use crate::page::{PageSession, wait_for};
use crate::resolver::FallbackResolver;
use crate::types::{LocatorCandidate, RankedLocatorSet, Selector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Explicit locators for the login form. Any left out are taken from the
/// detected form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginLocators {
    pub username: Option<Selector>,
    pub password: Option<Selector>,
    pub submit: Option<Selector>,
}

/// How a successful login or form submission is recognised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum SuccessIndicator {
    ElementPresent(Selector),
    UrlContains(String),
    TextPresent(String),
    /// The URL moved away from where the submission happened
    UrlChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated {
        username: String,
        /// Origin of the login URL
        site: String,
        since: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub login_url: String,
    pub credentials: Credentials,
    pub locators: LoginLocators,
    /// `None` waits for the URL to change away from the login page
    pub success: Option<SuccessIndicator>,
    pub timeout: Duration,
}

impl LoginRequest {
    pub fn new(login_url: impl Into<String>, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            login_url: login_url.into(),
            credentials,
            locators: LoginLocators::default(),
            success: None,
            timeout,
        }
    }

    pub fn with_locators(mut self, locators: LoginLocators) -> Self {
        self.locators = locators;
        self
    }

    pub fn with_success(mut self, success: SuccessIndicator) -> Self {
        self.success = Some(success);
        self
    }
}

/// Where to type a value or click
#[derive(Debug, Clone)]
pub enum FieldTarget {
    Selector(Selector),
    Ranked(RankedLocatorSet),
}

impl FieldTarget {
    fn into_set(self) -> RankedLocatorSet {
        match self {
            FieldTarget::Ranked(set) => set,
            FieldTarget::Selector(selector) => {
                let strategy = infer_strategy(&selector);
                RankedLocatorSet::single(LocatorCandidate::detached(strategy, selector, None))
            }
        }
    }
}

/// Resolve `target` and type `value` into the winner
pub(crate) async fn fill_field<P: PageSession + ?Sized>(
    page: &P,
    resolver: &FallbackResolver,
    target: FieldTarget,
    value: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> LocatorResult<()> {
    let winner = resolver
        .resolve(page, &target.into_set(), timeout, cancel)
        .await
        .into_winner()?;
    page.fill(&winner.selector, value).await
}

pub(crate) async fn click_target<P: PageSession + ?Sized>(
    page: &P,
    resolver: &FallbackResolver,
    target: FieldTarget,
    timeout: Duration,
    cancel: &CancellationToken,
) -> LocatorResult<()> {
    let winner = resolver
        .resolve(page, &target.into_set(), timeout, cancel)
        .await
        .into_winner()?;
    page.click(&winner.selector).await
}

/// Wait for `indicator`; `before` is the URL at submission time
pub(crate) async fn wait_for_success<P: PageSession + ?Sized>(
    page: &P,
    indicator: Option<&SuccessIndicator>,
    before: &str,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> LocatorResult<bool> {
    let observed = wait_for(timeout, interval, cancel, move || async move {
        let seen = match indicator {
            Some(SuccessIndicator::ElementPresent(selector)) => page.count(selector).await? > 0,
            Some(SuccessIndicator::UrlContains(fragment)) => {
                page.current_url().await?.contains(fragment.as_str())
            }
            Some(SuccessIndicator::TextPresent(text)) => page.contains_text(text).await?,
            Some(SuccessIndicator::UrlChanged) | None => {
                let now = page.current_url().await?;
                now != before && !now.to_lowercase().contains("login")
            }
        };
        Ok(seen.then_some(()))
    })
    .await?;
    Ok(observed.is_some())
}

/// Wrap an error as a failure of `step`; cancellation passes through
fn failed_at(step: AuthStep, context: &'static str) -> impl Fn(LocatorError) -> LocatorError {
    move |e| match e {
        LocatorError::Cancelled => e,
        other => LocatorError::auth(step, format!("{}{}", context, other)),
    }
}

fn origin_of(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| u.origin().ascii_serialization())
}

/// Owns one page and its authentication state
pub struct Session<P> {
    page: P,
    auth: AuthState,
}

impl<P: PageSession> Session<P> {
    pub fn new(page: P) -> Self {
        Self {
            page,
            auth: AuthState::Unauthenticated,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn into_page(self) -> P {
        self.page
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated { .. })
    }

    /// Whether the stored login covers `url`'s origin
    pub fn is_authenticated_for(&self, url: &str) -> bool {
        match (&self.auth, origin_of(url)) {
            (AuthState::Authenticated { site, .. }, Some(origin)) => *site == origin,
            _ => false,
        }
    }

    pub fn logout(&mut self) {
        if self.is_authenticated() {
            info!("Logging out");
        }
        self.auth = AuthState::Unauthenticated;
    }

    /// Run the login flow. On any failure the session ends up unauthenticated
    /// and the error names the failing step.
    pub async fn login(
        &mut self,
        request: &LoginRequest,
        resolver: &FallbackResolver,
        mapper: &FormFieldMapper,
        cancel: &CancellationToken,
    ) -> LocatorResult<()> {
        self.auth = AuthState::Unauthenticated;
        info!("Logging in to {}", request.login_url);

        let result = self.run_login(request, resolver, mapper, cancel).await;
        match result {
            Ok(()) => {
                let site = origin_of(&request.login_url)
                    .unwrap_or_else(|| request.login_url.clone());
                info!("Authenticated as {} on {}", request.credentials.username, site);
                self.auth = AuthState::Authenticated {
                    username: request.credentials.username.clone(),
                    site,
                    since: Utc::now(),
                };
                Ok(())
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_login(
        &self,
        request: &LoginRequest,
        resolver: &FallbackResolver,
        mapper: &FormFieldMapper,
        cancel: &CancellationToken,
    ) -> LocatorResult<()> {
        let page = &self.page;
        let timeout = request.timeout;

        let current = page
            .current_url()
            .await
            .map_err(failed_at(AuthStep::Navigate, ""))?;
        if current.trim_end_matches('/') != request.login_url.trim_end_matches('/') {
            page.goto(&request.login_url)
                .await
                .map_err(failed_at(AuthStep::Navigate, ""))?;
        }

        let locators = &request.locators;
        let form = if locators.username.is_none()
            || locators.password.is_none()
            || locators.submit.is_none()
        {
            Some(
                mapper
                    .map_form(page, None, timeout, cancel)
                    .await
                    .map_err(failed_at(AuthStep::Fill, ""))?,
            )
        } else {
            None
        };

        let username = pick(&locators.username, form.as_ref(), &[SemanticField::Email, SemanticField::Name])
            .ok_or_else(|| LocatorError::auth(AuthStep::Fill, "no username field found"))?;
        let password = pick(&locators.password, form.as_ref(), &[SemanticField::Password])
            .ok_or_else(|| LocatorError::auth(AuthStep::Fill, "no password field found"))?;
        let submit = pick(&locators.submit, form.as_ref(), &[SemanticField::Submit])
            .ok_or_else(|| LocatorError::auth(AuthStep::Submit, "no submit control found"))?;

        debug!("Filling username");
        fill_field(page, resolver, username, &request.credentials.username, timeout, cancel)
            .await
            .map_err(failed_at(AuthStep::Fill, "username: "))?;
        debug!("Filling password");
        fill_field(page, resolver, password, &request.credentials.password, timeout, cancel)
            .await
            .map_err(failed_at(AuthStep::Fill, "password: "))?;

        let before = page
            .current_url()
            .await
            .map_err(failed_at(AuthStep::Submit, ""))?;
        click_target(page, resolver, submit, timeout, cancel)
            .await
            .map_err(failed_at(AuthStep::Submit, ""))?;

        let observed = wait_for_success(
            page,
            request.success.as_ref(),
            &before,
            timeout,
            resolver.poll_interval,
            cancel,
        )
        .await
        .map_err(failed_at(AuthStep::SuccessWait, ""))?;
        if !observed {
            return Err(LocatorError::auth(
                AuthStep::SuccessWait,
                format!(
                    "success indicator not observed within {}ms",
                    timeout.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

/// Explicit selector if given, else the first mapped field of the listed kinds
fn pick(
    explicit: &Option<Selector>,
    form: Option<&FormMap>,
    kinds: &[SemanticField],
) -> Option<FieldTarget> {
    if let Some(selector) = explicit {
        return Some(FieldTarget::Selector(selector.clone()));
    }
    let form = form?;
    kinds
        .iter()
        .find_map(|kind| form.first_of(*kind))
        .map(|field| FieldTarget::Ranked(field.locators.clone()))
}
