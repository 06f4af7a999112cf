// Common test utilities and fixtures

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use locprobe::generator::{CandidateGenerator, css_path_variants};
use locprobe::page::{FORM_CONTROLS, INTERACTIVE_ELEMENTS};
use locprobe::{
    AncestorNode, ElementSnapshot, LocatorError, LocatorResult, PageSession, Selector,
};

struct FakeElement {
    snapshot: ElementSnapshot,
    selectors: HashSet<Selector>,
    visible_from: Option<Instant>,
}

#[derive(Default)]
struct PageState {
    url: String,
    elements: Vec<FakeElement>,
    body_text: String,
    queries: Vec<Selector>,
    fills: Vec<(Selector, String)>,
    clicks: Vec<Selector>,
    navigations: Vec<String>,
    click_navigates: Vec<(Selector, String)>,
    stale_once: HashSet<Selector>,
    failing: HashSet<Selector>,
}

/// In-memory page. Each element answers to every locator the generator
/// derives for it, plus any extra selectors given explicitly.
pub struct FakePage {
    state: Mutex<PageState>,
}

fn parse(expr: &str) -> Selector {
    Selector::parse(expr).expect("valid selector in fixture")
}

fn derived_selectors(snapshot: &ElementSnapshot) -> HashSet<Selector> {
    let shared = Arc::new(snapshot.clone());
    let mut selectors: HashSet<Selector> = CandidateGenerator::new(1000)
        .generate(&shared)
        .into_iter()
        .map(|c| c.selector)
        .collect();
    selectors.extend(css_path_variants(snapshot).into_iter().map(Selector::css));
    selectors.insert(Selector::css(snapshot.tag.clone()));
    selectors
}

fn is_control(snapshot: &ElementSnapshot) -> bool {
    matches!(
        snapshot.tag.as_str(),
        "input" | "textarea" | "select" | "button"
    ) || snapshot.attr("role") == Some("button")
}

#[allow(dead_code)]
impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.to_string(),
                ..PageState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().expect("page state lock")
    }

    /// Add an element matching its derived locators and `extra`
    pub fn element(self, snapshot: ElementSnapshot, extra: &[&str]) -> Self {
        self.push(snapshot, extra, None);
        self
    }

    /// Add an element that only shows up after `delay`
    pub fn element_after(self, snapshot: ElementSnapshot, extra: &[&str], delay: Duration) -> Self {
        self.push(snapshot, extra, Some(Instant::now() + delay));
        self
    }

    fn push(&self, snapshot: ElementSnapshot, extra: &[&str], visible_from: Option<Instant>) {
        let mut selectors = derived_selectors(&snapshot);
        selectors.extend(extra.iter().map(|e| parse(e)));
        self.lock().elements.push(FakeElement {
            snapshot,
            selectors,
            visible_from,
        });
    }

    pub fn with_body_text(self, text: &str) -> Self {
        self.lock().body_text = text.to_string();
        self
    }

    /// Clicking `selector` moves the page to `url`
    pub fn click_navigates(self, selector: &str, url: &str) -> Self {
        self.lock()
            .click_navigates
            .push((parse(selector), url.to_string()));
        self
    }

    /// The next snapshot query for `selector` reports a stale element
    pub fn stale_once(self, selector: &str) -> Self {
        self.lock().stale_once.insert(parse(selector));
        self
    }

    /// Queries for `selector` fail with a driver error
    pub fn failing(self, selector: &str) -> Self {
        self.lock().failing.insert(parse(selector));
        self
    }

    /// Replace every element with `snapshots`, as after a re-render
    pub fn rerender(&self, snapshots: Vec<(ElementSnapshot, Vec<&str>)>) {
        self.lock().elements.clear();
        for (snapshot, extra) in snapshots {
            self.push(snapshot, &extra, None);
        }
    }

    pub fn queries(&self) -> Vec<Selector> {
        self.lock().queries.clone()
    }

    pub fn fills(&self) -> Vec<(Selector, String)> {
        self.lock().fills.clone()
    }

    pub fn clicks(&self) -> Vec<Selector> {
        self.lock().clicks.clone()
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn matching(&self, selector: &Selector) -> LocatorResult<Vec<ElementSnapshot>> {
        let mut state = self.lock();
        state.queries.push(selector.clone());
        if state.failing.contains(selector) {
            return Err(LocatorError::Driver(anyhow::anyhow!(
                "session deleted while querying {}",
                selector
            )));
        }

        let now = Instant::now();
        let present = |e: &&FakeElement| e.visible_from.is_none_or(|t| now >= t);
        let found = if selector.expression == INTERACTIVE_ELEMENTS {
            state
                .elements
                .iter()
                .filter(present)
                .map(|e| e.snapshot.clone())
                .collect()
        } else if selector.expression == FORM_CONTROLS.join(", ") {
            state
                .elements
                .iter()
                .filter(present)
                .filter(|e| is_control(&e.snapshot))
                .map(|e| e.snapshot.clone())
                .collect()
        } else {
            state
                .elements
                .iter()
                .filter(present)
                .filter(|e| e.selectors.contains(selector))
                .map(|e| e.snapshot.clone())
                .collect()
        };
        Ok(found)
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn goto(&self, url: &str) -> LocatorResult<()> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> LocatorResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn count(&self, selector: &Selector) -> LocatorResult<usize> {
        Ok(self.matching(selector)?.len())
    }

    async fn snapshots(&self, selector: &Selector) -> LocatorResult<Vec<ElementSnapshot>> {
        if self.lock().stale_once.remove(selector) {
            return Err(LocatorError::StaleReference(selector.to_string()));
        }
        self.matching(selector)
    }

    async fn fill(&self, selector: &Selector, value: &str) -> LocatorResult<()> {
        if self.matching(selector)?.is_empty() {
            return Err(LocatorError::NotFound(selector.to_string()));
        }
        self.lock().fills.push((selector.clone(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &Selector) -> LocatorResult<()> {
        if self.matching(selector)?.is_empty() {
            return Err(LocatorError::NotFound(selector.to_string()));
        }
        let mut state = self.lock();
        state.clicks.push(selector.clone());
        let target = state
            .click_navigates
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, url)| url.clone());
        if let Some(url) = target {
            state.url = url;
        }
        Ok(())
    }

    async fn contains_text(&self, text: &str) -> LocatorResult<bool> {
        Ok(self.lock().body_text.contains(text))
    }
}

/// `html > body` ancestors followed by `rest`
#[allow(dead_code)]
pub fn under_body(mut snapshot: ElementSnapshot, rest: Vec<AncestorNode>) -> ElementSnapshot {
    let mut ancestors = vec![AncestorNode::new("html"), AncestorNode::new("body")];
    ancestors.extend(rest);
    snapshot.ancestors = ancestors;
    snapshot
}

/// Snapshot fixtures for common pages
#[allow(dead_code)]
pub mod fixtures {
    use super::*;
    use locprobe::BoundingBox;

    pub const LOGIN_URL: &str = "https://app.example.com/login";
    pub const DASHBOARD_URL: &str = "https://app.example.com/dashboard";

    fn login_form() -> Vec<AncestorNode> {
        vec![AncestorNode::new("form").with_class("login-form")]
    }

    pub fn email_input() -> ElementSnapshot {
        under_body(
            ElementSnapshot::new("input")
                .with_attribute("type", "email")
                .with_attribute("id", "email")
                .with_label("Email")
                .with_bounds(BoundingBox::new(100.0, 100.0, 200.0, 30.0)),
            login_form(),
        )
    }

    pub fn password_input() -> ElementSnapshot {
        under_body(
            ElementSnapshot::new("input")
                .with_attribute("type", "password")
                .with_attribute("id", "pwd")
                .with_label("Password")
                .nth(2)
                .with_bounds(BoundingBox::new(100.0, 150.0, 200.0, 30.0)),
            login_form(),
        )
    }

    /// Submit button with no id, only text
    pub fn login_button() -> ElementSnapshot {
        under_body(
            ElementSnapshot::new("button")
                .with_attribute("type", "submit")
                .with_text("Log in")
                .with_bounds(BoundingBox::new(100.0, 200.0, 80.0, 30.0)),
            login_form(),
        )
    }

    /// Login page whose submit navigates to the dashboard
    pub fn login_page() -> FakePage {
        FakePage::new(LOGIN_URL)
            .element(email_input(), &[])
            .element(password_input(), &[])
            .element(login_button(), &[])
            .click_navigates("button[type=\"submit\"]", DASHBOARD_URL)
            .click_navigates("form.login-form button[type=\"submit\"]", DASHBOARD_URL)
            .click_navigates("xpath=//button[normalize-space(.)='Log in']", DASHBOARD_URL)
    }
}
