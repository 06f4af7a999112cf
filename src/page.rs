//! Page session capability consumed by the engine
//!
//! The engine never talks to a browser directly. Anything that can answer
//! these queries for one tab (a WebDriver session, a CDP target, an
//! in-memory test page) can back a [`crate::Session`].

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{LocatorError, LocatorResult};
use crate::types::{ElementSnapshot, Selector};

/// Visible interactive and text-bearing elements considered for descriptions
/// and regions
pub const INTERACTIVE_ELEMENTS: &str = "a, button, input, select, textarea, label, summary, \
     [role], [aria-label], [onclick], [tabindex], h1, h2, h3, h4, h5, h6, p, span, li, td, th, img[alt]";

/// Form controls enumerated by the form field mapper
pub const FORM_CONTROLS: [&str; 5] = ["input", "textarea", "select", "button", "[role='button']"];

/// Read and interaction primitives for a single browser tab.
///
/// Calls on one page are issued sequentially by the engine. Interaction
/// methods act on the first match; callers establish uniqueness beforehand.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn goto(&self, url: &str) -> LocatorResult<()>;

    async fn current_url(&self) -> LocatorResult<String>;

    /// Number of elements currently matching the selector
    async fn count(&self, selector: &Selector) -> LocatorResult<usize>;

    /// Snapshots of all matching elements in document order
    async fn snapshots(&self, selector: &Selector) -> LocatorResult<Vec<ElementSnapshot>>;

    /// Clear the first matching element and type `value` into it
    async fn fill(&self, selector: &Selector, value: &str) -> LocatorResult<()>;

    async fn click(&self, selector: &Selector) -> LocatorResult<()>;

    /// Whether the page's visible text contains `text`
    async fn contains_text(&self, text: &str) -> LocatorResult<bool>;
}

#[async_trait]
impl<P: PageSession + ?Sized> PageSession for Box<P> {
    async fn goto(&self, url: &str) -> LocatorResult<()> {
        (**self).goto(url).await
    }

    async fn current_url(&self) -> LocatorResult<String> {
        (**self).current_url().await
    }

    async fn count(&self, selector: &Selector) -> LocatorResult<usize> {
        (**self).count(selector).await
    }

    async fn snapshots(&self, selector: &Selector) -> LocatorResult<Vec<ElementSnapshot>> {
        (**self).snapshots(selector).await
    }

    async fn fill(&self, selector: &Selector, value: &str) -> LocatorResult<()> {
        (**self).fill(selector, value).await
    }

    async fn click(&self, selector: &Selector) -> LocatorResult<()> {
        (**self).click(selector).await
    }

    async fn contains_text(&self, text: &str) -> LocatorResult<bool> {
        (**self).contains_text(text).await
    }
}

/// Longest wait honoured; larger timeouts are clamped to it
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// `timeout` from now, clamped to [`MAX_WAIT`]
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_WAIT)).unwrap_or(now)
}

/// Poll `probe` until it yields a value or `timeout` elapses.
///
/// The probe always runs at least once. Returns `Ok(None)` on timeout and
/// `Err(Cancelled)` as soon as the token fires, including mid-sleep.
pub async fn wait_for<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> LocatorResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LocatorResult<Option<T>>>,
{
    let deadline = deadline_after(timeout);
    loop {
        if cancel.is_cancelled() {
            return Err(LocatorError::Cancelled);
        }
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(LocatorError::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

#[cfg(test)]
#[path = "page_test.rs"]
mod page_test;
