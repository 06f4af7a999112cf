//! Target resolution and element capture

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{LocatorError, LocatorResult};
use crate::generator::absolute_xpath;
use crate::page::{INTERACTIVE_ELEMENTS, PageSession, wait_for};
use crate::types::{BoundingBox, ElementSnapshot, Selector, Target};

const STOP_WORDS: [&str; 13] = [
    "the", "and", "for", "with", "that", "this", "from", "into", "element", "page", "please",
    "click", "locate",
];

/// Words that describe what an element does. A description and an element
/// sharing one of these gets the action bonus.
const ACTION_WORDS: [&str; 9] = [
    "submit", "login", "log", "signin", "sign", "signup", "search", "cancel", "register",
];

const IMPORTANT_ATTRIBUTES: [&str; 7] = [
    "aria-label",
    "placeholder",
    "title",
    "alt",
    "value",
    "name",
    "id",
];

/// Lowercase alphanumeric runs of at least 3 characters, stop words removed.
/// camelCase and snake_case identifiers split into their words.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(text.len());
    let mut prev_lower = false;
    for c in text.chars() {
        if c.is_uppercase() && prev_lower {
            spaced.push(' ');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        spaced.push(c);
    }
    spaced
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 3 && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

fn semantic_words(snapshot: &ElementSnapshot) -> &'static [&'static str] {
    let role = snapshot.attr("role").unwrap_or_default();
    let input_type = snapshot.input_type().unwrap_or_default();
    match snapshot.tag.as_str() {
        "button" => &["button", "btn"],
        "input" if matches!(input_type.as_str(), "submit" | "button" | "reset" | "image") => {
            &["button", "btn"]
        }
        "input" if input_type == "checkbox" => &["checkbox", "check", "box"],
        "input" if input_type == "radio" => &["radio", "option"],
        "input" | "textarea" => &["input", "textbox", "text", "box", "field"],
        "select" => &["select", "dropdown", "list", "combo"],
        "a" => &["link", "anchor"],
        "img" => &["image", "img", "picture", "icon", "logo"],
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => &["heading", "title", "header"],
        "label" => &["label"],
        _ if role == "button" => &["button", "btn"],
        _ if role == "link" => &["link"],
        _ => &[],
    }
}

fn action_words(tokens: &[String]) -> HashSet<&'static str> {
    ACTION_WORDS
        .iter()
        .copied()
        .filter(|w| tokens.iter().any(|t| t == w))
        .collect()
}

/// How well `snapshot` matches a natural-language description. Zero means no
/// evidence at all.
pub fn description_score(description: &str, snapshot: &ElementSnapshot) -> u32 {
    let wanted = description.trim().to_lowercase();
    let desc_tokens = tokenize(description);
    let text = snapshot.text.trim().to_lowercase();
    let mut score = 0u32;

    if !text.is_empty() && !wanted.is_empty() {
        if text == wanted || wanted.ends_with(&text) && text.chars().count() >= 3 {
            score += 100;
        } else if text.contains(&wanted) || wanted.contains(&text) && text.chars().count() >= 3 {
            score += 80;
        }
    }

    let text_tokens: HashSet<String> = tokenize(&snapshot.text).into_iter().collect();
    let mut attr_tokens: HashSet<String> = IMPORTANT_ATTRIBUTES
        .iter()
        .filter_map(|a| snapshot.attr(a))
        .flat_map(tokenize)
        .collect();
    if let Some(label) = snapshot.label.as_deref() {
        attr_tokens.extend(tokenize(label));
    }

    for token in &desc_tokens {
        let weight = token.chars().count() as u32;
        if text_tokens.contains(token) {
            score += 10 * weight;
        }
        if attr_tokens.contains(token) {
            score += 15 * weight;
        }
    }

    let semantics = semantic_words(snapshot);
    if desc_tokens.iter().any(|t| semantics.contains(&t.as_str())) {
        score += 30;
    }

    let element_tokens: Vec<String> = text_tokens.into_iter().chain(attr_tokens).collect();
    let shared_actions = action_words(&desc_tokens)
        .intersection(&action_words(&element_tokens))
        .count();
    if shared_actions > 0 {
        score += 50;
    }

    score
}

/// Index of the best match above `min_confidence`; ties go to the earliest
pub fn match_description(
    description: &str,
    candidates: &[ElementSnapshot],
    min_confidence: u32,
) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (index, snapshot) in candidates.iter().enumerate() {
        if !snapshot.visible {
            continue;
        }
        let score = description_score(description, snapshot);
        if score > min_confidence && best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best
}

/// Elements whose centre falls inside `region`
pub fn within_region<'a>(
    region: &BoundingBox,
    candidates: &'a [ElementSnapshot],
) -> Vec<&'a ElementSnapshot> {
    candidates
        .iter()
        .filter(|s| s.visible)
        .filter(|s| {
            let (x, y) = s.bounds.center();
            region.contains_point(x, y)
        })
        .collect()
}

/// Resolves a [`Target`] to exactly one element and captures it
#[derive(Debug, Clone)]
pub struct ElementExtractor {
    pub min_confidence: u32,
    pub poll_interval: Duration,
}

impl Default for ElementExtractor {
    fn default() -> Self {
        Self {
            min_confidence: 10,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ElementExtractor {
    pub fn new(min_confidence: u32, poll_interval: Duration) -> Self {
        Self {
            min_confidence,
            poll_interval,
        }
    }

    /// Capture the single element `target` refers to.
    ///
    /// A stale reference during capture gets one fresh attempt before it is
    /// reported.
    pub async fn extract<P: PageSession + ?Sized>(
        &self,
        page: &P,
        target: &Target,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<Arc<ElementSnapshot>> {
        info!("Extracting {}", target);
        match self.capture(page, target, timeout, cancel).await {
            Err(LocatorError::StaleReference(reason)) => {
                warn!("Stale reference while capturing {}: {}; retrying", target, reason);
                self.capture(page, target, timeout, cancel).await
            }
            other => other,
        }
    }

    async fn capture<P: PageSession + ?Sized>(
        &self,
        page: &P,
        target: &Target,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<Arc<ElementSnapshot>> {
        match target {
            Target::Css(_) | Target::XPath(_) => {
                let selector = target
                    .selector()
                    .ok_or_else(|| LocatorError::InvalidSelector(target.to_string()))?;
                self.capture_selector(page, &selector, timeout, cancel).await
            }
            Target::Description(description) => {
                let elements = self.interactive(page, timeout, cancel).await?;
                let (index, score) =
                    match_description(description, &elements, self.min_confidence)
                        .ok_or_else(|| LocatorError::NotFound(target.to_string()))?;
                debug!(
                    "Description '{}' matched <{}> with score {}",
                    description, elements[index].tag, score
                );
                Ok(Arc::new(elements[index].clone()))
            }
            Target::Region(region) => {
                let elements = self.interactive(page, timeout, cancel).await?;
                let inside = within_region(region, &elements);
                match inside.as_slice() {
                    [] => Err(LocatorError::NotFound(target.to_string())),
                    [only] => Ok(Arc::new((*only).clone())),
                    many => Err(LocatorError::Ambiguous {
                        selector: target.to_string(),
                        count: many.len(),
                    }),
                }
            }
        }
    }

    async fn capture_selector<P: PageSession + ?Sized>(
        &self,
        page: &P,
        selector: &Selector,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<Arc<ElementSnapshot>> {
        let found = wait_for(timeout, self.poll_interval, cancel, move || async move {
            let snapshots = page.snapshots(selector).await?;
            Ok((!snapshots.is_empty()).then_some(snapshots))
        })
        .await?;

        let mut snapshots = found.ok_or_else(|| LocatorError::NotFound(selector.to_string()))?;
        if snapshots.len() > 1 {
            return Err(LocatorError::Ambiguous {
                selector: selector.to_string(),
                count: snapshots.len(),
            });
        }
        let snapshot = snapshots.remove(0);
        debug!("Captured <{}> for {}", snapshot.tag, selector);
        Ok(Arc::new(snapshot))
    }

    /// Visible interactive elements, waiting until at least one exists
    async fn interactive<P: PageSession + ?Sized>(
        &self,
        page: &P,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<Vec<ElementSnapshot>> {
        let selector = &Selector::css(INTERACTIVE_ELEMENTS);
        let found = wait_for(timeout, self.poll_interval, cancel, move || async move {
            let visible: Vec<ElementSnapshot> = page
                .snapshots(selector)
                .await?
                .into_iter()
                .filter(|s| s.visible)
                .collect();
            Ok((!visible.is_empty()).then_some(visible))
        })
        .await?;
        found.ok_or_else(|| LocatorError::Timeout("no interactive elements on the page".to_string()))
    }

    /// Check that the snapshot's positional path still addresses one element
    /// with the same tag
    pub async fn verify_live<P: PageSession + ?Sized>(
        &self,
        page: &P,
        snapshot: &ElementSnapshot,
    ) -> LocatorResult<()> {
        let selector = Selector::xpath(absolute_xpath(snapshot));
        let live = page.snapshots(&selector).await?;
        match live.as_slice() {
            [one] if one.tag == snapshot.tag => Ok(()),
            [one] => Err(LocatorError::StaleReference(format!(
                "{} now addresses <{}> instead of <{}>",
                selector, one.tag, snapshot.tag
            ))),
            other => Err(LocatorError::StaleReference(format!(
                "{} matches {} elements",
                selector,
                other.len()
            ))),
        }
    }
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod extractor_test;
