//! Candidate generation: one pass over a snapshot, six independent strategies

use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::types::{
    AncestorNode, ElementSnapshot, LocatorCandidate, LocatorStrategy, QueryLanguage, Selector,
};

/// Test-id attributes, checked after `id`
pub const TEST_ID_ATTRIBUTES: [&str; 6] = [
    "data-testid",
    "data-test-id",
    "data-test",
    "data-cy",
    "data-qa",
    "data-automation",
];

const ACCESSIBILITY_ATTRIBUTES: [&str; 3] = ["aria-label", "role", "name"];

/// Classes describing transient state rather than identity
const STATE_CLASSES: [&str; 8] = [
    "active", "focus", "focused", "hover", "selected", "open", "disabled", "hidden",
];

lazy_static::lazy_static! {
    static ref GENERATED_ID_PATTERNS: Vec<Regex> = vec![
        // purely numeric
        Regex::new(r"^\d+$").expect("valid regex"),
        // UUID-shaped
        Regex::new(r"(?i)^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$")
            .expect("valid regex"),
        // framework counters: ember123, ext-gen42, react-select-3-input, :r1:
        Regex::new(r"(?i)^(ember|ext-gen|ext-comp|yui_|gwt-uid-|react-select-|mui-|radix-|headlessui-|j_idt)\S*\d")
            .expect("valid regex"),
        Regex::new(r"^:r[0-9a-z]+:$").expect("valid regex"),
        // long digit runs
        Regex::new(r"\d{4,}").expect("valid regex"),
    ];
    static ref HEX_RUN: Regex = Regex::new(r"(?i)[0-9a-f]{8,}").expect("valid regex");
    static ref GENERATED_CLASS: Regex =
        Regex::new(r"^(css|sc|jss|jsx|emotion|makeStyles|svelte)-|\d{3,}|^_").expect("valid regex");
    static ref PLAIN_IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex");
}

/// Whether an id-like value looks machine generated
pub fn is_generated_id(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return true;
    }
    if GENERATED_ID_PATTERNS.iter().any(|re| re.is_match(value)) {
        return true;
    }
    HEX_RUN
        .find_iter(value)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_digit()))
}

/// Whether a class name is usable in a durable selector
pub fn is_stable_class(class: &str) -> bool {
    !class.is_empty()
        && PLAIN_IDENT.is_match(class)
        && !GENERATED_CLASS.is_match(class)
        && !is_generated_id(class)
        && !STATE_CLASSES.contains(&class)
        && !class.starts_with("is-")
        && !class.starts_with("has-")
}

/// `#id` for plain identifiers, `[id="..."]` otherwise
pub fn id_selector(id: &str) -> String {
    if PLAIN_IDENT.is_match(id) {
        format!("#{}", id)
    } else {
        attribute_selector("", "id", id)
    }
}

/// `tag[attr="value"]` with the value escaped for a double-quoted string
pub fn attribute_selector(tag: &str, attr: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{}[{}=\"{}\"]", tag, attr, escaped)
}

/// XPath string literal, falling back to `concat()` when both quote kinds occur
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Produces locator candidates from element snapshots
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    /// Text-content candidates only for text shorter than this (characters)
    pub text_length_limit: usize,
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self {
            text_length_limit: 50,
        }
    }
}

impl CandidateGenerator {
    pub fn new(text_length_limit: usize) -> Self {
        Self { text_length_limit }
    }

    /// Run every strategy once. Candidates come back unscored and
    /// de-duplicated by (strategy, expression).
    pub fn generate(&self, snapshot: &Arc<ElementSnapshot>) -> Vec<LocatorCandidate> {
        let mut candidates = Vec::new();
        candidates.extend(self.stable_id(snapshot));
        candidates.extend(self.accessibility(snapshot));
        candidates.extend(self.css_path(snapshot));
        candidates.extend(self.text_content(snapshot));
        candidates.extend(self.relative_position(snapshot));
        candidates.push(self.xpath(snapshot));

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert((c.strategy, c.selector.expression.clone())));

        debug!(
            "Generated {} candidates for <{}>",
            candidates.len(),
            snapshot.tag
        );
        candidates
    }

    fn stable_id(&self, snapshot: &Arc<ElementSnapshot>) -> Option<LocatorCandidate> {
        if let Some(id) = snapshot.id().filter(|id| !is_generated_id(id)) {
            return Some(LocatorCandidate::new(
                LocatorStrategy::StableId,
                Selector::css(id_selector(id)),
                Some(id.to_string()),
                snapshot,
            ));
        }

        TEST_ID_ATTRIBUTES.iter().find_map(|attr| {
            let value = snapshot.attr(attr).filter(|v| !is_generated_id(v))?;
            Some(LocatorCandidate::new(
                LocatorStrategy::StableId,
                Selector::css(attribute_selector("", attr, value)),
                Some(value.to_string()),
                snapshot,
            ))
        })
    }

    fn accessibility(&self, snapshot: &Arc<ElementSnapshot>) -> Vec<LocatorCandidate> {
        ACCESSIBILITY_ATTRIBUTES
            .iter()
            .filter_map(|attr| {
                let value = snapshot.attr(attr)?;
                Some(LocatorCandidate::new(
                    LocatorStrategy::AccessibilityAttribute,
                    Selector::css(attribute_selector(&snapshot.tag, attr, value)),
                    Some(value.to_string()),
                    snapshot,
                ))
            })
            .collect()
    }

    fn css_path(&self, snapshot: &Arc<ElementSnapshot>) -> Option<LocatorCandidate> {
        let expression = css_path_variants(snapshot).pop()?;
        Some(LocatorCandidate::new(
            LocatorStrategy::CssPath,
            Selector::css(expression),
            element_signal(snapshot),
            snapshot,
        ))
    }

    fn text_content(&self, snapshot: &Arc<ElementSnapshot>) -> Option<LocatorCandidate> {
        let text = collapse_whitespace(&snapshot.text);
        let length = text.chars().count();
        if length == 0 || length >= self.text_length_limit {
            return None;
        }
        // inputs expose their caption through `value`, never through text nodes
        let expression = if snapshot.tag == "input" {
            let value = snapshot.attr("value").filter(|v| !v.trim().is_empty())?;
            format!("//input[@value={}]", xpath_literal(value))
        } else {
            format!("//{}[normalize-space(.)={}]", snapshot.tag, xpath_literal(&text))
        };
        Some(LocatorCandidate::new(
            LocatorStrategy::TextContent,
            Selector::xpath(expression),
            Some(text),
            snapshot,
        ))
    }

    fn relative_position(&self, snapshot: &Arc<ElementSnapshot>) -> Option<LocatorCandidate> {
        let (anchor_index, anchor_id) = nearest_stable_ancestor(snapshot)?;
        let mut steps = vec![id_selector(anchor_id)];
        steps.extend(
            snapshot.ancestors[anchor_index + 1..]
                .iter()
                .map(|a| format!("{}:nth-of-type({})", a.tag, a.index_of_type)),
        );
        steps.push(format!(
            "{}:nth-of-type({})",
            snapshot.tag, snapshot.index_of_type
        ));
        Some(LocatorCandidate::new(
            LocatorStrategy::RelativePosition,
            Selector::css(steps.join(" > ")),
            Some(anchor_id.to_string()),
            snapshot,
        ))
    }

    fn xpath(&self, snapshot: &Arc<ElementSnapshot>) -> LocatorCandidate {
        LocatorCandidate::new(
            LocatorStrategy::XPath,
            Selector::xpath(absolute_xpath(snapshot)),
            None,
            snapshot,
        )
    }
}

/// Index and id of the closest ancestor carrying a stable id
fn nearest_stable_ancestor(snapshot: &ElementSnapshot) -> Option<(usize, &str)> {
    snapshot
        .ancestors
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, a)| {
            a.id.as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty() && !is_generated_id(id))
                .map(|id| (i, id))
        })
}

/// Positional path from the root; `//tag[n]` when no ancestors were captured
pub fn absolute_xpath(snapshot: &ElementSnapshot) -> String {
    let leaf = format!("{}[{}]", snapshot.tag, snapshot.index_of_type);
    if snapshot.ancestors.is_empty() {
        return format!("//{}", leaf);
    }
    let mut path = String::new();
    for ancestor in &snapshot.ancestors {
        path.push('/');
        path.push_str(&format!("{}[{}]", ancestor.tag, ancestor.index_of_type));
    }
    path.push('/');
    path.push_str(&leaf);
    path
}

fn ancestor_step(ancestor: &AncestorNode) -> Option<String> {
    let classes: Vec<&str> = ancestor
        .classes
        .iter()
        .map(String::as_str)
        .filter(|c| is_stable_class(c))
        .take(2)
        .collect();
    if classes.is_empty() {
        None
    } else {
        Some(format!("{}.{}", ancestor.tag, classes.join(".")))
    }
}

fn stable_classes(snapshot: &ElementSnapshot) -> Vec<&str> {
    snapshot
        .classes()
        .into_iter()
        .filter(|c| is_stable_class(c))
        .take(2)
        .collect()
}

fn element_qualifiers(snapshot: &ElementSnapshot) -> Option<String> {
    let classes = stable_classes(snapshot);
    if !classes.is_empty() {
        return Some(format!(".{}", classes.join(".")));
    }
    if let Some(name) = snapshot.attr("name") {
        return Some(attribute_selector("", "name", name));
    }
    match (snapshot.tag.as_str(), snapshot.attr("type")) {
        ("input" | "button", Some(kind)) => Some(attribute_selector("", "type", kind)),
        _ => None,
    }
}

fn element_step(snapshot: &ElementSnapshot) -> String {
    format!(
        "{}{}",
        snapshot.tag,
        element_qualifiers(snapshot).unwrap_or_default()
    )
}

/// Raw value behind the element's own CSS step
fn element_signal(snapshot: &ElementSnapshot) -> Option<String> {
    let classes = stable_classes(snapshot);
    if !classes.is_empty() {
        return Some(classes.join(" "));
    }
    snapshot
        .attr("name")
        .or_else(|| match snapshot.tag.as_str() {
            "input" | "button" => snapshot.attr("type"),
            _ => None,
        })
        .map(str::to_string)
}

/// CSS chains from shortest to longest.
///
/// Each chain ends with the element's own step and starts at the nearest
/// stable-id ancestor when there is one. Intermediate ancestors without a
/// stable class are skipped, so the last entry is the full chain up to the
/// anchor or root. Empty when nothing qualifies the chain.
pub fn css_path_variants(snapshot: &ElementSnapshot) -> Vec<String> {
    let anchor = nearest_stable_ancestor(snapshot);
    let start = anchor.map(|(i, _)| i + 1).unwrap_or(0);
    let intermediates: Vec<String> = snapshot.ancestors[start..]
        .iter()
        .rev()
        .filter_map(ancestor_step)
        .collect();

    let has_signal = anchor.is_some()
        || element_qualifiers(snapshot).is_some()
        || !intermediates.is_empty();
    if !has_signal {
        return Vec::new();
    }

    let prefix = anchor.map(|(_, id)| id_selector(id));
    let leaf = element_step(snapshot);
    (0..=intermediates.len())
        .map(|depth| {
            let mut steps: Vec<String> = prefix.iter().cloned().collect();
            steps.extend(intermediates[..depth].iter().rev().cloned());
            steps.push(leaf.clone());
            steps.join(" ")
        })
        .collect()
}

/// Best-effort strategy for a caller-supplied expression
pub fn infer_strategy(selector: &Selector) -> LocatorStrategy {
    let expr = selector.expression.as_str();
    match selector.language {
        QueryLanguage::XPath => {
            if expr.contains("normalize-space")
                || expr.contains("text()")
                || expr.contains("@value=")
            {
                LocatorStrategy::TextContent
            } else {
                LocatorStrategy::XPath
            }
        }
        QueryLanguage::Css => {
            let single = selector.chain_length() == 1;
            if expr.contains(":nth-of-type") || expr.contains(":nth-child") {
                LocatorStrategy::RelativePosition
            } else if single
                && (expr.starts_with('#')
                    || expr.starts_with("[id=")
                    || TEST_ID_ATTRIBUTES
                        .iter()
                        .any(|a| expr.starts_with(&format!("[{}=", a))))
            {
                LocatorStrategy::StableId
            } else if single
                && ACCESSIBILITY_ATTRIBUTES
                    .iter()
                    .any(|a| expr.contains(&format!("[{}=", a)))
            {
                LocatorStrategy::AccessibilityAttribute
            } else {
                LocatorStrategy::CssPath
            }
        }
    }
}

lazy_static::lazy_static! {
    static ref QUOTED_VALUE: Regex = Regex::new(r#"=\s*["']([^"']*)["']"#).expect("valid regex");
    static ref ID_OR_CLASS: Regex = Regex::new(r"[#.]([A-Za-z0-9_-]+)").expect("valid regex");
}

/// Value an expression depends on, for scoring caller-supplied expressions
pub fn infer_signal(selector: &Selector, strategy: LocatorStrategy) -> Option<String> {
    let expr = selector.expression.as_str();
    if strategy == LocatorStrategy::XPath && !expr.contains('@') {
        return None;
    }
    if let Some(caps) = QUOTED_VALUE.captures(expr) {
        return Some(caps[1].to_string());
    }
    if selector.language == QueryLanguage::Css {
        let names: Vec<&str> = ID_OR_CLASS
            .captures_iter(expr)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if !names.is_empty() {
            return Some(names.join(" "));
        }
    }
    None
}

#[cfg(test)]
#[path = "generator_test.rs"]
mod generator_test;
