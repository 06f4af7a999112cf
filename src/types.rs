use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::errors::{LocatorError, LocatorResult};

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1920x1080)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// Element rectangle in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the point lies inside the box (edges inclusive)
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Parse "x,y,width,height"
    pub fn parse(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| anyhow::anyhow!("Invalid region. Use x,y,width,height"))?;
        if parts.len() != 4 {
            anyhow::bail!("Invalid region. Use x,y,width,height");
        }
        Ok(BoundingBox::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

/// One ancestor of a captured element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorNode {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// 1-based position among siblings with the same tag
    #[serde(default = "first_of_type")]
    pub index_of_type: usize,
}

impl AncestorNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            id: None,
            classes: Vec::new(),
            index_of_type: 1,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn nth(mut self, index_of_type: usize) -> Self {
        self.index_of_type = index_of_type;
        self
    }
}

fn first_of_type() -> usize {
    1
}

fn default_visible() -> bool {
    true
}

/// Immutable capture of one DOM element at extraction time.
///
/// `ancestors` runs from the document root down to the element's parent.
/// A snapshot is never updated: when the page changes a new one is captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Trimmed visible text
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: BoundingBox,
    /// 1-based position among siblings with the same tag
    #[serde(default = "first_of_type")]
    pub index_of_type: usize,
    #[serde(default)]
    pub ancestors: Vec<AncestorNode>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Text of the associated `<label>`, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            bounds: BoundingBox::default(),
            index_of_type: 1,
            ancestors: Vec::new(),
            visible: true,
            label: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.trim().to_string();
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_ancestor(mut self, ancestor: AncestorNode) -> Self {
        self.ancestors.push(ancestor);
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn nth(mut self, index_of_type: usize) -> Self {
        self.index_of_type = index_of_type;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Attribute value, ignoring blank values
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Lowercased `type` attribute; inputs default to "text"
    pub fn input_type(&self) -> Option<String> {
        match self.attr("type") {
            Some(t) => Some(t.to_lowercase()),
            None if self.tag == "input" => Some("text".to_string()),
            None => None,
        }
    }
}

/// Fixed set of locator derivation techniques, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorStrategy {
    #[serde(rename = "stable-id")]
    StableId,
    #[serde(rename = "accessibility-attribute")]
    AccessibilityAttribute,
    #[serde(rename = "css-path")]
    CssPath,
    #[serde(rename = "text-content")]
    TextContent,
    #[serde(rename = "relative-position")]
    RelativePosition,
    #[serde(rename = "xpath")]
    XPath,
}

impl LocatorStrategy {
    /// All strategies, most survivable first
    pub const PRIORITY: [LocatorStrategy; 6] = [
        LocatorStrategy::StableId,
        LocatorStrategy::AccessibilityAttribute,
        LocatorStrategy::CssPath,
        LocatorStrategy::TextContent,
        LocatorStrategy::RelativePosition,
        LocatorStrategy::XPath,
    ];

    /// Tie-break rank; lower wins
    pub fn priority(self) -> usize {
        match self {
            LocatorStrategy::StableId => 0,
            LocatorStrategy::AccessibilityAttribute => 1,
            LocatorStrategy::CssPath => 2,
            LocatorStrategy::TextContent => 3,
            LocatorStrategy::RelativePosition => 4,
            LocatorStrategy::XPath => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocatorStrategy::StableId => "stable-id",
            LocatorStrategy::AccessibilityAttribute => "accessibility-attribute",
            LocatorStrategy::CssPath => "css-path",
            LocatorStrategy::TextContent => "text-content",
            LocatorStrategy::RelativePosition => "relative-position",
            LocatorStrategy::XPath => "xpath",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query language understood by the page session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    Css,
    XPath,
}

/// A locator expression tagged with the language it must be evaluated in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub language: QueryLanguage,
    pub expression: String,
}

impl Selector {
    pub fn css(expression: impl Into<String>) -> Self {
        Self {
            language: QueryLanguage::Css,
            expression: expression.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self {
            language: QueryLanguage::XPath,
            expression: expression.into(),
        }
    }

    /// Parse a locator string.
    ///
    /// Accepts the prefixed forms `css=`, `xpath=`, `id=` and `name=`. Bare
    /// expressions starting with `/` or `(` are XPath, anything else is CSS.
    pub fn parse(input: &str) -> LocatorResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LocatorError::InvalidSelector("empty locator".to_string()));
        }

        if let Some((prefix, value)) = input.split_once('=') {
            let value = value.trim();
            match prefix.trim().to_lowercase().as_str() {
                "css" => return non_empty(value).map(Selector::css),
                "xpath" => return non_empty(value).map(Selector::xpath),
                "id" => {
                    return non_empty(value).map(|v| Selector::css(crate::generator::id_selector(v)));
                }
                "name" => {
                    return non_empty(value)
                        .map(|v| Selector::css(crate::generator::attribute_selector("", "name", v)));
                }
                _ => {}
            }
        }

        if input.starts_with('/') || input.starts_with('(') {
            Ok(Selector::xpath(input))
        } else {
            Ok(Selector::css(input))
        }
    }

    /// Number of compound selectors (CSS) or location steps (XPath)
    pub fn chain_length(&self) -> usize {
        match self.language {
            QueryLanguage::Css => split_top_level(&self.expression, |c| {
                c.is_whitespace() || c == '>' || c == '+' || c == '~'
            }),
            QueryLanguage::XPath => split_top_level(&self.expression, |c| c == '/'),
        }
    }
}

fn non_empty(value: &str) -> LocatorResult<&str> {
    if value.is_empty() {
        Err(LocatorError::InvalidSelector("locator prefix without a value".to_string()))
    } else {
        Ok(value)
    }
}

/// Count non-empty segments separated by `is_separator`, ignoring separators
/// inside quotes, brackets and parentheses.
fn split_top_level(expression: &str, is_separator: impl Fn(char) -> bool) -> usize {
    let mut segments = 0;
    let mut in_segment = false;
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in expression.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && quote.is_none() && is_separator(c) {
            in_segment = false;
        } else if !in_segment {
            in_segment = true;
            segments += 1;
        }
    }
    segments
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.language {
            QueryLanguage::Css => write!(f, "css={}", self.expression),
            QueryLanguage::XPath => write!(f, "xpath={}", self.expression),
        }
    }
}

/// What the caller wants located
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    /// Natural-language description, e.g. "the login button"
    Description(String),
    Css(String),
    XPath(String),
    /// Approximate position on the page
    Region(BoundingBox),
}

impl Target {
    /// Guess whether the input is a selector or a description
    pub fn infer(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();
        let prefixed = ["css=", "xpath=", "id=", "name="]
            .iter()
            .any(|p| lower.starts_with(p));
        if prefixed {
            return match Selector::parse(trimmed) {
                Ok(Selector {
                    language: QueryLanguage::XPath,
                    expression,
                }) => Target::XPath(expression),
                Ok(Selector { expression, .. }) => Target::Css(expression),
                Err(_) => Target::Description(trimmed.to_string()),
            };
        }
        if trimmed.starts_with('/') || trimmed.starts_with('(') {
            return Target::XPath(trimmed.to_string());
        }
        let selector_like = trimmed.starts_with('#')
            || trimmed.starts_with('.')
            || trimmed.starts_with('[')
            || trimmed.contains('[')
            || trimmed.contains('>')
            || trimmed.contains('#');
        if selector_like {
            Target::Css(trimmed.to_string())
        } else {
            Target::Description(trimmed.to_string())
        }
    }

    pub fn selector(&self) -> Option<Selector> {
        match self {
            Target::Css(expr) => Some(Selector::css(expr.clone())),
            Target::XPath(expr) => Some(Selector::xpath(expr.clone())),
            Target::Description(_) | Target::Region(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Description(d) => write!(f, "description '{}'", d),
            Target::Css(e) => write!(f, "css={}", e),
            Target::XPath(e) => write!(f, "xpath={}", e),
            Target::Region(b) => write!(
                f,
                "region ({}, {}, {}x{})",
                b.x, b.y, b.width, b.height
            ),
        }
    }
}

/// One addressing expression for a target element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub strategy: LocatorStrategy,
    pub selector: Selector,
    /// Reliability estimate, 0-100
    pub score: u8,
    /// Attribute or text value the expression depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    /// Elements the expression matched on the live page, when it was checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    /// Snapshot the candidate was generated from; scoring rationale only
    #[serde(skip)]
    pub source: Weak<ElementSnapshot>,
}

impl LocatorCandidate {
    pub fn new(
        strategy: LocatorStrategy,
        selector: Selector,
        signal: Option<String>,
        source: &Arc<ElementSnapshot>,
    ) -> Self {
        Self {
            strategy,
            selector,
            score: 0,
            signal,
            match_count: None,
            source: Arc::downgrade(source),
        }
    }

    /// Candidate built from a caller-supplied expression with no snapshot
    pub fn detached(strategy: LocatorStrategy, selector: Selector, signal: Option<String>) -> Self {
        Self {
            strategy,
            selector,
            score: 0,
            signal,
            match_count: None,
            source: Weak::new(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.selector.expression
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.score = score;
        self
    }

    pub fn with_match_count(mut self, count: usize) -> Self {
        self.match_count = Some(count);
        self
    }

    /// False only when a live check found zero or several matches
    pub fn is_unique(&self) -> bool {
        self.match_count.is_none_or(|count| count == 1)
    }
}

impl PartialEq for LocatorCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.strategy == other.strategy
            && self.selector == other.selector
            && self.score == other.score
            && self.signal == other.signal
            && self.match_count == other.match_count
    }
}

/// Unique candidates first, then descending score, then strategy priority
pub fn rank_order(a: &LocatorCandidate, b: &LocatorCandidate) -> Ordering {
    b.is_unique()
        .cmp(&a.is_unique())
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.strategy.priority().cmp(&b.strategy.priority()))
}

/// Candidates for one logical target, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedLocatorSet {
    candidates: Vec<LocatorCandidate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl RankedLocatorSet {
    /// Sort already-scored candidates into rank order (stable for equal keys)
    pub fn from_scored(mut candidates: Vec<LocatorCandidate>) -> Self {
        candidates.sort_by(rank_order);
        Self {
            candidates,
            suggestions: Vec::new(),
        }
    }

    pub fn single(candidate: LocatorCandidate) -> Self {
        Self::from_scored(vec![candidate])
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn best(&self) -> Option<&LocatorCandidate> {
        self.candidates.first()
    }

    pub fn top_score(&self) -> u8 {
        self.best().map(|c| c.score).unwrap_or(0)
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LocatorCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// How one candidate fared during resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Matched,
    NoMatch,
    Ambiguous { count: usize },
    Failed { error: String },
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Matched => f.write_str("matched"),
            AttemptOutcome::NoMatch => f.write_str("no match"),
            AttemptOutcome::Ambiguous { count } => write!(f, "ambiguous ({} matches)", count),
            AttemptOutcome::Failed { error } => write!(f, "error: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub strategy: LocatorStrategy,
    pub expression: String,
    pub score: u8,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ResolutionOutcome {
    /// Candidate at `index` matched exactly one element
    Resolved { index: usize },
    /// No candidate produced a single match
    Exhausted,
    Cancelled,
}

/// Outcome of running a fallback chain against a live page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub outcome: ResolutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<LocatorCandidate>,
    /// Matches of the winning candidate (1 when resolved)
    pub match_count: usize,
    pub attempts: Vec<ResolutionAttempt>,
    pub elapsed_ms: u64,
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Resolved { .. })
    }

    pub fn attempted_expressions(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.expression.as_str()).collect()
    }

    /// Winning candidate, or the matching error
    pub fn into_winner(self) -> LocatorResult<LocatorCandidate> {
        match (self.outcome, self.winner) {
            (ResolutionOutcome::Resolved { .. }, Some(winner)) => Ok(winner),
            (ResolutionOutcome::Cancelled, _) => Err(LocatorError::Cancelled),
            _ => Err(LocatorError::Exhausted {
                attempts: self.attempts,
            }),
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
