//! Form detection and semantic field classification

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{LocatorError, LocatorResult};
use crate::extractor::tokenize;
use crate::generator::CandidateGenerator;
use crate::page::{FORM_CONTROLS, PageSession, wait_for};
use crate::resolver::check_live;
use crate::scorer::RobustnessScorer;
use crate::types::{AncestorNode, ElementSnapshot, RankedLocatorSet, Selector};

/// Closed vocabulary of field meanings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticField {
    Name,
    Email,
    Password,
    Phone,
    Message,
    Submit,
    Unknown,
}

impl SemanticField {
    pub fn as_str(self) -> &'static str {
        match self {
            SemanticField::Name => "name",
            SemanticField::Email => "email",
            SemanticField::Password => "password",
            SemanticField::Phone => "phone",
            SemanticField::Message => "message",
            SemanticField::Submit => "submit",
            SemanticField::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    Password,
    Email,
    Select,
    SubmitButton,
}

/// One control of a detected form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormFieldDescriptor {
    /// Unique key within the form: the semantic name, suffixed on repeats
    pub key: String,
    pub field: SemanticField,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub required: bool,
    pub snapshot: Arc<ElementSnapshot>,
    pub locators: RankedLocatorSet,
}

/// Classified controls in document order, plus the ones nothing matched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormMap {
    pub fields: Vec<FormFieldDescriptor>,
    pub unknown: Vec<FormFieldDescriptor>,
}

impl FormMap {
    pub fn get(&self, key: &str) -> Option<&FormFieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// First field with the given meaning
    pub fn first_of(&self, field: SemanticField) -> Option<&FormFieldDescriptor> {
        self.fields.iter().find(|f| f.field == field)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const SUBMIT_PHRASES: [&str; 13] = [
    "submit", "send", "login", "log in", "sign in", "signin", "sign up", "signup", "register",
    "create", "continue", "next", "save",
];

/// Input types that never carry free text
const NON_TEXT_INPUTS: [&str; 9] = [
    "checkbox", "radio", "file", "range", "color", "date", "time", "number", "search",
];

fn has_submit_phrase(text: &str) -> bool {
    let text = text.to_lowercase();
    SUBMIT_PHRASES.iter().any(|p| text.contains(p))
}

fn evidence_tokens(snapshot: &ElementSnapshot) -> Vec<String> {
    let mut tokens = Vec::new();
    for source in [
        snapshot.label.as_deref(),
        snapshot.attr("placeholder"),
        snapshot.attr("name"),
        snapshot.attr("id"),
        snapshot.attr("aria-label"),
        snapshot.attr("autocomplete"),
    ]
    .into_iter()
    .flatten()
    {
        tokens.extend(tokenize(source));
    }
    tokens
}

fn any_token(tokens: &[String], vocabulary: &[&str]) -> bool {
    tokens.iter().any(|t| vocabulary.contains(&t.as_str()))
}

fn is_submit(snapshot: &ElementSnapshot) -> bool {
    let caption = format!(
        "{} {}",
        snapshot.text,
        snapshot.attr("value").unwrap_or_default()
    );
    match snapshot.tag.as_str() {
        "button" => match snapshot.input_type().as_deref() {
            Some("reset") => false,
            Some("button") => has_submit_phrase(&caption),
            _ => true,
        },
        "input" => match snapshot.input_type().as_deref() {
            Some("submit" | "image") => true,
            Some("button") => has_submit_phrase(&caption),
            _ => false,
        },
        _ => snapshot.attr("role") == Some("button") && has_submit_phrase(&caption),
    }
}

/// Semantic meaning of one control. Rules run in a fixed order and the first
/// match wins.
pub fn classify(snapshot: &ElementSnapshot) -> SemanticField {
    if is_submit(snapshot) {
        return SemanticField::Submit;
    }

    let input_type = snapshot.input_type().unwrap_or_default();
    let buttonish = matches!(snapshot.tag.as_str(), "button")
        || snapshot.attr("role") == Some("button")
        || matches!(input_type.as_str(), "button" | "reset");
    if buttonish || NON_TEXT_INPUTS.contains(&input_type.as_str()) {
        return SemanticField::Unknown;
    }

    let tokens = evidence_tokens(snapshot);
    if input_type == "password" || any_token(&tokens, &["password", "passwd", "pwd", "pass"]) {
        SemanticField::Password
    } else if input_type == "email" || any_token(&tokens, &["email", "mail"]) {
        SemanticField::Email
    } else if input_type == "tel" || any_token(&tokens, &["phone", "tel", "mobile"]) {
        SemanticField::Phone
    } else if snapshot.tag == "textarea"
        || any_token(&tokens, &["message", "comment", "msg", "body", "feedback"])
    {
        SemanticField::Message
    } else if any_token(
        &tokens,
        &[
            "name", "fullname", "firstname", "lastname", "username", "user", "login",
        ],
    ) {
        SemanticField::Name
    } else {
        SemanticField::Unknown
    }
}

fn field_kind(snapshot: &ElementSnapshot, field: SemanticField) -> FieldKind {
    if field == SemanticField::Submit {
        return FieldKind::SubmitButton;
    }
    match (snapshot.tag.as_str(), snapshot.input_type().as_deref()) {
        ("select", _) => FieldKind::Select,
        (_, Some("password")) => FieldKind::Password,
        (_, Some("email")) => FieldKind::Email,
        _ if field == SemanticField::Email => FieldKind::Email,
        _ => FieldKind::Text,
    }
}

fn field_label(snapshot: &ElementSnapshot) -> Option<String> {
    snapshot
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| snapshot.attr("placeholder"))
        .or_else(|| snapshot.attr("aria-label"))
        .or_else(|| snapshot.attr("name"))
        .map(str::to_string)
}

fn is_required(snapshot: &ElementSnapshot) -> bool {
    snapshot.attributes.contains_key("required") || snapshot.attr("aria-required") == Some("true")
}

fn skipped(snapshot: &ElementSnapshot) -> bool {
    !snapshot.visible
        || (snapshot.tag == "input"
            && matches!(snapshot.input_type().as_deref(), Some("hidden" | "reset")))
}

type NodePath = Vec<(String, usize)>;

fn ancestor_path(ancestors: &[AncestorNode]) -> NodePath {
    ancestors
        .iter()
        .map(|a| (a.tag.clone(), a.index_of_type))
        .collect()
}

/// Path of the enclosing `<form>`, if any
fn form_path(snapshot: &ElementSnapshot) -> Option<NodePath> {
    let end = snapshot.ancestors.iter().rposition(|a| a.tag == "form")?;
    Some(ancestor_path(&snapshot.ancestors[..=end]))
}

fn within(snapshot: &ElementSnapshot, scope: &[(String, usize)]) -> bool {
    let path = ancestor_path(&snapshot.ancestors);
    path.len() >= scope.len() && path[..scope.len()] == *scope
}

/// Keep the controls inside the first form that has any; everything when the
/// page has no form element.
pub fn first_form_group(controls: Vec<ElementSnapshot>) -> Vec<ElementSnapshot> {
    match controls.iter().find_map(form_path) {
        Some(form) => controls.into_iter().filter(|c| within(c, &form)).collect(),
        None => controls,
    }
}

/// Runs extraction, generation and scoring over every control of a form
#[derive(Debug, Clone)]
pub struct FormFieldMapper {
    pub generator: CandidateGenerator,
    pub scorer: RobustnessScorer,
    pub poll_interval: Duration,
}

impl Default for FormFieldMapper {
    fn default() -> Self {
        Self::new(
            CandidateGenerator::default(),
            RobustnessScorer::default(),
            Duration::from_millis(100),
        )
    }
}

impl FormFieldMapper {
    pub fn new(
        generator: CandidateGenerator,
        scorer: RobustnessScorer,
        poll_interval: Duration,
    ) -> Self {
        Self {
            generator,
            scorer,
            poll_interval,
        }
    }

    /// Build a ranked set for one control
    pub fn locators_for(&self, snapshot: &Arc<ElementSnapshot>) -> RankedLocatorSet {
        self.scorer
            .rank(self.generator.generate(snapshot), snapshot)
    }

    /// Classify the controls of the first form on the page, or of the element
    /// `scope` selects.
    pub async fn map_form<P: PageSession + ?Sized>(
        &self,
        page: &P,
        scope: Option<&Selector>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<FormMap> {
        let controls = self.controls(page, timeout, cancel).await?;
        let controls = match scope {
            Some(selector) => {
                let container = page
                    .snapshots(selector)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| LocatorError::NotFound(selector.to_string()))?;
                let mut path = ancestor_path(&container.ancestors);
                path.push((container.tag.clone(), container.index_of_type));
                controls.into_iter().filter(|c| within(c, &path)).collect()
            }
            None => first_form_group(controls),
        };

        let mut ranked = Vec::with_capacity(controls.len());
        for control in controls.into_iter().filter(|c| !skipped(c)) {
            let snapshot = Arc::new(control);
            let mut candidates = self.generator.generate(&snapshot);
            check_live(page, &snapshot, &mut candidates).await;
            let locators = self.scorer.rank(candidates, &snapshot);
            ranked.push((snapshot, locators));
        }

        let map = self.assemble(ranked);
        info!(
            "Mapped form: {} classified, {} unknown",
            map.fields.len(),
            map.unknown.len()
        );
        Ok(map)
    }

    /// Classify captured controls in document order
    pub fn classify_all(&self, controls: Vec<ElementSnapshot>) -> FormMap {
        let ranked = controls
            .into_iter()
            .filter(|c| !skipped(c))
            .map(|c| {
                let snapshot = Arc::new(c);
                let locators = self.locators_for(&snapshot);
                (snapshot, locators)
            })
            .collect();
        self.assemble(ranked)
    }

    fn assemble(&self, ranked: Vec<(Arc<ElementSnapshot>, RankedLocatorSet)>) -> FormMap {
        let mut map = FormMap::default();
        let mut seen: HashMap<SemanticField, usize> = HashMap::new();

        for (snapshot, locators) in ranked {
            let field = classify(&snapshot);
            let occurrence = seen.entry(field).or_insert(0);
            *occurrence += 1;
            let key = if *occurrence == 1 {
                field.as_str().to_string()
            } else {
                format!("{}_{}", field.as_str(), occurrence)
            };
            debug!("Control <{}> classified as {}", snapshot.tag, key);

            let descriptor = FormFieldDescriptor {
                key,
                field,
                kind: field_kind(&snapshot, field),
                label: field_label(&snapshot),
                required: is_required(&snapshot),
                snapshot,
                locators,
            };
            if field == SemanticField::Unknown {
                map.unknown.push(descriptor);
            } else {
                map.fields.push(descriptor);
            }
        }
        map
    }

    async fn controls<P: PageSession + ?Sized>(
        &self,
        page: &P,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocatorResult<Vec<ElementSnapshot>> {
        let selector = &Selector::css(FORM_CONTROLS.join(", "));
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
        found.ok_or_else(|| LocatorError::NotFound("form controls".to_string()))
    }
}

#[cfg(test)]
#[path = "form_test.rs"]
mod form_test;
