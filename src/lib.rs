//! # locprobe
#![allow(clippy::uninlined_format_args)]
//!
//! Resilient locator synthesis and scoring for browser UI tests.
//!
//! Describe an element ("the login button", a CSS selector, an XPath or a
//! rough region of the page) and get back every durable way to address it,
//! scored for how well each will survive markup changes. A fallback-chain
//! resolver then tries those locators in order against the live page.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Rank locators for an element described in plain words
//! locprobe find "https://example.com/login" "the login button"
//!
//! # Same, starting from a CSS selector, human-readable output
//! locprobe dynamic "https://example.com" "form button" --format simple
//!
//! # Score an existing locator
//! locprobe evaluate "https://example.com" "xpath=/html/body/div[3]/button"
//!
//! # Map the first form on a page
//! locprobe detect-form "https://example.com/contact"
//!
//! # Fill and submit it
//! locprobe fill-form "https://example.com/contact" \
//!   --field "email=>me@example.com" --field "message=>Hello" --submit
//!
//! # Log in with detected fields
//! locprobe authenticate "https://example.com/login" \
//!   --username alice --password secret --success-url /dashboard
//! ```
//!
//! Browser options: `--browser chrome`, `--webdriver-url`, `--viewport
//! 1280x720`, `--no-headless`. Engine thresholds and scoring weights are
//! read from `--config FILE` or `~/.locprobe/config.json`.
//!
//! ## Library Usage
//!
//! ```no_run
//! use locprobe::{Browser, BrowserType, LocatorEngine, PageOptions, PageSession, Session, Target};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let browser = Browser::connect(BrowserType::Firefox, None, None, true).await?;
//! browser.goto("https://example.com/login").await?;
//!
//! let engine = LocatorEngine::default();
//! let mut session = Session::new(browser);
//! let report = engine
//!     .find_locator(
//!         &mut session,
//!         &Target::Description("login button".into()),
//!         PageOptions::default(),
//!     )
//!     .await?;
//!
//! for candidate in report.locators.iter() {
//!     println!("{} {} {}", candidate.score, candidate.strategy, candidate.selector);
//! }
//! # Ok(())
//! # }
//! ```

/// Tunable thresholds and scoring weights
pub mod config;

/// Engine operations
pub mod engine;

/// Error kinds and exit codes
pub mod errors;

/// Target resolution and element capture
pub mod extractor;

/// Form detection and field classification
pub mod form;

/// Locator candidate generation
pub mod generator;

/// Page session capability
pub mod page;

/// Fallback chain execution
pub mod resolver;

/// Robustness scoring
pub mod scorer;

/// Login state
pub mod session;

/// Shared data model
pub mod types;

/// WebDriver-backed page session
pub mod webdriver;

pub use config::{EngineConfig, ScoringWeights};
pub use engine::{FieldInput, LocatorEngine, LocatorReport, PageOptions, RobustnessReport};
pub use errors::{AuthStep, FormFailure, LocatorError, LocatorResult};
pub use extractor::ElementExtractor;
pub use form::{FieldKind, FormFieldDescriptor, FormFieldMapper, FormMap, SemanticField};
pub use generator::CandidateGenerator;
pub use page::PageSession;
pub use resolver::FallbackResolver;
pub use scorer::RobustnessScorer;
pub use session::{
    AuthState, Credentials, LoginLocators, LoginRequest, Session, SuccessIndicator,
};
pub use types::{
    AncestorNode, AttemptOutcome, BoundingBox, ElementSnapshot, LocatorCandidate,
    LocatorStrategy, OutputFormat, QueryLanguage, RankedLocatorSet, ResolutionAttempt,
    ResolutionOutcome, ResolutionResult, Selector, Target, ViewportSize,
};
pub use webdriver::{Browser, BrowserType};
