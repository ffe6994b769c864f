//! Keyword and pattern triggers that decide which reviewers a directive needs.
//!
//! A trigger pairs a phrase with a reviewer. Keyword triggers match as a
//! case-insensitive substring. Pattern triggers compile into a case-insensitive
//! word-bounded regex: whitespace in the phrase matches any run of whitespace,
//! `-` or `_`, and a trailing `*` matches the rest of a word.
//!
//! All triggers whose context matches are evaluated. Per reviewer only the
//! highest-priority match survives; the result is ordered by descending
//! priority with ties kept in first-seen order.
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::{ReviewerCode, Trigger, TriggerContext, TriggerDispatcher};
//! use gatekeeper_common::Priority;
//!
//! let dispatcher = TriggerDispatcher::new(vec![
//!     Trigger::keyword("refactor", TriggerContext::Directive, Priority::new(95).unwrap(), ReviewerCode::Regression),
//!     Trigger::pattern("backward compat*", TriggerContext::Plan, Priority::new(90).unwrap(), ReviewerCode::Regression),
//! ]).unwrap();
//!
//! let activations = dispatcher.dispatch("Refactor the parser", TriggerContext::Directive);
//! assert_eq!(activations.len(), 1);
//! assert_eq!(activations[0].reviewer, ReviewerCode::Regression);
//! ```

use std::collections::HashMap;

use gatekeeper_common::Priority;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reviewers::ReviewerCode;
use crate::errors::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Keyword,
    Pattern,
}

/// Which text a trigger is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerContext {
    /// Directive title and description.
    Directive,
    /// The plan document.
    Plan,
}

impl TriggerContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Plan => "plan",
        }
    }
}

impl std::str::FromStr for TriggerContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "directive" => Ok(Self::Directive),
            "plan" => Ok(Self::Plan),
            _ => Err(format!("Invalid trigger context: {}", s)),
        }
    }
}

/// A configured trigger. Read-only at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub phrase: String,
    pub kind: TriggerKind,
    pub context: TriggerContext,
    pub priority: Priority,
    pub reviewer: ReviewerCode,
}

impl Trigger {
    pub fn keyword(
        phrase: impl Into<String>,
        context: TriggerContext,
        priority: Priority,
        reviewer: ReviewerCode,
    ) -> Self {
        Self {
            phrase: phrase.into(),
            kind: TriggerKind::Keyword,
            context,
            priority,
            reviewer,
        }
    }

    pub fn pattern(
        phrase: impl Into<String>,
        context: TriggerContext,
        priority: Priority,
        reviewer: ReviewerCode,
    ) -> Self {
        Self {
            phrase: phrase.into(),
            kind: TriggerKind::Pattern,
            context,
            priority,
            reviewer,
        }
    }
}

/// A reviewer selected for a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerActivation {
    pub reviewer: ReviewerCode,
    pub priority: Priority,
    pub matched_phrase: String,
    pub context: TriggerContext,
}

#[derive(Debug)]
enum Matcher {
    Keyword(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, text: &str, lowered: &str) -> bool {
        match self {
            Self::Keyword(needle) => lowered.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

#[derive(Debug)]
struct CompiledTrigger {
    trigger: Trigger,
    matcher: Matcher,
}

#[derive(Debug)]
pub struct TriggerDispatcher {
    triggers: Vec<CompiledTrigger>,
}

impl TriggerDispatcher {
    /// Compile a trigger table. Blank phrases and invalid patterns are rejected.
    pub fn new(triggers: Vec<Trigger>) -> Result<Self, GateError> {
        let mut compiled = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let phrase = trigger.phrase.trim();
            if phrase.is_empty() || phrase == "*" {
                return Err(GateError::Config(format!(
                    "trigger for {} has a blank phrase",
                    trigger.reviewer
                )));
            }
            let matcher = match trigger.kind {
                TriggerKind::Keyword => Matcher::Keyword(phrase.to_lowercase()),
                TriggerKind::Pattern => Matcher::Pattern(compile_pattern(phrase).map_err(|e| {
                    GateError::Config(format!("invalid trigger pattern '{}': {}", phrase, e))
                })?),
            };
            compiled.push(CompiledTrigger { trigger, matcher });
        }
        Ok(Self { triggers: compiled })
    }

    /// Dispatcher over [`default_triggers`].
    pub fn with_defaults() -> Result<Self, GateError> {
        Self::new(default_triggers())
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().map(|c| &c.trigger)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn dispatch(&self, text: &str, context: TriggerContext) -> Vec<ReviewerActivation> {
        self.dispatch_all(&[(text, context)])
    }

    /// Dispatch several texts at once, deduplicating reviewers across all of them.
    pub fn dispatch_all(&self, inputs: &[(&str, TriggerContext)]) -> Vec<ReviewerActivation> {
        let mut selected: Vec<ReviewerActivation> = Vec::new();
        let mut index: HashMap<ReviewerCode, usize> = HashMap::new();

        for (text, context) in inputs {
            if text.trim().is_empty() {
                continue;
            }
            let lowered = text.to_lowercase();
            for compiled in self.triggers.iter().filter(|c| c.trigger.context == *context) {
                if !compiled.matcher.is_match(text, &lowered) {
                    continue;
                }
                let trigger = &compiled.trigger;
                let activation = ReviewerActivation {
                    reviewer: trigger.reviewer.clone(),
                    priority: trigger.priority,
                    matched_phrase: trigger.phrase.clone(),
                    context: *context,
                };
                match index.get(&trigger.reviewer) {
                    Some(&i) => {
                        if activation.priority > selected[i].priority {
                            selected[i] = activation;
                        }
                    }
                    None => {
                        index.insert(trigger.reviewer.clone(), selected.len());
                        selected.push(activation);
                    }
                }
            }
        }

        // Stable sort keeps first-seen order among equal priorities.
        selected.sort_by(|a, b| b.priority.cmp(&a.priority));
        selected
    }
}

/// Compile a pattern phrase into a case-insensitive word-bounded regex.
///
/// ```
/// use gatekeeper::review::compile_pattern;
///
/// let re = compile_pattern("backward compat*").unwrap();
/// assert!(re.is_match("keep Backward-Compatibility intact"));
/// assert!(!re.is_match("backwardcompatible"));
/// ```
pub fn compile_pattern(phrase: &str) -> Result<Regex, regex::Error> {
    let phrase = phrase.trim();
    let (body, wildcard) = match phrase.strip_suffix('*') {
        Some(stripped) => (stripped.trim_end(), true),
        None => (phrase, false),
    };

    let joined = body
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s\-_]+");

    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut source = String::from("(?i)");
    if is_word(body.chars().next()) {
        source.push_str(r"\b");
    }
    source.push_str(&joined);
    if wildcard {
        source.push_str(r"\w*");
    }
    if wildcard || is_word(body.chars().last()) {
        source.push_str(r"\b");
    }
    Regex::new(&source)
}

/// Built-in trigger table, replaced wholesale by `[[triggers]]` in configuration.
pub fn default_triggers() -> Vec<Trigger> {
    use ReviewerCode as R;
    use TriggerContext::{Directive, Plan};

    let p = Priority::saturating;
    vec![
        Trigger::pattern("vulnerab*", Directive, p(95), R::Security),
        Trigger::keyword("authentication", Directive, p(90), R::Security),
        Trigger::pattern("authoriz*", Directive, p(90), R::Security),
        Trigger::keyword("security", Directive, p(85), R::Security),
        Trigger::pattern("row level security", Plan, p(90), R::Database),
        Trigger::keyword("migration", Directive, p(85), R::Database),
        Trigger::keyword("schema", Plan, p(80), R::Database),
        Trigger::keyword("database", Directive, p(80), R::Database),
        Trigger::pattern("test coverage", Plan, p(80), R::Testing),
        Trigger::keyword("e2e", Directive, p(75), R::Testing),
        Trigger::pattern("end to end", Directive, p(75), R::Testing),
        Trigger::keyword("accessibility", Directive, p(75), R::Design),
        Trigger::pattern("user interface", Directive, p(70), R::Design),
        Trigger::keyword("component", Plan, p(60), R::Design),
        Trigger::keyword("performance", Directive, p(80), R::Performance),
        Trigger::keyword("latency", Directive, p(80), R::Performance),
        Trigger::pattern("optimi*", Directive, p(70), R::Performance),
        Trigger::keyword("refactor", Directive, p(95), R::Regression),
        Trigger::pattern("backward compatibility", Plan, p(95), R::Regression),
        Trigger::pattern("breaking change*", Directive, p(90), R::Regression),
        Trigger::keyword("documentation", Directive, p(60), R::Documentation),
        Trigger::pattern("high risk", Directive, p(85), R::Risk),
        Trigger::keyword("rollback", Plan, p(75), R::Risk),
        Trigger::pattern("dependenc*", Directive, p(70), R::Dependency),
        Trigger::keyword("upgrade", Directive, p(65), R::Dependency),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prio(v: i64) -> Priority {
        Priority::new(v).unwrap()
    }

    #[test]
    fn test_keyword_is_case_insensitive_substring() {
        let d = TriggerDispatcher::new(vec![Trigger::keyword(
            "Schema",
            TriggerContext::Directive,
            prio(80),
            ReviewerCode::Database,
        )])
        .unwrap();
        assert_eq!(d.dispatch("update SCHEMAS", TriggerContext::Directive).len(), 1);
        assert!(d.dispatch("update schemas", TriggerContext::Plan).is_empty());
    }

    #[test]
    fn test_pattern_whitespace_matches_separators() {
        let re = compile_pattern("row level security").unwrap();
        assert!(re.is_match("enable row-level_security now"));
        assert!(re.is_match("ROW   LEVEL SECURITY"));
        assert!(!re.is_match("arrow level security"));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let re = compile_pattern("c++ upgrade").unwrap();
        assert!(re.is_match("plan a C++ upgrade"));
        let dots = compile_pattern("v1.2").unwrap();
        assert!(!dots.is_match("v172"));
    }

    #[test]
    fn test_highest_priority_wins_per_reviewer() {
        let d = TriggerDispatcher::new(vec![
            Trigger::keyword("auth", TriggerContext::Directive, prio(70), ReviewerCode::Security),
            Trigger::keyword("login", TriggerContext::Directive, prio(90), ReviewerCode::Security),
            Trigger::keyword("login", TriggerContext::Directive, prio(80), ReviewerCode::Testing),
        ])
        .unwrap();
        let out = d.dispatch("auth login flow", TriggerContext::Directive);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].reviewer, ReviewerCode::Security);
        assert_eq!(out[0].priority, prio(90));
        assert_eq!(out[0].matched_phrase, "login");
        assert_eq!(out[1].reviewer, ReviewerCode::Testing);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let d = TriggerDispatcher::new(vec![
            Trigger::keyword("b", TriggerContext::Directive, prio(50), ReviewerCode::Risk),
            Trigger::keyword("a", TriggerContext::Directive, prio(50), ReviewerCode::Design),
            Trigger::keyword("c", TriggerContext::Directive, prio(60), ReviewerCode::Testing),
        ])
        .unwrap();
        let order: Vec<_> = d
            .dispatch("a b c", TriggerContext::Directive)
            .into_iter()
            .map(|a| a.reviewer)
            .collect();
        assert_eq!(
            order,
            vec![ReviewerCode::Testing, ReviewerCode::Risk, ReviewerCode::Design]
        );
    }

    #[test]
    fn test_dispatch_all_merges_contexts() {
        let d = TriggerDispatcher::new(vec![
            Trigger::keyword("refactor", TriggerContext::Directive, prio(95), ReviewerCode::Regression),
            Trigger::pattern(
                "backward compatibility",
                TriggerContext::Plan,
                prio(95),
                ReviewerCode::Regression,
            ),
        ])
        .unwrap();
        let text = "Refactor the widget for backward compatibility";
        let out = d.dispatch_all(&[(text, TriggerContext::Directive), (text, TriggerContext::Plan)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reviewer, ReviewerCode::Regression);
        assert_eq!(out[0].priority, prio(95));
        assert_eq!(out[0].context, TriggerContext::Directive);
    }

    #[test]
    fn test_invalid_triggers_are_rejected() {
        let blank = TriggerDispatcher::new(vec![Trigger::keyword(
            "  ",
            TriggerContext::Directive,
            prio(10),
            ReviewerCode::Risk,
        )]);
        assert!(matches!(blank, Err(GateError::Config(_))));
    }

    #[test]
    fn test_default_table_compiles() {
        let d = TriggerDispatcher::with_defaults().unwrap();
        assert_eq!(d.len(), default_triggers().len());
        let out = d.dispatch(
            "Fix the authentication vulnerability in the login service",
            TriggerContext::Directive,
        );
        assert_eq!(out[0].reviewer, ReviewerCode::Security);
        assert_eq!(out[0].priority, prio(95));
    }

    #[test]
    fn test_trigger_deserializes_from_toml() {
        let t: Trigger = toml::from_str(
            r#"
            phrase = "breaking change"
            kind = "pattern"
            context = "directive"
            priority = 90
            reviewer = "regression"
            "#,
        )
        .unwrap();
        assert_eq!(t.reviewer, ReviewerCode::Regression);
        let named: Result<Trigger, _> = toml::from_str(
            r#"
            phrase = "x"
            kind = "keyword"
            context = "plan"
            priority = "high"
            reviewer = "RISK"
            "#,
        );
        assert!(named.is_err());
    }
}
