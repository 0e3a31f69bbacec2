//! Controller configuration.

use std::fmt;
use std::sync::Arc;

use crate::host::{ScrollBehavior, ScrollBlock};
use crate::id_pattern::IdPattern;
use crate::{Error, Result};

/// Which identifiers inside the container count as chapter sections.
#[derive(Clone, Default)]
pub enum Eligibility {
    /// Any element carrying a non-empty id.
    #[default]
    AnyId,
    /// Ids matching a regular expression.
    Pattern(IdPattern),
    /// Ids accepted by an arbitrary predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Eligibility {
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::Pattern(IdPattern::new(pattern)?))
    }

    /// `prefix` followed by `number-number`, e.g. `book3-7`.
    pub fn chapter(prefix: &str) -> Result<Self> {
        Ok(Self::Pattern(IdPattern::chapter(prefix)?))
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    pub fn accepts(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        match self {
            Self::AnyId => true,
            Self::Pattern(pattern) => pattern.is_match(id),
            Self::Predicate(predicate) => predicate(id),
        }
    }

    pub fn is_any_id(&self) -> bool {
        matches!(self, Self::AnyId)
    }
}

impl fmt::Debug for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyId => f.write_str("AnyId"),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Class names the stylesheet keys the dimming off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerClasses {
    /// On the container while a chapter is focused.
    pub focus_active: String,
    /// On the focused chapter.
    pub directly_visible: String,
    /// On every element between the focused chapter and the container.
    pub ancestor_visible: String,
}

impl Default for MarkerClasses {
    fn default() -> Self {
        Self {
            focus_active: "fade-active".to_string(),
            directly_visible: "visible-section".to_string(),
            ancestor_visible: "ancestor-visible".to_string(),
        }
    }
}

impl MarkerClasses {
    /// Classes that make an element part of the visible region.
    pub(crate) fn region(&self) -> [&str; 2] {
        [
            self.directly_visible.as_str(),
            self.ancestor_visible.as_str(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct FocusConfig {
    pub container_id: String,
    /// Random-chapter control; `None` disables the control entirely.
    pub trigger_id: Option<String>,
    /// Fragments that resolve to a random chapter.
    pub random_tokens: Vec<String>,
    pub markers: MarkerClasses,
    pub eligibility: Eligibility,
    /// Delay between applying markers and scrolling the chapter into view.
    pub scroll_delay_ms: i64,
    /// Delay before resolving a random fragment present at page load.
    pub startup_delay_ms: i64,
    pub scroll_behavior: ScrollBehavior,
    pub scroll_block: ScrollBlock,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            container_id: "bookContainer".to_string(),
            trigger_id: Some("randomChapterLink".to_string()),
            random_tokens: vec!["random".to_string()],
            markers: MarkerClasses::default(),
            eligibility: Eligibility::AnyId,
            scroll_delay_ms: 50,
            startup_delay_ms: 0,
            scroll_behavior: ScrollBehavior::Smooth,
            scroll_block: ScrollBlock::Start,
        }
    }
}

impl FocusConfig {
    pub fn with_container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = id.into();
        self
    }

    pub fn with_trigger_id(mut self, id: Option<&str>) -> Self {
        self.trigger_id = id.map(str::to_string);
        self
    }

    pub fn with_random_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.random_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_markers(mut self, markers: MarkerClasses) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn with_scroll_delay_ms(mut self, delay_ms: i64) -> Self {
        self.scroll_delay_ms = delay_ms;
        self
    }

    pub fn with_startup_delay_ms(mut self, delay_ms: i64) -> Self {
        self.startup_delay_ms = delay_ms;
        self
    }

    pub fn with_scroll(mut self, behavior: ScrollBehavior, block: ScrollBlock) -> Self {
        self.scroll_behavior = behavior;
        self.scroll_block = block;
        self
    }

    pub fn is_random_token(&self, fragment: &str) -> bool {
        self.random_tokens.iter().any(|token| token == fragment)
    }

    pub fn validate(&self) -> Result<()> {
        check_token("container_id", &self.container_id)?;
        if let Some(trigger_id) = &self.trigger_id {
            check_token("trigger_id", trigger_id)?;
            if *trigger_id == self.container_id {
                return Err(Error::InvalidConfig(
                    "trigger_id must differ from container_id".into(),
                ));
            }
        }

        if self.random_tokens.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one random token is required".into(),
            ));
        }
        for token in &self.random_tokens {
            check_token("random token", token)?;
            if *token == self.container_id {
                return Err(Error::InvalidConfig(format!(
                    "random token {token:?} collides with container_id"
                )));
            }
        }

        let MarkerClasses {
            focus_active,
            directly_visible,
            ancestor_visible,
        } = &self.markers;
        check_token("focus_active class", focus_active)?;
        check_token("directly_visible class", directly_visible)?;
        check_token("ancestor_visible class", ancestor_visible)?;
        if focus_active == directly_visible
            || focus_active == ancestor_visible
            || directly_visible == ancestor_visible
        {
            return Err(Error::InvalidConfig(
                "marker class names must be distinct".into(),
            ));
        }

        if self.scroll_delay_ms < 0 {
            return Err(Error::InvalidConfig(
                "scroll_delay_ms must be non-negative".into(),
            ));
        }
        if self.startup_delay_ms < 0 {
            return Err(Error::InvalidConfig(
                "startup_delay_ms must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

fn check_token(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidConfig(format!("{what} must not be empty")));
    }
    if value.chars().any(|ch| ch.is_ascii_whitespace()) {
        return Err(Error::InvalidConfig(format!(
            "{what} must not contain whitespace: {value:?}"
        )));
    }
    Ok(())
}
