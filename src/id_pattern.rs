use std::borrow::Cow;
use std::fmt;

use crate::{Error, Result};

/// Compiled identifier pattern used by [`crate::Eligibility::Pattern`].
#[derive(Clone)]
pub struct IdPattern {
    source: String,
    backend: fancy_regex::Regex,
}

impl IdPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let backend = fancy_regex::Regex::new(pattern).map_err(|err| {
            Error::InvalidConfig(format!("invalid identifier pattern {pattern:?}: {err}"))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            backend,
        })
    }

    /// Pattern for chapter identifiers: `prefix`, a number, `-`, a number.
    pub fn chapter(prefix: &str) -> Result<Self> {
        Self::new(&format!(r"^{}\d+-\d+$", escape(prefix)))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// A match that hits the backtracking limit counts as a miss.
    pub fn is_match(&self, input: &str) -> bool {
        self.backend.is_match(input).unwrap_or(false)
    }
}

impl fmt::Debug for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IdPattern").field(&self.source).finish()
    }
}

pub(crate) fn escape(value: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(value.len());
    let mut changed = false;

    for ch in value.chars() {
        if is_regex_meta(ch) {
            out.push('\\');
            changed = true;
        }
        out.push(ch);
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(value)
    }
}

fn is_regex_meta(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '/'
    )
}
