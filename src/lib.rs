//! Chapter focusing for static book pages.
//!
//! A page holds one container of chapter sections. The URL fragment names the
//! chapter to reveal; the controller marks that chapter, its ancestors, and the
//! container with classes the stylesheet uses to dim everything else. The
//! special fragment `#random` resolves to a uniformly chosen chapter and is
//! rewritten in place so the resulting URL can be shared.
//!
//! The controller runs inside [`Page`], a deterministic single-threaded host
//! built from HTML: DOM tree, location and history, capture/bubble event
//! dispatch, a virtual clock, and a seedable random source.
//!
//! ```
//! use chapter_focus::{FocusConfig, Page};
//!
//! # fn main() -> chapter_focus::Result<()> {
//! let html = r#"
//!   <a id='randomChapterLink' href='#'>Random chapter</a>
//!   <div id='bookContainer'>
//!     <section id='book1-1'>One</section>
//!     <section id='book1-2'>Two</section>
//!   </div>
//! "#;
//! let mut page = Page::from_html_with_url("https://example.test/book.html#book1-2", html)?;
//! page.attach(FocusConfig::default())?;
//! page.assert_class("#bookContainer", "fade-active", true)?;
//! page.assert_class("#book1-2", "visible-section", true)?;
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;
use std::fmt;

mod config;
mod controller;
mod dom;
mod events;
mod host;
mod html;
mod id_pattern;
mod location;
mod page;
mod resolver;
mod section_index;
mod selector;
mod timers;
mod visibility;

pub use config::{Eligibility, FocusConfig, MarkerClasses};
pub use controller::{ChapterFocus, ControllerId};
pub use dom::{Dom, NodeId};
pub use host::{Diagnostic, ScrollBehavior, ScrollBlock, ScrollRecord};
pub use id_pattern::IdPattern;
pub use location::FragmentWrite;
pub use page::Page;
pub use resolver::{
    FocusState, FragmentRef, Rejection, Resolution, ResolvedTarget, parse_fragment, resolve,
};
pub use section_index::SectionIndex;
pub use timers::PendingTimer;
pub use visibility::{Applied, apply, clear};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    SelectorNotFound(String),
    UnsupportedSelector(String),
    InvalidConfig(String),
    MalformedFragment(String),
    Runtime(String),
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::InvalidConfig(msg) => write!(f, "invalid focus config: {msg}"),
            Self::MalformedFragment(fragment) => write!(f, "malformed fragment: {fragment}"),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests;
