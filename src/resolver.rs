//! Fragment interpretation, kept free of DOM mutation.

use std::fmt;

use crate::config::FocusConfig;
use crate::dom::{Dom, NodeId};
use crate::location::decode_fragment;
use crate::section_index::SectionIndex;
use crate::{Error, Result};

/// What the controller is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    NoTarget,
    Target(NodeId),
}

impl FocusState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Target(_))
    }

    pub fn target(self) -> Option<NodeId> {
        match self {
            Self::NoTarget => None,
            Self::Target(node) => Some(node),
        }
    }
}

/// A fragment after decoding, before any element lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentRef {
    Empty,
    Random,
    Id(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    None,
    Literal(NodeId),
    Random,
}

/// Why a non-empty fragment resolved to [`ResolvedTarget::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Malformed(String),
    SelfTarget(String),
    NotFound(String),
    OutsideContainer(String),
    NotIndexed(String),
}

impl Rejection {
    /// Rejections worth a warning; the rest are ordinary non-chapter anchors.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::SelfTarget(_))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(raw) => write!(f, "malformed fragment #{raw}"),
            Self::SelfTarget(id) => write!(f, "cannot target the container itself (#{id})"),
            Self::NotFound(id) => write!(f, "no element with id {id:?}"),
            Self::OutsideContainer(id) => write!(f, "element #{id} is outside the container"),
            Self::NotIndexed(id) => write!(f, "element #{id} is not an indexed section"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: ResolvedTarget,
    pub rejection: Option<Rejection>,
}

impl Resolution {
    fn target(target: ResolvedTarget) -> Self {
        Self {
            target,
            rejection: None,
        }
    }

    fn rejected(rejection: Rejection) -> Self {
        Self {
            target: ResolvedTarget::None,
            rejection: Some(rejection),
        }
    }
}

/// Strips one leading `#`, percent-decodes, and classifies the fragment.
pub fn parse_fragment(raw: &str, config: &FocusConfig) -> Result<FragmentRef> {
    let encoded = raw.strip_prefix('#').unwrap_or(raw);
    if encoded.is_empty() {
        return Ok(FragmentRef::Empty);
    }
    let decoded = decode_fragment(encoded)?;
    if config.is_random_token(&decoded) {
        return Ok(FragmentRef::Random);
    }
    // An id can never hold ASCII whitespace, so no element could match.
    if decoded.chars().any(|ch| ch.is_ascii_whitespace()) {
        return Err(Error::MalformedFragment(raw.to_string()));
    }
    Ok(FragmentRef::Id(decoded))
}

/// Maps the current fragment onto a target inside `container`.
///
/// Lookup goes by id within the container, so a filtered index does not hide
/// identified wrappers from direct links. When every identified element is
/// indexed, index membership is required as well. The fragment is tried as
/// written first and percent-decoded second, so `#50%` still finds `id="50%"`.
pub fn resolve(
    fragment: &str,
    index: &SectionIndex,
    dom: &Dom,
    container: NodeId,
    config: &FocusConfig,
) -> Resolution {
    let raw = fragment.strip_prefix('#').unwrap_or(fragment);
    let decoded = match parse_fragment(fragment, config) {
        Ok(FragmentRef::Empty) => return Resolution::target(ResolvedTarget::None),
        Ok(FragmentRef::Random) => return Resolution::target(ResolvedTarget::Random),
        Ok(FragmentRef::Id(id)) => Some(id),
        Err(_) => None,
    };

    let mut candidates = vec![raw];
    if let Some(decoded) = decoded.as_deref().filter(|id| *id != raw) {
        candidates.push(decoded);
    }
    for id in candidates {
        if dom.id_of(container) == Some(id) {
            return Resolution::rejected(Rejection::SelfTarget(id.to_string()));
        }
        let Some(node) = dom.by_id_within(container, id) else {
            continue;
        };
        if config.eligibility.is_any_id() && !index.contains(node) {
            return Resolution::rejected(Rejection::NotIndexed(id.to_string()));
        }
        return Resolution::target(ResolvedTarget::Literal(node));
    }

    let Some(id) = decoded else {
        return Resolution::rejected(Rejection::Malformed(raw.to_string()));
    };
    Resolution::rejected(if dom.by_id(raw).is_some() || dom.by_id(&id).is_some() {
        Rejection::OutsideContainer(id)
    } else {
        Rejection::NotFound(id)
    })
}
