use crate::config::Eligibility;
use crate::dom::{Dom, NodeId};

/// Chapter sections found inside the container, in document order.
///
/// Built once when the controller attaches; later DOM changes are not picked
/// up until the page is reloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionIndex {
    sections: Vec<NodeId>,
    ids: Vec<String>,
}

impl SectionIndex {
    pub fn discover(dom: &Dom, container: NodeId, eligibility: &Eligibility) -> Self {
        let mut index = Self::default();
        for node in dom.descendant_elements(container) {
            let Some(id) = dom.id_of(node) else {
                continue;
            };
            if eligibility.accepts(id) {
                index.sections.push(node);
                index.ids.push(id.to_string());
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[NodeId] {
        &self.sections
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, position: usize) -> Option<(NodeId, &str)> {
        Some((*self.sections.get(position)?, self.ids.get(position)?.as_str()))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.sections.contains(&node)
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.sections.iter().position(|candidate| *candidate == node)
    }

    /// Uniform pick: `floor(unit * len)` for `unit` in `[0, 1)`.
    pub fn pick(&self, unit: f64) -> Option<(NodeId, &str)> {
        if self.is_empty() {
            return None;
        }
        let scaled = (unit.clamp(0.0, 1.0) * self.len() as f64).floor() as usize;
        self.get(scaled.min(self.len() - 1))
    }
}
