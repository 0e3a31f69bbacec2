use crate::config::MarkerClasses;
use crate::dom::{Dom, NodeId};
use crate::{Error, Result};

/// Elements marked by one [`apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub target: Option<NodeId>,
    /// Ancestors between the target and the container, nearest first.
    pub ancestors: Vec<NodeId>,
}

impl Applied {
    pub fn is_focused(&self) -> bool {
        self.target.is_some()
    }
}

/// Removes all three markers from the container and everything inside it.
/// Calling it on an unmarked tree changes nothing.
pub fn clear(dom: &mut Dom, container: NodeId, markers: &MarkerClasses) -> Result<()> {
    dom.class_remove(container, &markers.focus_active)?;
    for node in dom.descendant_elements(container) {
        dom.class_remove(node, &markers.directly_visible)?;
        dom.class_remove(node, &markers.ancestor_visible)?;
    }
    Ok(())
}

/// Clears, then marks `target`, the container, and every element between
/// them. `None` only clears.
pub fn apply(
    dom: &mut Dom,
    container: NodeId,
    markers: &MarkerClasses,
    target: Option<NodeId>,
) -> Result<Applied> {
    clear(dom, container, markers)?;
    let Some(target) = target else {
        return Ok(Applied::default());
    };
    if !dom.is_descendant_of(target, container) {
        return Err(Error::Runtime(format!(
            "focus target {} is not inside {}",
            dom.node_label(target),
            dom.node_label(container)
        )));
    }

    dom.class_add(container, &markers.focus_active)?;
    dom.class_add(target, &markers.directly_visible)?;

    let mut ancestors = Vec::new();
    let mut cursor = dom.parent_element(target);
    while let Some(node) = cursor {
        if node == container {
            break;
        }
        dom.class_add(node, &markers.ancestor_visible)?;
        ancestors.push(node);
        cursor = dom.parent_element(node);
    }

    Ok(Applied {
        target: Some(target),
        ancestors,
    })
}
