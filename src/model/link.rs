use serde::{Deserialize, Serialize};

use super::Node;

/// Type of a provenance link between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkType {
    /// Calculation to a data node it created.
    Create,
    /// Workflow to a data node it returns without having created it.
    Return,
    /// Data node consumed by a calculation.
    InputCalc,
    /// Data node consumed by a workflow.
    InputWork,
    /// Workflow to a calculation it called.
    CallCalc,
    /// Workflow to a workflow it called.
    CallWork,
}

impl LinkType {
    /// Link types whose sources contribute to the hash of a process node.
    pub const INPUTS: [LinkType; 2] = [LinkType::InputCalc, LinkType::InputWork];
}

/// A link seen from one of its ends: the node at the other end, the type and the label.
#[derive(Debug, Clone)]
pub struct LinkTriple {
    pub node: Node,
    pub link_type: LinkType,
    pub link_label: String,
}
