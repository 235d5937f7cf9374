mod base;
mod kind;
mod link;
mod node;
mod repository;
mod value;

pub use base::{BASE_VALUE_KEY, BaseType, Bool, Float, Int, Str};
pub use kind::*;
pub use link::{LinkTriple, LinkType};
pub use node::Node;
pub use repository::{Repository, content_key};
pub use value::{IntoValue, Value, ValueMap};

pub const CALCJOB_NODE_TYPE: &str = "process.calculation.calcjob.CalcJobNode.";
pub const CALCFUNCTION_NODE_TYPE: &str = "process.calculation.calcfunction.CalcFunctionNode.";
pub const WORKCHAIN_NODE_TYPE: &str = "process.workflow.workchain.WorkChainNode.";
pub const WORKFUNCTION_NODE_TYPE: &str = "process.workflow.workfunction.WorkFunctionNode.";
