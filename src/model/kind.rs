use serde::{Deserialize, Serialize};

/// Attribute marking a process node as sealed.
pub const SEALED_KEY: &str = "sealed";
pub const PROCESS_STATE_KEY: &str = "process_state";
pub const PROCESS_STATUS_KEY: &str = "process_status";
pub const PROCESS_PAUSED_KEY: &str = "paused";
pub const EXIT_STATUS_KEY: &str = "exit_status";
pub const EXIT_MESSAGE_KEY: &str = "exit_message";
pub const EXCEPTION_KEY: &str = "exception";
pub const CHECKPOINT_KEY: &str = "checkpoints";

const PROCESS_UPDATABLE: &[&str] = &[
    SEALED_KEY,
    PROCESS_PAUSED_KEY,
    CHECKPOINT_KEY,
    EXCEPTION_KEY,
    EXIT_MESSAGE_KEY,
    EXIT_STATUS_KEY,
    PROCESS_STATE_KEY,
    PROCESS_STATUS_KEY,
];

const CALCJOB_UPDATABLE: &[&str] = &[
    SEALED_KEY,
    PROCESS_PAUSED_KEY,
    CHECKPOINT_KEY,
    EXCEPTION_KEY,
    EXIT_MESSAGE_KEY,
    EXIT_STATUS_KEY,
    PROCESS_STATE_KEY,
    PROCESS_STATUS_KEY,
    "job_id",
    "scheduler_state",
    "scheduler_lastchecktime",
    "last_job_info",
    "remote_workdir",
    "retrieve_list",
    "retrieve_temporary_list",
];

const CALCJOB_HASH_IGNORED: &[&str] = &["queue_name", "account", "qos", "priority", "max_wallclock_seconds", "max_memory_kb"];

const PROCESS_HASH_IGNORED_INPUTS: &[&str] = &["CALL_CALC", "CALL_WORK"];

/// Kind of node, resolved from the `node_type` string.
///
/// The kind carries everything the caching core needs to know about a node
/// class: whether it may be cached at all, which attributes stay out of the
/// hash and which ones may still change after the node is stored.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Data,
    CalcJob,
    CalcFunction,
    WorkChain,
    WorkFunction,
    /// Any other process node.
    Process,
}

impl NodeKind {
    pub fn from_node_type(node_type: &str) -> Self {
        if node_type.starts_with("process.calculation.calcjob.") {
            NodeKind::CalcJob
        } else if node_type.starts_with("process.calculation.calcfunction.") {
            NodeKind::CalcFunction
        } else if node_type.starts_with("process.workflow.workchain.") {
            NodeKind::WorkChain
        } else if node_type.starts_with("process.workflow.workfunction.") {
            NodeKind::WorkFunction
        } else if node_type.starts_with("process.") {
            NodeKind::Process
        } else {
            NodeKind::Data
        }
    }

    pub fn is_process(self) -> bool {
        !matches!(self, NodeKind::Data)
    }

    /// Process nodes carry the seal marker.
    pub fn is_sealable(self) -> bool {
        self.is_process()
    }

    /// Workflows only orchestrate and are never reused from cache.
    pub fn is_cachable(self) -> bool {
        matches!(self, NodeKind::Data | NodeKind::CalcJob | NodeKind::CalcFunction)
    }

    pub fn hash_ignored_attributes(self) -> &'static [&'static str] {
        match self {
            NodeKind::CalcJob => CALCJOB_HASH_IGNORED,
            _ => &[],
        }
    }

    /// Attributes that may change after storing (until the node is sealed).
    pub fn updatable_attributes(self) -> &'static [&'static str] {
        match self {
            NodeKind::Data => &[],
            NodeKind::CalcJob => CALCJOB_UPDATABLE,
            _ => PROCESS_UPDATABLE,
        }
    }

    /// Input link labels that do not contribute to the hash.
    pub fn hash_ignored_inputs(self) -> &'static [&'static str] {
        if self.is_process() { PROCESS_HASH_IGNORED_INPUTS } else { &[] }
    }

    /// Whether `key` takes part in the hash of nodes of this kind.
    pub fn is_hashed_attribute(
        self,
        key: &str,
    ) -> bool {
        !self.hash_ignored_attributes().contains(&key) && !self.updatable_attributes().contains(&key)
    }
}

/// Lifecycle state of a process node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Created,
    Waiting,
    Running,
    Finished,
    Excepted,
    Killed,
}

#[cfg(test)]
mod test {
    use super::NodeKind;

    #[test]
    fn test_kind_from_node_type() {
        assert_eq!(NodeKind::from_node_type("data.core.int.Int."), NodeKind::Data);
        assert_eq!(NodeKind::from_node_type("process.calculation.calcjob.CalcJobNode."), NodeKind::CalcJob);
        assert_eq!(NodeKind::from_node_type("process.calculation.calcfunction.CalcFunctionNode."), NodeKind::CalcFunction);
        assert_eq!(NodeKind::from_node_type("process.workflow.workchain.WorkChainNode."), NodeKind::WorkChain);
        assert_eq!(NodeKind::from_node_type("process.workflow.workfunction.WorkFunctionNode."), NodeKind::WorkFunction);
        assert_eq!(NodeKind::from_node_type("process.ProcessNode."), NodeKind::Process);
    }

    #[test]
    fn test_hashed_attributes() {
        assert!(NodeKind::CalcJob.is_hashed_attribute("x"));
        assert!(!NodeKind::CalcJob.is_hashed_attribute("queue_name"));
        assert!(!NodeKind::CalcJob.is_hashed_attribute("job_id"));
        assert!(!NodeKind::CalcFunction.is_hashed_attribute("process_state"));
        assert!(NodeKind::Data.is_hashed_attribute("process_state"));
    }

    #[test]
    fn test_cachable() {
        assert!(NodeKind::Data.is_cachable());
        assert!(NodeKind::CalcJob.is_cachable());
        assert!(!NodeKind::WorkChain.is_cachable());
        assert!(!NodeKind::Process.is_cachable());
    }
}
