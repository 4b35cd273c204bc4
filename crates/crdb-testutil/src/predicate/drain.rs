//! Decommissioned node drain check
//!
//! Runs the node status command inside a surviving member, finds the row for
//! the member being removed and waits for its replica count to reach zero.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crdb_common::crd::CrdbCluster;
use crdb_common::naming::{member_address, member_pod_name, COCKROACH_BINARY, DB_CONTAINER_NAME};
use crdb_common::Error;

use super::Predicate;
use crate::exec::RemoteCommandExecutor;
use crate::node_status::{NodeStatusRecord, NodeStatusTable};
use crate::outcome::Outcome;

const CONTEXT: &str = "node-drained";

/// Address fragment identifying the member being drained
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrainTarget {
    expected_address_substring: String,
}

impl DrainTarget {
    /// Target the member with `ordinal` of a StatefulSet in `namespace`
    pub fn new(stateful_set: &str, ordinal: i32, namespace: &str) -> Self {
        Self {
            expected_address_substring: member_address(stateful_set, ordinal, namespace),
        }
    }

    /// Returns true if a reported node address belongs to the target
    pub fn matches(&self, address: &str) -> bool {
        address.contains(&self.expected_address_substring)
    }

    /// The address fragment being searched for
    pub fn as_str(&self) -> &str {
        &self.expected_address_substring
    }
}

/// Decide drain progress from parsed node status records
///
/// Every record whose address matches is considered. Any match that is not
/// marked decommissioning is an unexpected state, and any match still holding
/// replicas keeps the check pending. A target that does not appear at all is
/// inconclusive and stays pending.
pub fn drain_outcome<I>(records: I, target: &DrainTarget) -> Outcome
where
    I: IntoIterator<Item = Result<NodeStatusRecord, Error>>,
{
    let mut matched = 0usize;
    let mut pending = None;

    for record in records {
        let record = match record {
            Ok(r) => r,
            Err(e) => return Outcome::Fatal(e),
        };
        if !target.matches(&record.address) {
            continue;
        }
        matched += 1;

        // is_live is not checked: a decommissioned node can still be reported
        // live for a short while.
        if !record.is_decommissioning {
            return Outcome::Fatal(Error::unexpected_state_in(
                CONTEXT,
                format!(
                    "node {} ({}) is not decommissioning",
                    record.id, record.address
                ),
            ));
        }
        if record.replica_count > 0 && pending.is_none() {
            pending = Some(format!(
                "node {} still has {} replicas",
                record.id, record.replica_count
            ));
        }
    }

    match pending {
        Some(reason) => Outcome::pending(reason),
        None if matched == 0 => {
            Outcome::pending(format!("no node with address matching {}", target.as_str()))
        }
        None => Outcome::Converged,
    }
}

/// Command listing nodes with decommission state as CSV
pub fn node_status_command(cluster: &CrdbCluster) -> Vec<String> {
    vec![
        COCKROACH_BINARY.to_string(),
        "node".to_string(),
        "status".to_string(),
        "--decommission".to_string(),
        "--format=csv".to_string(),
        cluster.secure_mode_flag(),
    ]
}

/// The target member holds no more replicas
pub struct NodeDrained {
    executor: Arc<dyn RemoteCommandExecutor>,
    pod: String,
    container: String,
    command: Vec<String>,
    target: DrainTarget,
}

impl NodeDrained {
    /// Run `command` in `container` of `pod` and look for `target`
    pub fn new(
        executor: Arc<dyn RemoteCommandExecutor>,
        pod: impl Into<String>,
        container: impl Into<String>,
        command: Vec<String>,
        target: DrainTarget,
    ) -> Self {
        Self {
            executor,
            pod: pod.into(),
            container: container.into(),
            command,
            target,
        }
    }

    /// Watch member `ordinal` of `cluster` drain, querying through member 0
    pub fn for_cluster(
        executor: Arc<dyn RemoteCommandExecutor>,
        cluster: &CrdbCluster,
        namespace: &str,
        ordinal: i32,
    ) -> Self {
        let sts = cluster.stateful_set_name();
        Self::new(
            executor,
            member_pod_name(&sts, 0),
            DB_CONTAINER_NAME,
            node_status_command(cluster),
            DrainTarget::new(&sts, ordinal, namespace),
        )
    }

    /// Member being drained
    pub fn target(&self) -> &DrainTarget {
        &self.target
    }
}

#[async_trait]
impl Predicate for NodeDrained {
    fn name(&self) -> &str {
        CONTEXT
    }

    async fn evaluate(&self) -> Outcome {
        let output = match self
            .executor
            .exec(&self.pod, &self.container, &self.command)
            .await
        {
            Ok(output) => output,
            Err(e) => return Outcome::Fatal(e),
        };

        if !output.stderr.trim().is_empty() {
            return Outcome::Fatal(Error::exec(
                &self.pod,
                format!("node status wrote to stderr: {}", output.stderr.trim()),
            ));
        }
        trace!(pod = %self.pod, output = %output.stdout, "Node status");

        match NodeStatusTable::parse(&output.stdout) {
            Ok(table) => drain_outcome(table, &self.target),
            Err(e) => Outcome::Fatal(e),
        }
    }
}
