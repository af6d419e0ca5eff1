use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Value object: Node ID, unique within its definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// Value object: Edge ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

/// How a Task node resolves its assignee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssigneeRule {
    /// A fixed user id
    User(String),
    /// A candidate group; any member may claim the task
    Group(String),
}

/// The kind of a node, with per-kind configuration
///
/// Dispatched through an explicit match in the engine's advance step so the
/// state machine stays auditable and replayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    /// The single entry point of the graph
    Start,

    /// A human task; the token parks here until the task is completed
    Task {
        /// Assignee resolution rule for the created task
        assignee: AssigneeRule,
        /// Task priority, higher is more urgent
        #[serde(default)]
        priority: i32,
        /// Due offset in minutes from task creation, if any
        #[serde(default)]
        due_in_minutes: Option<i64>,
    },

    /// Routes the token along the first outgoing edge whose guard matches
    Decision,

    /// Fans a single token out into one token per outgoing edge
    ParallelSplit,

    /// Waits for a token from every incoming edge, then merges into one
    ParallelJoin,

    /// Consumes the token; all tokens consumed completes the instance
    End,
}

impl NodeKind {
    /// Short name used in violations and logs
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Task { .. } => "task",
            NodeKind::Decision => "decision",
            NodeKind::ParallelSplit => "parallelSplit",
            NodeKind::ParallelJoin => "parallelJoin",
            NodeKind::End => "end",
        }
    }
}

/// A node in a process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// ID of the node, unique within the definition
    pub id: NodeId,

    /// Human-readable label
    pub name: String,

    /// Kind and per-kind configuration
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// ID of the edge
    pub id: EdgeId,

    /// Source node
    pub from: NodeId,

    /// Target node
    pub to: NodeId,

    /// Optional guard expression; absent means always-true / default path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

/// A single structural violation found by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Stable machine-readable code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

impl Violation {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A process graph: flat node and edge arenas indexed by id
///
/// No embedded object references, so loops and re-entrant flows are just
/// edges pointing to an earlier node. Traversal state is per-instance,
/// never stored on the graph itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGraph {
    /// The nodes of the graph
    pub nodes: Vec<Node>,

    /// The edges of the graph; outgoing-edge order is declaration order
    pub edges: Vec<Edge>,
}

impl ProcessGraph {
    /// Look up a node by id
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Look up an edge by id
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    /// Outgoing edges of a node, in declaration order
    pub fn outgoing(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| &e.from == id).collect()
    }

    /// Incoming edges of a node, in declaration order
    pub fn incoming(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| &e.to == id).collect()
    }

    /// The single Start node, if the graph has exactly one
    pub fn start_node(&self) -> Option<&Node> {
        let mut starts = self.nodes.iter().filter(|n| n.kind == NodeKind::Start);
        match (starts.next(), starts.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// Structurally validate the graph
    ///
    /// Returns every violation found; an empty list means the definition may
    /// transition draft -> active. Guard exhaustiveness on Decision nodes is
    /// deliberately not checked here: an uncovered case at runtime is a
    /// fault, not a validation error.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.nodes.is_empty() {
            violations.push(Violation::new("EMPTY_GRAPH", "Graph has no nodes"));
            return violations;
        }

        // Node id uniqueness
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                violations.push(Violation::new(
                    "DUPLICATE_NODE_ID",
                    format!("Duplicate node id: {}", node.id.0),
                ));
            }
        }

        // Exactly one start node
        let start_count = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        if start_count != 1 {
            violations.push(Violation::new(
                "START_NODE_COUNT",
                format!("Graph must have exactly one start node, found {}", start_count),
            ));
        }

        // At least one end node
        if !self.nodes.iter().any(|n| n.kind == NodeKind::End) {
            violations.push(Violation::new(
                "NO_END_NODE",
                "Graph must have at least one end node",
            ));
        }

        // Dangling edges
        let node_ids: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        for edge in &self.edges {
            if !node_ids.contains(&edge.from) {
                violations.push(Violation::new(
                    "DANGLING_EDGE",
                    format!("Edge {} starts at unknown node {}", edge.id.0, edge.from.0),
                ));
            }
            if !node_ids.contains(&edge.to) {
                violations.push(Violation::new(
                    "DANGLING_EDGE",
                    format!("Edge {} ends at unknown node {}", edge.id.0, edge.to.0),
                ));
            }
        }

        // Every non-end node needs at least one outgoing edge
        for node in &self.nodes {
            if node.kind != NodeKind::End && self.outgoing(&node.id).is_empty() {
                violations.push(Violation::new(
                    "NO_OUTGOING_EDGE",
                    format!("{} node {} has no outgoing edge", node.kind.name(), node.id.0),
                ));
            }
        }

        // Reachability and parallel balance only make sense on a graph that
        // is otherwise well-formed
        if !violations.is_empty() {
            return violations;
        }

        // Every node reachable from start
        if let Some(start) = self.start_node() {
            let reachable = self.reachable_from(&start.id);
            for node in &self.nodes {
                if !reachable.contains(&node.id) {
                    violations.push(Violation::new(
                        "UNREACHABLE_NODE",
                        format!("Node {} is not reachable from the start node", node.id.0),
                    ));
                }
            }
        }

        // Every parallel split must have a matching join reachable on all
        // branches
        for node in &self.nodes {
            if node.kind == NodeKind::ParallelSplit {
                if let Some(violation) = self.check_branch_balance(node) {
                    violations.push(violation);
                }
            }
        }

        violations
    }

    /// BFS forward over edges from the given node
    fn reachable_from(&self, from: &NodeId) -> HashSet<NodeId> {
        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(from.clone());
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if let Some(next) = adjacency.get(current) {
                for target in next {
                    if visited.insert((*target).clone()) {
                        queue.push_back(target);
                    }
                }
            }
        }

        visited
    }

    /// Branch-balance walk: every branch out of a split must reach a common
    /// parallel join
    fn check_branch_balance(&self, split: &Node) -> Option<Violation> {
        let mut common: Option<HashSet<NodeId>> = None;

        for branch in self.outgoing(&split.id) {
            let joins: HashSet<NodeId> = self
                .reachable_from(&branch.to)
                .into_iter()
                .filter(|id| {
                    self.node(id)
                        .map(|n| n.kind == NodeKind::ParallelJoin)
                        .unwrap_or(false)
                })
                .collect();

            if joins.is_empty() {
                return Some(Violation::new(
                    "UNBALANCED_SPLIT",
                    format!(
                        "Branch {} of parallel split {} never reaches a parallel join",
                        branch.id.0, split.id.0
                    ),
                ));
            }

            common = Some(match common {
                None => joins,
                Some(prev) => prev.intersection(&joins).cloned().collect(),
            });
        }

        match common {
            Some(joins) if joins.is_empty() => Some(Violation::new(
                "UNBALANCED_SPLIT",
                format!(
                    "Branches of parallel split {} do not share a common join",
                    split.id.0
                ),
            )),
            _ => None,
        }
    }
}
