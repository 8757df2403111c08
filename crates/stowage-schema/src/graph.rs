//! Normalized production dependency graph.
//!
//! Package managers report dependency trees in different shapes; backends
//! convert them into a `DependencyGraph`, an arena of `(name, version)` nodes
//! with child edges. Cycles are representable, so every traversal tracks the
//! `(name, version)` pairs it has already visited.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub name: String,
    pub version: String,
    children: Vec<NodeId>,
}

impl GraphNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Nested `{ "<name>": { "version", "dependencies" } }` tree, the shape used by
/// `npm ls --json` and by the legacy `dependencies` section of npm lockfiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DependencyTree(pub BTreeMap<String, TreeEntry>);

impl DependencyTree {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "DependencyTree::is_empty")]
    pub dependencies: DependencyTree,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    roots: Vec<NodeId>,
    /// Non-fatal problems reported while listing (peer warnings and the like).
    pub problems: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a nested tree. Entries without a version (missing
    /// or unresolved packages) and entries flagged `dev` are dropped along
    /// with their subtrees.
    pub fn from_tree(tree: &DependencyTree) -> Self {
        let mut graph = Self::new();
        for (name, entry) in &tree.0 {
            if let Some(id) = graph.insert_entry(name, entry) {
                graph.roots.push(id);
            }
        }
        graph
    }

    fn insert_entry(&mut self, name: &str, entry: &TreeEntry) -> Option<NodeId> {
        if entry.dev {
            return None;
        }
        let version = entry.version.as_deref().filter(|v| !v.is_empty())?;
        let id = self.add_node(name, version);
        for (child_name, child) in &entry.dependencies.0 {
            if let Some(child_id) = self.insert_entry(child_name, child) {
                self.nodes[id.0].children.push(child_id);
            }
        }
        Some(id)
    }

    pub fn add_node(&mut self, name: impl Into<String>, version: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode {
            name: name.into(),
            version: version.into(),
            children: Vec::new(),
        });
        id
    }

    pub fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(parent.0) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> impl Iterator<Item = &GraphNode> {
        self.roots.iter().filter_map(|id| self.node(*id))
    }

    pub fn root(&self, name: &str) -> Option<&GraphNode> {
        self.roots().find(|node| node.name == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Breadth-first search from the roots for the first node named `name`.
    pub fn find_version(&self, name: &str) -> Option<&str> {
        self.search(self.roots.iter().copied(), name)
    }

    /// Search the subtree below the root package `origin` for `name`.
    pub fn find_under(&self, origin: &str, name: &str) -> Option<&str> {
        let origin = self.root(origin)?;
        self.search(origin.children.iter().copied(), name)
    }

    fn search(&self, start: impl IntoIterator<Item = NodeId>, name: &str) -> Option<&str> {
        let mut queue: VecDeque<NodeId> = start.into_iter().collect();
        let mut visited: HashSet<(&str, &str)> = HashSet::new();
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if !visited.insert((node.name.as_str(), node.version.as_str())) {
                continue;
            }
            if node.name == name {
                return Some(node.version.as_str());
            }
            queue.extend(node.children.iter().copied());
        }
        None
    }

    /// Render the graph back into a nested tree. Back edges of a cycle are
    /// cut at the point where a node would repeat one of its ancestors.
    pub fn to_tree(&self) -> DependencyTree {
        let mut ancestors = Vec::new();
        self.subtree(&self.roots, &mut ancestors)
    }

    fn subtree(&self, ids: &[NodeId], ancestors: &mut Vec<NodeId>) -> DependencyTree {
        let mut tree = BTreeMap::new();
        for id in ids {
            if ancestors.contains(id) {
                continue;
            }
            let Some(node) = self.node(*id) else {
                continue;
            };
            ancestors.push(*id);
            let dependencies = self.subtree(&node.children, ancestors);
            ancestors.pop();
            tree.insert(
                node.name.clone(),
                TreeEntry {
                    version: Some(node.version.clone()),
                    dev: false,
                    dependencies,
                },
            );
        }
        DependencyTree(tree)
    }
}
