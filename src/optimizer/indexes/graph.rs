use std::collections::HashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EcosystemNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub influence: f64,
    pub trust: f64,
    #[serde(default)]
    pub connections: Vec<String>,
}

/// Dense view of the graph, rows and columns follow `ids`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdjacencyMatrix {
    pub ids: Vec<String>,
    pub cells: Vec<Vec<bool>>,
}

impl AdjacencyMatrix {
    pub fn is_connected(&self, from: &str, to: &str) -> bool {
        let row = self.ids.iter().position(|id| id == from);
        let col = self.ids.iter().position(|id| id == to);
        matches!((row, col), (Some(r), Some(c)) if self.cells[r][c])
    }
}

/// Directed influence graph between ecosystem participants
#[derive(Debug, Clone, Default)]
pub struct EcosystemGraph {
    nodes: HashMap<String, EcosystemNode>,
    adjacency: HashMap<String, Vec<String>>,
}

impl EcosystemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: EcosystemNode) {
        let id = node.id.clone();
        let edges = node.connections.clone();
        self.nodes.insert(id.clone(), node);
        let list = self.adjacency.entry(id).or_default();
        for target in edges {
            if !list.contains(&target) {
                list.push(target);
            }
        }
    }

    /// Add a directed edge; both endpoints must already exist
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return false;
        }
        let list = self.adjacency.entry(from.to_string()).or_default();
        if !list.iter().any(|t| t == to) {
            list.push(to.to_string());
            if let Some(node) = self.nodes.get_mut(from) {
                node.connections.push(to.to_string());
            }
        }
        true
    }

    /// Outgoing edges of `id`, empty when unknown
    pub fn connections(&self, id: &str) -> Vec<String> {
        self.adjacency.get(id).cloned().unwrap_or_default()
    }

    pub fn node(&self, id: &str) -> Option<&EcosystemNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build the dense matrix over known nodes, ordered by id
    pub fn adjacency_matrix(&self) -> AdjacencyMatrix {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

        let mut cells = vec![vec![false; ids.len()]; ids.len()];
        for (from, targets) in &self.adjacency {
            let Some(&row) = position.get(from.as_str()) else { continue };
            for target in targets {
                if let Some(&col) = position.get(target.as_str()) {
                    cells[row][col] = true;
                }
            }
        }

        AdjacencyMatrix { ids, cells }
    }
}
