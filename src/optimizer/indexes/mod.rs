//! Read-side indexes queried by the optimizer's public API.

pub mod disjoint_set;
pub mod graph;
pub mod segment_tree;
pub mod trie;

pub use disjoint_set::DisjointSet;
pub use graph::{AdjacencyMatrix, EcosystemGraph, EcosystemNode};
pub use segment_tree::SegmentTree;
pub use trie::PrefixTrie;
