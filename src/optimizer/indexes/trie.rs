use std::collections::HashMap;
use serde_json::{Map, Value};

/// Payload stored at the end of a sequence
pub type PatternData = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct PrefixTrieNode {
    children: HashMap<String, PrefixTrieNode>,
    is_end_of_sequence: bool,
    data: PatternData,
}

/// Historical action sequences keyed token by token
#[derive(Debug, Clone, Default)]
pub struct PrefixTrie {
    root: PrefixTrieNode,
    sequences: usize,
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at the end of `sequence`, merging into any existing payload
    pub fn insert<S: AsRef<str>>(&mut self, sequence: &[S], data: PatternData) {
        let mut node = &mut self.root;
        for token in sequence {
            node = node.children.entry(token.as_ref().to_string()).or_default();
        }
        if !node.is_end_of_sequence {
            node.is_end_of_sequence = true;
            self.sequences += 1;
        }
        node.data.extend(data);
    }

    /// Payload of `sequence`, if it was inserted as a complete sequence
    pub fn search<S: AsRef<str>>(&self, sequence: &[S]) -> Option<&PatternData> {
        let mut node = &self.root;
        for token in sequence {
            node = node.children.get(token.as_ref())?;
        }
        node.is_end_of_sequence.then_some(&node.data)
    }

    pub fn len(&self) -> usize {
        self.sequences
    }

    pub fn is_empty(&self) -> bool {
        self.sequences == 0
    }
}
