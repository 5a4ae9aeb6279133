use serde::Deserialize;

/// Node identifiers are the backend's numeric database ids. JSON object keys
/// carry them as strings; serde handles the conversion for keyed maps.
pub type NodeId = u64;

/// A single node in the story graph.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryNode {
    pub id: NodeId,
    /// Narrative text shown when the reader reaches this node.
    pub content: String,
    /// If true, the story ends at this node (win or lose).
    pub is_ending: bool,
    /// Whether this ending counts as a victory. Only meaningful when
    /// `is_ending` is set.
    #[serde(default)]
    pub is_winning_ending: bool,
    /// Ordered choices offered at this node; empty for endings.
    #[serde(default)]
    pub options: Vec<StoryOption>,
}

/// A choice the reader can take from a non-ending node.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryOption {
    /// Display text for the choice.
    pub text: String,
    /// Target node, when the generator resolved this branch. `None` marks a
    /// dead end the generator never wrote.
    pub node_id: Option<NodeId>,
}
