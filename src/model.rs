#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type NodeId = i64;
pub type RelId = i64;

/// Property map carried by nodes, relationships and statement parameters.
pub type Props = Map<String, Value>;

/// A node as returned by the database: its identity plus validated properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub entity: Props,
}

impl NodeRef {
    pub fn new(id: NodeId, entity: Props) -> Self {
        Self { id, entity }
    }
}

/// Relationship created alongside a node by `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub entity: Props,
}

/// Result of `create`: the new node and, when requested, the relationship
/// attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedNode {
    #[serde(flatten)]
    pub node: NodeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<CreatedRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRef {
    pub id: RelId,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub entity: Props,
}

/// Node reference as supplied to `update`. Both halves are optional so a
/// reference decoded from an untrusted payload can be rejected before any
/// statement is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NodeRefInput {
    #[serde(default)]
    pub id: Option<NodeId>,
    #[serde(default)]
    pub entity: Option<Props>,
}

impl From<NodeRef> for NodeRefInput {
    fn from(node: NodeRef) -> Self {
        Self {
            id: Some(node.id),
            entity: Some(node.entity),
        }
    }
}

impl From<&NodeRef> for NodeRefInput {
    fn from(node: &NodeRef) -> Self {
        node.clone().into()
    }
}

/// Endpoint of a relationship: a raw identity or a node already read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKey(pub NodeId);

impl From<NodeId> for NodeKey {
    fn from(id: NodeId) -> Self {
        NodeKey(id)
    }
}

impl From<&NodeRef> for NodeKey {
    fn from(node: &NodeRef) -> Self {
        NodeKey(node.id)
    }
}

impl From<&CreatedNode> for NodeKey {
    fn from(created: &CreatedNode) -> Self {
        NodeKey(created.node.id)
    }
}
