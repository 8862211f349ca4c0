#![forbid(unsafe_code)]

//! Per-operation option structs.
//!
//! Every mapper operation has a plain form (`create`, `update`, ...) and a
//! `_with` form taking one of these structs. Request-shaped values
//! ([`RelationshipSpec`], [`NewRelationship`]) keep all fields optional so
//! payloads decoded from JSON can be checked field by field before any I/O.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{OgmError, Result};
use crate::model::{NodeId, NodeKey, Props};
use crate::tx::TransactionHandle;

/// Which way the relationship created alongside a node points.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// The arrow points into the newly created node.
    To,
    /// The arrow points from the newly created node to the looked-up node.
    From,
}

impl Direction {
    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::To => "to",
            Direction::From => "from",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = OgmError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "to" => Ok(Direction::To),
            "from" => Ok(Direction::From),
            other => Err(OgmError::invalid(format!(
                "relationship direction '{other}' must be 'to' or 'from'"
            ))),
        }
    }
}

/// Relationship to create together with a node, linking it to an existing
/// node found by identity or by an indexed property.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    /// `"to"` or `"from"`.
    pub direction: Option<String>,
    /// Relationship type name.
    #[serde(rename = "type")]
    pub rel_type: Option<String>,
    /// Property used to find the other node; the configured identity field
    /// selects a direct identity lookup.
    pub index_field: Option<String>,
    /// Value the other node's `index_field` must equal.
    pub index_value: Option<Value>,
    /// Label of the other node.
    pub node_label: Option<String>,
    /// Relationship properties.
    pub data: Option<Props>,
}

impl RelationshipSpec {
    /// Empty spec; every required field must be filled before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction.as_str().to_owned());
        self
    }

    /// Sets the relationship type.
    pub fn with_type(mut self, rel_type: impl Into<String>) -> Self {
        self.rel_type = Some(rel_type.into());
        self
    }

    /// Sets the lookup field and value for the other node.
    pub fn with_index(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.index_field = Some(field.into());
        self.index_value = Some(value.into());
        self
    }

    /// Sets the other node's label.
    pub fn with_node_label(mut self, label: impl Into<String>) -> Self {
        self.node_label = Some(label.into());
        self
    }

    /// Sets the relationship properties.
    pub fn with_data(mut self, data: Props) -> Self {
        self.data = Some(data);
        self
    }

    /// Checks every required field and classifies the node lookup.
    ///
    /// `identity_field` is the index field name that selects a lookup by node
    /// identity rather than by property.
    pub fn resolve(&self, identity_field: &str) -> Result<ResolvedRelationship> {
        let mut missing = Vec::new();
        let direction = present(&self.direction, "direction", &mut missing);
        let rel_type = present(&self.rel_type, "type", &mut missing);
        let index_field = present(&self.index_field, "indexField", &mut missing);
        let node_label = present(&self.node_label, "nodeLabel", &mut missing);
        let index_value = match &self.index_value {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => {
                missing.push("indexValue");
                None
            }
        };
        let (Some(direction), Some(rel_type), Some(index_field), Some(node_label), Some(value)) =
            (direction, rel_type, index_field, node_label, index_value)
        else {
            return Err(OgmError::invalid(format!(
                "relationship option missing required fields: {}",
                missing.join(", ")
            )));
        };

        let direction = direction.parse::<Direction>()?;
        let lookup = if index_field == identity_field {
            let id = value.as_i64().ok_or_else(|| {
                OgmError::invalid(format!(
                    "indexValue must be an integer node id when indexField is '{identity_field}'"
                ))
            })?;
            NodeLookup::Identity(id)
        } else {
            NodeLookup::Property {
                field: index_field.to_owned(),
                value,
            }
        };

        Ok(ResolvedRelationship {
            direction,
            rel_type: rel_type.to_owned(),
            node_label: node_label.to_owned(),
            lookup,
            data: self.data.clone().unwrap_or_default(),
        })
    }
}

fn present<'a>(
    value: &'a Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            missing.push(name);
            None
        }
    }
}

/// How the node on the far side of a create-time relationship is found.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeLookup {
    /// Direct lookup by node identity.
    Identity(NodeId),
    /// Label scan filtered on `field = value`.
    Property {
        /// Property compared against `value`.
        field: String,
        /// Expected property value; travels as the `indexValue` parameter.
        value: Value,
    },
}

/// A [`RelationshipSpec`] with every required field checked.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRelationship {
    /// Arrow direction relative to the created node.
    pub direction: Direction,
    /// Relationship type name.
    pub rel_type: String,
    /// Label of the looked-up node.
    pub node_label: String,
    /// How the looked-up node is found.
    pub lookup: NodeLookup,
    /// Relationship properties.
    pub data: Props,
}

/// Request for `create_relationship`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewRelationship {
    /// Start node.
    pub from: Option<NodeKey>,
    /// End node.
    pub to: Option<NodeKey>,
    /// Relationship type name.
    pub rel_type: Option<String>,
    /// Relationship properties; defaults to an empty map.
    pub data: Option<Props>,
}

impl NewRelationship {
    /// Relationship of `rel_type` from `from` to `to` with no properties.
    pub fn between(
        from: impl Into<NodeKey>,
        to: impl Into<NodeKey>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            rel_type: Some(rel_type.into()),
            data: None,
        }
    }

    /// Sets the relationship properties.
    pub fn with_data(mut self, data: Props) -> Self {
        self.data = Some(data);
        self
    }

    /// Checks that both endpoints and the type are present.
    pub fn resolve(&self) -> Result<(NodeId, NodeId, &str, Props)> {
        let mut missing = Vec::new();
        if self.from.is_none() {
            missing.push("from");
        }
        if self.to.is_none() {
            missing.push("to");
        }
        let rel_type = present(&self.rel_type, "type", &mut missing);
        match (self.from, self.to, rel_type) {
            (Some(NodeKey(from)), Some(NodeKey(to)), Some(rel_type)) => {
                Ok((from, to, rel_type, self.data.clone().unwrap_or_default()))
            }
            _ => Err(OgmError::invalid(format!(
                "relationship missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Options for `create_with`.
#[derive(Default)]
pub struct CreateOptions<'t> {
    /// Ambient transaction to append the statement to.
    pub transaction: Option<&'t mut dyn TransactionHandle>,
    /// Relationship to create together with the node.
    pub relationship: Option<RelationshipSpec>,
}

impl<'t> CreateOptions<'t> {
    /// Options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the statement inside `transaction`.
    pub fn in_transaction(mut self, transaction: &'t mut dyn TransactionHandle) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Creates `relationship` alongside the node.
    pub fn with_relationship(mut self, relationship: RelationshipSpec) -> Self {
        self.relationship = Some(relationship);
        self
    }
}

/// Options for `update_with`.
#[derive(Default)]
pub struct UpdateOptions<'t> {
    /// Ambient transaction to append the statement to.
    pub transaction: Option<&'t mut dyn TransactionHandle>,
}

impl<'t> UpdateOptions<'t> {
    /// Runs the statement inside `transaction`.
    pub fn in_transaction(transaction: &'t mut dyn TransactionHandle) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}

/// Options for `remove_with`.
#[derive(Default)]
pub struct RemoveOptions<'t> {
    /// Ambient transaction to append the statement to.
    pub transaction: Option<&'t mut dyn TransactionHandle>,
    /// Delete attached relationships too. Without it the database refuses to
    /// delete a node that still has relationships.
    pub force: bool,
}

impl<'t> RemoveOptions<'t> {
    /// Options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the statement inside `transaction`.
    pub fn in_transaction(mut self, transaction: &'t mut dyn TransactionHandle) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Cascades the delete to attached relationships.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Options for `create_relationship_with` and `remove_relationship_with`.
#[derive(Default)]
pub struct RelationshipOptions<'t> {
    /// Ambient transaction to append the statement to.
    pub transaction: Option<&'t mut dyn TransactionHandle>,
}

impl<'t> RelationshipOptions<'t> {
    /// Runs the statement inside `transaction`.
    pub fn in_transaction(transaction: &'t mut dyn TransactionHandle) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}
