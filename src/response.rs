#![forbid(unsafe_code)]

//! Result parsing.
//!
//! The endpoint answers in one of two envelopes:
//!
//! * auto-commit: `{"results": [{"columns": [...], "data": [{"row": [...]}]}], "errors": [...]}`
//! * continuation: `[{"data": [{"row": [...]}]}]`
//!
//! Both are normalized to the rows of the first statement result and decoded
//! by column position according to a [`RowLayout`].

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DriverError, OgmError, Result};
use crate::model::{CreatedNode, CreatedRelationship, NodeId, NodeRef, Props, RelationshipRef};

/// Column order of the rows a statement returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RowLayout {
    /// `[id(n), n]`
    Node,
    /// `[id(n), n, type(rel), rel]`
    NodeWithRelationship,
    /// `[id(rel), type(rel), rel]`
    Relationship,
}

impl RowLayout {
    fn width(self) -> usize {
        match self {
            RowLayout::Node => 2,
            RowLayout::NodeWithRelationship => 4,
            RowLayout::Relationship => 3,
        }
    }
}

/// How many rows the caller wants back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultLimit {
    /// Exactly the first row; no rows is an error.
    First,
    /// Every row.
    All,
}

/// Canonical `{id, entity, relationshipType?, relationshipEntity?}` record.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRow {
    /// Identity of the node or relationship.
    pub id: NodeId,
    /// Properties of the node or relationship.
    pub entity: Props,
    /// Type of the relationship column, when the layout has one.
    pub relationship_type: Option<String>,
    /// Properties of the relationship column, when the layout has one.
    pub relationship_entity: Option<Props>,
}

impl ParsedRow {
    /// Reads the row as a node reference.
    pub fn into_node(self) -> NodeRef {
        NodeRef::new(self.id, self.entity)
    }

    /// Reads the row as a created node, with its relationship when present.
    pub fn into_created(self) -> CreatedNode {
        let relationship = match (self.relationship_type, self.relationship_entity) {
            (Some(rel_type), Some(entity)) => Some(CreatedRelationship { rel_type, entity }),
            _ => None,
        };
        CreatedNode {
            node: NodeRef::new(self.id, self.entity),
            relationship,
        }
    }

    /// Reads a [`RowLayout::Relationship`] row as a relationship reference.
    pub fn into_relationship(self) -> Result<RelationshipRef> {
        let rel_type = self
            .relationship_type
            .ok_or_else(|| OgmError::malformed("row has no relationship type column"))?;
        Ok(RelationshipRef {
            id: self.id,
            rel_type,
            entity: self.entity,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Commit {
        #[serde(default)]
        results: Option<Vec<StatementResult>>,
        #[serde(default)]
        errors: Vec<DriverError>,
    },
    Continuation(Vec<StatementResult>),
}

fn rows_of(response: Value) -> Result<Vec<Vec<Value>>> {
    let envelope: Envelope = serde_json::from_value(response)
        .map_err(|err| OgmError::malformed(format!("unrecognized response envelope: {err}")))?;
    let results = match envelope {
        Envelope::Commit { results, errors } => {
            if let Some(first) = errors.into_iter().next() {
                return Err(OgmError::Driver(first));
            }
            results
                .ok_or_else(|| OgmError::malformed("envelope has neither results nor errors"))?
        }
        Envelope::Continuation(results) => results,
    };
    Ok(results
        .into_iter()
        .next()
        .map(|result| result.data.into_iter().map(|data| data.row).collect())
        .unwrap_or_default())
}

/// Checks that `response` is a well-formed, error-free envelope without
/// decoding any row. Used for statements that return nothing.
pub fn expect_envelope(response: Value) -> Result<()> {
    rows_of(response).map(|_| ())
}

/// Normalizes `response` and decodes its rows per `layout`, honoring `limit`.
pub fn parse(response: Value, layout: RowLayout, limit: ResultLimit) -> Result<Vec<ParsedRow>> {
    let rows = rows_of(response)?;
    let take = match limit {
        ResultLimit::First => {
            if rows.is_empty() {
                return Err(OgmError::malformed("statement returned no rows"));
            }
            1
        }
        ResultLimit::All => rows.len(),
    };
    rows.into_iter()
        .take(take)
        .map(|row| decode_row(row, layout))
        .collect()
}

/// [`parse`] with [`ResultLimit::First`], returning the single row.
pub fn parse_first(response: Value, layout: RowLayout) -> Result<ParsedRow> {
    parse(response, layout, ResultLimit::First)?
        .into_iter()
        .next()
        .ok_or_else(|| OgmError::malformed("statement returned no rows"))
}

fn decode_row(row: Vec<Value>, layout: RowLayout) -> Result<ParsedRow> {
    if row.len() < layout.width() {
        return Err(OgmError::malformed(format!(
            "expected {} columns, got {}",
            layout.width(),
            row.len()
        )));
    }
    let mut cols = row.into_iter();
    let mut next = || cols.next().unwrap_or(Value::Null);
    let id = as_id(next())?;
    match layout {
        RowLayout::Node => Ok(ParsedRow {
            id,
            entity: as_entity(next())?,
            relationship_type: None,
            relationship_entity: None,
        }),
        RowLayout::NodeWithRelationship => Ok(ParsedRow {
            id,
            entity: as_entity(next())?,
            relationship_type: Some(as_type(next())?),
            relationship_entity: Some(as_entity(next())?),
        }),
        RowLayout::Relationship => {
            let rel_type = as_type(next())?;
            Ok(ParsedRow {
                id,
                entity: as_entity(next())?,
                relationship_type: Some(rel_type),
                relationship_entity: None,
            })
        }
    }
}

fn as_id(value: Value) -> Result<NodeId> {
    value
        .as_i64()
        .ok_or_else(|| OgmError::malformed(format!("identity column is not an integer: {value}")))
}

fn as_entity(value: Value) -> Result<Props> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(OgmError::malformed(format!(
            "entity column is not an object: {other}"
        ))),
    }
}

fn as_type(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(OgmError::malformed(format!(
            "type column is not a string: {other}"
        ))),
    }
}
