//! Sombra OGM: maps typed node and relationship operations onto parameterized
//! Cypher statements run against a transactional graph endpoint.
//!
//! The [`Mapper`] compiles each operation into a [`Statement`], runs it either
//! inside a caller-supplied [`TransactionHandle`] or in an auto-committed
//! request through a [`GraphDriver`], and parses the response back into
//! [`NodeRef`] / [`RelationshipRef`] values.
//!
//! The `testkit` feature exposes in-process doubles for the driver, the
//! transaction handle and the schema.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod options;
pub mod response;
pub mod schema;
pub mod statement;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod tx;

pub use crate::config::{ConfigError, MapperConfig};
pub use crate::error::{DriverError, OgmError, Result, ValidationError};
pub use crate::mapper::{Mapper, SaveOptions};
pub use crate::model::{
    CreatedNode, CreatedRelationship, NodeId, NodeKey, NodeRef, NodeRefInput, Props, RelId,
    RelationshipRef,
};
pub use crate::options::{
    CreateOptions, Direction, NewRelationship, RelationshipOptions, RelationshipSpec,
    RemoveOptions, UpdateOptions,
};
pub use crate::schema::{EventSink, ModelEvent, Schema};
pub use crate::statement::Statement;
pub use crate::tx::{GraphDriver, Outbox, PendingEvent, TransactionHandle, TxState};
