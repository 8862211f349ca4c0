//! The CRUD façade.
//!
//! Every operation runs the same linear pipeline:
//!
//! 1. check request fields (no I/O, failures never touch the transaction)
//! 2. prepare indexes (create only)
//! 3. validate through the [`Schema`]
//! 4. compile, execute, parse
//! 5. notify, or defer the notification to the ambient transaction
//!
//! Any failure from step 2 on rolls the ambient transaction back exactly once
//! before the error is returned.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::config::MapperConfig;
use crate::error::{OgmError, Result};
use crate::model::{CreatedNode, NodeKey, NodeRef, NodeRefInput, Props, RelId, RelationshipRef};
use crate::options::{
    CreateOptions, NewRelationship, RelationshipOptions, RemoveOptions, UpdateOptions,
};
use crate::response::{self, ParsedRow, RowLayout};
use crate::schema::{EventSink, ModelEvent, Schema};
use crate::statement::{self, Statement};
use crate::tx::{self, GraphDriver, TransactionHandle};

/// Options for `save_with`; identical to [`UpdateOptions`].
pub type SaveOptions<'t> = UpdateOptions<'t>;

/// Maps nodes of one [`Schema`] onto a graph database reached through `D`.
pub struct Mapper<S, D> {
    schema: Arc<S>,
    driver: Arc<D>,
    config: MapperConfig,
}

impl<S, D> Clone for Mapper<S, D> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            driver: Arc::clone(&self.driver),
            config: self.config.clone(),
        }
    }
}

impl<S, D> Mapper<S, D>
where
    S: Schema + 'static,
    D: GraphDriver,
{
    /// Mapper with the default configuration.
    pub fn new(schema: Arc<S>, driver: Arc<D>) -> Self {
        Self::with_config(schema, driver, MapperConfig::default())
    }

    /// Mapper with an explicit configuration.
    pub fn with_config(schema: Arc<S>, driver: Arc<D>, config: MapperConfig) -> Self {
        Self {
            schema,
            driver,
            config,
        }
    }

    /// The schema nodes are validated against.
    pub fn schema(&self) -> &Arc<S> {
        &self.schema
    }

    /// Active configuration.
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Creates a node in its own auto-committed transaction.
    pub async fn create(&self, data: Props) -> Result<CreatedNode> {
        self.create_with(data, CreateOptions::default()).await
    }

    /// Creates a node, optionally linked to an existing node and optionally
    /// inside an ambient transaction.
    pub async fn create_with(
        &self,
        data: Props,
        options: CreateOptions<'_>,
    ) -> Result<CreatedNode> {
        let CreateOptions {
            mut transaction,
            relationship,
        } = options;
        let relationship = relationship
            .as_ref()
            .map(|spec| spec.resolve(&self.config.identity_field))
            .transpose()?;
        check_open(transaction.as_deref())?;

        if self.config.prepare_indexes && self.schema.has_pending_indexes() {
            debug!(label = self.schema.label(), "ogm.create.ensure_indexes");
            if let Err(err) = self.schema.ensure_indexes().await {
                return Err(self.abort(transaction, err.into()).await);
            }
        }

        let props = match self.schema.validate(data).await {
            Ok(props) => props,
            Err(err) => return Err(self.abort(transaction, err.into()).await),
        };

        let stmt = statement::compile_create(self.schema.label(), props, relationship.as_ref());
        debug!(statement = stmt.text(), "ogm.create.compiled");
        let layout = if relationship.is_some() {
            RowLayout::NodeWithRelationship
        } else {
            RowLayout::Node
        };
        let created = self
            .run(transaction.as_deref_mut(), &stmt, |resp| {
                response::parse_first(resp, layout).map(ParsedRow::into_created)
            })
            .await?;
        self.emit(transaction, ModelEvent::Created, vec![json!(created)]);
        Ok(created)
    }

    /// Applies `updates` to `node` in its own auto-committed transaction.
    pub async fn update(&self, node: impl Into<NodeRefInput>, updates: Props) -> Result<NodeRef> {
        self.update_with(node, updates, UpdateOptions::default())
            .await
    }

    /// Applies `updates` to `node`: `null` values remove the property, other
    /// values set it, omitted keys are left untouched. The schema validates
    /// the merged entity, not the delta.
    pub async fn update_with(
        &self,
        node: impl Into<NodeRefInput>,
        updates: Props,
        options: UpdateOptions<'_>,
    ) -> Result<NodeRef> {
        let UpdateOptions { mut transaction } = options;
        let node = node.into();
        let (Some(id), Some(entity)) = (node.id, node.entity) else {
            return Err(OgmError::invalid(
                "update requires a node reference with both id and entity",
            ));
        };
        check_open(transaction.as_deref())?;

        let mut merged = entity;
        for (key, value) in &updates {
            merged.insert(key.clone(), value.clone());
        }
        let validated = match self.schema.validate(merged).await {
            Ok(props) => props,
            Err(err) => return Err(self.abort(transaction, err.into()).await),
        };

        let stmt = statement::compile_update(id, &updates, &validated);
        debug!(node_id = id, statement = stmt.text(), "ogm.update.compiled");
        let updated = self
            .run(transaction.as_deref_mut(), &stmt, |resp| {
                response::parse_first(resp, RowLayout::Node).map(ParsedRow::into_node)
            })
            .await?;
        self.emit(transaction, ModelEvent::Updated, vec![json!(updated)]);
        Ok(updated)
    }

    /// Deletes a node that has no relationships.
    pub async fn remove(&self, node: impl Into<NodeKey>) -> Result<()> {
        self.remove_with(node, RemoveOptions::default()).await
    }

    /// Deletes a node. Without `force` the database refuses to delete a node
    /// that still has relationships and that refusal is returned as is.
    pub async fn remove_with(
        &self,
        node: impl Into<NodeKey>,
        options: RemoveOptions<'_>,
    ) -> Result<()> {
        let RemoveOptions {
            mut transaction,
            force,
        } = options;
        let NodeKey(id) = node.into();
        check_open(transaction.as_deref())?;

        let stmt = statement::compile_remove(id, force);
        debug!(node_id = id, force, statement = stmt.text(), "ogm.remove.compiled");
        self.run(transaction.as_deref_mut(), &stmt, response::expect_envelope)
            .await?;
        self.emit(transaction, ModelEvent::Removed, vec![json!(id)]);
        Ok(())
    }

    /// Creates a relationship between two existing nodes.
    pub async fn create_relationship(&self, spec: NewRelationship) -> Result<RelationshipRef> {
        self.create_relationship_with(spec, RelationshipOptions::default())
            .await
    }

    /// Creates a relationship between two existing nodes, optionally inside an
    /// ambient transaction.
    pub async fn create_relationship_with(
        &self,
        spec: NewRelationship,
        options: RelationshipOptions<'_>,
    ) -> Result<RelationshipRef> {
        let RelationshipOptions { mut transaction } = options;
        let (from, to, rel_type, data) = spec.resolve()?;
        check_open(transaction.as_deref())?;

        let stmt = statement::compile_create_relationship(from, to, rel_type, data);
        debug!(from, to, rel_type, "ogm.relationship.compiled");
        let rel = self
            .run(transaction.as_deref_mut(), &stmt, |resp| {
                response::parse_first(resp, RowLayout::Relationship)?.into_relationship()
            })
            .await?;
        self.emit(
            transaction,
            ModelEvent::RelationshipCreated,
            vec![json!(rel)],
        );
        Ok(rel)
    }

    /// Deletes a relationship.
    pub async fn remove_relationship(&self, rel_id: RelId) -> Result<()> {
        self.remove_relationship_with(rel_id, RelationshipOptions::default())
            .await
    }

    /// Deletes a relationship, optionally inside an ambient transaction.
    pub async fn remove_relationship_with(
        &self,
        rel_id: RelId,
        options: RelationshipOptions<'_>,
    ) -> Result<()> {
        let RelationshipOptions { mut transaction } = options;
        check_open(transaction.as_deref())?;

        let stmt = statement::compile_remove_relationship(rel_id);
        debug!(rel_id, "ogm.relationship.remove_compiled");
        self.run(transaction.as_deref_mut(), &stmt, response::expect_envelope)
            .await?;
        self.emit(
            transaction,
            ModelEvent::RelationshipRemoved,
            vec![json!(rel_id)],
        );
        Ok(())
    }

    /// Creates `data` as a new node, or updates the stored node when `data`
    /// carries the configured identity field.
    pub async fn save(&self, data: Props) -> Result<NodeRef> {
        self.save_with(data, SaveOptions::default()).await
    }

    /// [`Mapper::save`] inside an optional ambient transaction.
    ///
    /// On the update path the stored node is read first and the remaining
    /// keys of `data` are applied to it as the update set, so validation sees
    /// the merged entity exactly as it does for [`Mapper::update_with`].
    pub async fn save_with(&self, mut data: Props, options: SaveOptions<'_>) -> Result<NodeRef> {
        let id = match data.remove(&self.config.identity_field) {
            None => {
                let options = CreateOptions {
                    transaction: options.transaction,
                    relationship: None,
                };
                return Ok(self.create_with(data, options).await?.node);
            }
            Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or_default(),
            Some(other) => {
                return Err(OgmError::invalid(format!(
                    "{} must be an integer node id, got {other}",
                    self.config.identity_field
                )))
            }
        };

        let UpdateOptions { mut transaction } = options;
        check_open(transaction.as_deref())?;
        let stmt = statement::compile_read(id);
        debug!(node_id = id, "ogm.save.read_stored");
        let stored = self
            .run(transaction.as_deref_mut(), &stmt, |resp| {
                response::parse_first(resp, RowLayout::Node).map(ParsedRow::into_node)
            })
            .await?;
        self.update_with(stored, data, UpdateOptions { transaction })
            .await
    }

    async fn run<T>(
        &self,
        mut transaction: Option<&mut (dyn TransactionHandle + '_)>,
        stmt: &Statement,
        decode: impl FnOnce(Value) -> Result<T>,
    ) -> Result<T> {
        let policy = self.config.rollback_policy();
        let response =
            tx::execute(self.driver.as_ref(), transaction.as_deref_mut(), stmt, policy).await?;
        match decode(response) {
            Ok(value) => Ok(value),
            Err(err) => Err(self.abort(transaction, err).await),
        }
    }

    async fn abort(
        &self,
        transaction: Option<&mut (dyn TransactionHandle + '_)>,
        err: OgmError,
    ) -> OgmError {
        match transaction {
            Some(tx) => tx::rollback(tx, err, self.config.rollback_policy()).await,
            None => err,
        }
    }

    fn emit(
        &self,
        transaction: Option<&mut (dyn TransactionHandle + '_)>,
        event: ModelEvent,
        args: Vec<Value>,
    ) {
        let sink: Arc<dyn EventSink> = self.schema.clone();
        tx::notify(sink, transaction, event, args);
    }
}

fn check_open(transaction: Option<&(dyn TransactionHandle + '_)>) -> Result<()> {
    match transaction {
        Some(tx) => tx::ensure_open(tx),
        None => Ok(()),
    }
}
