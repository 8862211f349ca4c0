#![allow(missing_docs)]

//! In-process doubles for the mapper's collaborators.
//!
//! * [`ScriptedDriver`] / [`ScriptedTransaction`] replay queued responses and
//!   record every statement, for asserting on compiled text and failure
//!   handling.
//! * [`MemoryGraph`] / [`MemoryTransaction`] keep a tiny in-memory graph and
//!   understand exactly the statement shapes the compiler emits (plain
//!   identifiers only), for end-to-end behaviour.
//! * [`TestSchema`] validates against a fixed property list and records
//!   notifications; [`RecordingSink`] only records.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{DriverError, ValidationError};
use crate::model::{NodeId, Props, RelId};
use crate::schema::{EventSink, ModelEvent, Schema};
use crate::statement::Statement;
use crate::tx::{GraphDriver, Outbox, TransactionHandle, TxState};

pub const ENTITY_NOT_FOUND: &str = "Neo.ClientError.Statement.EntityNotFound";
pub const CONSTRAINT_FAILED: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";
pub const SYNTAX_ERROR: &str = "Neo.ClientError.Statement.SyntaxError";

type Reply = Result<Value, DriverError>;

/// Wraps rows in the auto-commit envelope.
pub fn commit_envelope(rows: Vec<Vec<Value>>) -> Value {
    let data: Vec<Value> = rows.into_iter().map(|row| json!({ "row": row })).collect();
    json!({"results": [{"columns": [], "data": data}], "errors": []})
}

/// Wraps rows in the transaction continuation envelope.
pub fn continuation_envelope(rows: Vec<Vec<Value>>) -> Value {
    let data: Vec<Value> = rows.into_iter().map(|row| json!({ "row": row })).collect();
    json!([{ "data": data }])
}

/// Records notifications in delivery order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(ModelEvent, Vec<Value>)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(ModelEvent, Vec<Value>)> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: ModelEvent, args: &[Value]) {
        self.events.lock().push((event, args.to_vec()));
    }
}

/// Schema accepting a fixed set of properties.
///
/// Unknown properties are stripped, `required` properties must be present
/// and non-null, and nulls are passed through so updates can remove
/// properties.
#[derive(Debug)]
pub struct TestSchema {
    label: String,
    allowed: Option<HashSet<String>>,
    required: Vec<String>,
    pending_indexes: Mutex<bool>,
    index_failure: Mutex<Option<DriverError>>,
    index_runs: AtomicUsize,
    validations: AtomicUsize,
    sink: RecordingSink,
}

impl TestSchema {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            allowed: None,
            required: Vec::new(),
            pending_indexes: Mutex::new(false),
            index_failure: Mutex::new(None),
            index_runs: AtomicUsize::new(0),
            validations: AtomicUsize::new(0),
            sink: RecordingSink::default(),
        }
    }

    /// Restricts the schema to `fields`; anything else is stripped.
    pub fn with_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.allowed = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Marks index definitions as pending until the next `ensure_indexes`.
    pub fn with_pending_indexes(self) -> Self {
        *self.pending_indexes.lock() = true;
        self
    }

    pub fn fail_indexes(&self, err: DriverError) {
        *self.index_failure.lock() = Some(err);
    }

    pub fn index_runs(&self) -> usize {
        self.index_runs.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<(ModelEvent, Vec<Value>)> {
        self.sink.events()
    }
}

impl EventSink for TestSchema {
    fn notify(&self, event: ModelEvent, args: &[Value]) {
        self.sink.notify(event, args);
    }
}

#[async_trait]
impl Schema for TestSchema {
    fn label(&self) -> &str {
        &self.label
    }

    async fn validate(&self, data: Props) -> Result<Props, ValidationError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        for field in &self.required {
            if data.get(field).map_or(true, Value::is_null) {
                return Err(ValidationError::field(field.clone(), "is required"));
            }
        }
        Ok(match &self.allowed {
            Some(allowed) => data
                .into_iter()
                .filter(|(key, _)| allowed.contains(key))
                .collect(),
            None => data,
        })
    }

    fn has_pending_indexes(&self) -> bool {
        *self.pending_indexes.lock()
    }

    async fn ensure_indexes(&self) -> Result<(), DriverError> {
        self.index_runs.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.index_failure.lock().clone() {
            return Err(err);
        }
        *self.pending_indexes.lock() = false;
        Ok(())
    }
}

/// Driver replaying queued replies; an empty queue answers with an empty
/// auto-commit envelope.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    replies: Mutex<VecDeque<Reply>>,
    submitted: Mutex<Vec<Statement>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: Value) {
        self.replies.lock().push_back(Ok(response));
    }

    pub fn fail(&self, err: DriverError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn submitted(&self) -> Vec<Statement> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl GraphDriver for ScriptedDriver {
    async fn run_auto_commit(&self, statements: &[Statement]) -> Result<Value, DriverError> {
        self.submitted.lock().extend_from_slice(statements);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(commit_envelope(Vec::new())))
    }
}

/// Transaction handle replaying queued replies.
#[derive(Debug)]
pub struct ScriptedTransaction {
    state: TxState,
    replies: VecDeque<Reply>,
    executed: Vec<Statement>,
    rollbacks: usize,
    rollback_failure: Option<DriverError>,
    outbox: Outbox,
}

impl Default for ScriptedTransaction {
    fn default() -> Self {
        Self {
            state: TxState::Open,
            replies: VecDeque::new(),
            executed: Vec::new(),
            rollbacks: 0,
            rollback_failure: None,
            outbox: Outbox::new(),
        }
    }
}

impl ScriptedTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, response: Value) {
        self.replies.push_back(Ok(response));
    }

    pub fn fail_next(&mut self, err: DriverError) {
        self.replies.push_back(Err(err));
    }

    /// Makes the next rollback fail with `err`; the handle still ends up
    /// rolled back.
    pub fn fail_rollback(&mut self, err: DriverError) {
        self.rollback_failure = Some(err);
    }

    pub fn executed(&self) -> &[Statement] {
        &self.executed
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Commits and flushes the outbox, returning the number of events fired.
    pub fn commit(&mut self) -> Result<usize, DriverError> {
        if self.state != TxState::Open {
            return Err(DriverError::new(format!(
                "cannot commit: transaction is {}",
                self.state
            )));
        }
        self.state = TxState::Committed;
        Ok(self.outbox.flush())
    }
}

#[async_trait]
impl TransactionHandle for ScriptedTransaction {
    async fn exec(&mut self, statement: &Statement) -> Result<Value, DriverError> {
        self.executed.push(statement.clone());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(continuation_envelope(Vec::new())))
    }

    async fn remove(&mut self) -> Result<(), DriverError> {
        self.rollbacks += 1;
        self.state = TxState::RolledBack;
        self.outbox.discard();
        match self.rollback_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn state(&self) -> TxState {
        self.state
    }

    fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredNode {
    pub label: String,
    pub props: Props,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredRelationship {
    pub from: NodeId,
    pub to: NodeId,
    pub rel_type: String,
    pub props: Props,
}

#[derive(Clone, Debug, Default)]
struct GraphState {
    next_id: i64,
    nodes: BTreeMap<NodeId, StoredNode>,
    rels: BTreeMap<RelId, StoredRelationship>,
}

impl GraphState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory graph answering the mapper's statement shapes.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
    submitted: Mutex<Vec<Statement>>,
}

impl MemoryGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens a transaction whose rollback restores the graph as of now.
    pub fn begin(self: &Arc<Self>) -> MemoryTransaction {
        MemoryTransaction {
            graph: Arc::clone(self),
            snapshot: self.state.lock().clone(),
            state: TxState::Open,
            outbox: Outbox::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<StoredNode> {
        self.state.lock().nodes.get(&id).cloned()
    }

    pub fn relationship(&self, id: RelId) -> Option<StoredRelationship> {
        self.state.lock().rels.get(&id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state.lock().rels.len()
    }

    pub fn submitted(&self) -> Vec<Statement> {
        self.submitted.lock().clone()
    }

    fn apply(&self, statement: &Statement) -> Result<Vec<Vec<Value>>, DriverError> {
        self.submitted.lock().push(statement.clone());
        let mut state = self.state.lock();
        let text = statement.text();
        let params = statement.parameters();
        if text.starts_with("CREATE (n:") {
            create_node(&mut state, text, params, None)
        } else if text.starts_with("START relNode") || text.starts_with("MATCH (relNode:") {
            let Some(other) = find_rel_node(&state, text, params)? else {
                return Ok(Vec::new());
            };
            create_node(&mut state, text, params, Some(other))
        } else if text.starts_with("START n = node({nodeId})") {
            let id = int_param(params, "nodeId")?;
            if !state.nodes.contains_key(&id) {
                return Err(not_found("node", id));
            }
            if text.contains(" DELETE ") {
                delete_node(&mut state, id, text.contains("OPTIONAL MATCH"))
            } else {
                update_node(&mut state, id, text, params)
            }
        } else if text.starts_with("START from = node({from})") {
            create_relationship(&mut state, text, params)
        } else if text.starts_with("START rel = relationship({relId})") {
            let id = int_param(params, "relId")?;
            state
                .rels
                .remove(&id)
                .map(|_| Vec::new())
                .ok_or_else(|| not_found("relationship", id))
        } else {
            Err(DriverError::with_code(
                SYNTAX_ERROR,
                format!("unsupported statement: {text}"),
            ))
        }
    }
}

#[async_trait]
impl GraphDriver for MemoryGraph {
    async fn run_auto_commit(&self, statements: &[Statement]) -> Result<Value, DriverError> {
        let snapshot = self.state.lock().clone();
        let mut rows = Vec::new();
        for statement in statements {
            match self.apply(statement) {
                Ok(r) => rows = r,
                Err(err) => {
                    *self.state.lock() = snapshot;
                    return Ok(json!({"results": [], "errors": [err]}));
                }
            }
        }
        Ok(commit_envelope(rows))
    }
}

/// Transaction over a [`MemoryGraph`]. Statements apply immediately; rollback
/// restores the snapshot taken at `begin`.
#[derive(Debug)]
pub struct MemoryTransaction {
    graph: Arc<MemoryGraph>,
    snapshot: GraphState,
    state: TxState,
    outbox: Outbox,
}

impl MemoryTransaction {
    pub fn commit(&mut self) -> Result<usize, DriverError> {
        if self.state != TxState::Open {
            return Err(DriverError::new(format!(
                "cannot commit: transaction is {}",
                self.state
            )));
        }
        self.state = TxState::Committed;
        Ok(self.outbox.flush())
    }
}

#[async_trait]
impl TransactionHandle for MemoryTransaction {
    async fn exec(&mut self, statement: &Statement) -> Result<Value, DriverError> {
        self.graph.apply(statement).map(continuation_envelope)
    }

    async fn remove(&mut self) -> Result<(), DriverError> {
        *self.graph.state.lock() = self.snapshot.clone();
        self.state = TxState::RolledBack;
        self.outbox.discard();
        Ok(())
    }

    fn state(&self) -> TxState {
        self.state
    }

    fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}

fn not_found(kind: &str, id: i64) -> DriverError {
    DriverError::with_code(ENTITY_NOT_FOUND, format!("{kind} with id {id} not found"))
}

fn int_param(params: &Props, name: &str) -> Result<i64, DriverError> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| DriverError::with_code(SYNTAX_ERROR, format!("missing parameter {name}")))
}

fn map_param(params: &Props, name: &str) -> Props {
    params
        .get(name)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

fn find_rel_node(
    state: &GraphState,
    text: &str,
    params: &Props,
) -> Result<Option<NodeId>, DriverError> {
    let value = params.get("indexValue").cloned().unwrap_or(Value::Null);
    if text.starts_with("START relNode") {
        let id = int_param(params, "indexValue")?;
        return if state.nodes.contains_key(&id) {
            Ok(Some(id))
        } else {
            Err(not_found("node", id))
        };
    }
    let label = between(text, "MATCH (relNode:", ")").unwrap_or_default();
    let field = between(text, "WHERE relNode.", " = {indexValue}").unwrap_or_default();
    Ok(state
        .nodes
        .iter()
        .find(|(_, node)| node.label == label && node.props.get(field) == Some(&value))
        .map(|(id, _)| *id))
}

fn create_node(
    state: &mut GraphState,
    text: &str,
    params: &Props,
    other: Option<NodeId>,
) -> Result<Vec<Vec<Value>>, DriverError> {
    let label = between(text, "CREATE (n:", " {props})").unwrap_or_default().to_owned();
    let props = map_param(params, "props");
    let id = state.allocate();
    state.nodes.insert(
        id,
        StoredNode {
            label,
            props: props.clone(),
        },
    );
    let Some(other) = other else {
        return Ok(vec![vec![json!(id), Value::Object(props)]]);
    };
    let rel_type = between(text, "[rel:", " {relData}]")
        .unwrap_or_default()
        .to_owned();
    let rel_props = map_param(params, "relData");
    let (from, to) = if text.contains("<-[rel:") {
        (other, id)
    } else {
        (id, other)
    };
    let rel_id = state.allocate();
    state.rels.insert(
        rel_id,
        StoredRelationship {
            from,
            to,
            rel_type: rel_type.clone(),
            props: rel_props.clone(),
        },
    );
    Ok(vec![vec![
        json!(id),
        Value::Object(props),
        json!(rel_type),
        Value::Object(rel_props),
    ]])
}

fn delete_node(
    state: &mut GraphState,
    id: NodeId,
    force: bool,
) -> Result<Vec<Vec<Value>>, DriverError> {
    let attached: Vec<RelId> = state
        .rels
        .iter()
        .filter(|(_, rel)| rel.from == id || rel.to == id)
        .map(|(rel_id, _)| *rel_id)
        .collect();
    if !attached.is_empty() && !force {
        return Err(DriverError::with_code(
            CONSTRAINT_FAILED,
            format!("node {id} still has relationships"),
        ));
    }
    for rel_id in attached {
        state.rels.remove(&rel_id);
    }
    state.nodes.remove(&id);
    Ok(Vec::new())
}

fn update_node(
    state: &mut GraphState,
    id: NodeId,
    text: &str,
    params: &Props,
) -> Result<Vec<Vec<Value>>, DriverError> {
    let node = state
        .nodes
        .get_mut(&id)
        .ok_or_else(|| not_found("node", id))?;
    if let Some(sets) = segment(text, " SET ") {
        for item in sets.split(", ") {
            let key = between(item, "n.", " = ").unwrap_or_default();
            let param = between(item, "{", "}").unwrap_or_default();
            let value = params.get(param).cloned().unwrap_or(Value::Null);
            node.props.insert(key.to_owned(), value);
        }
    }
    if let Some(removes) = segment(text, " REMOVE ") {
        for item in removes.split(", ") {
            node.props.remove(item.trim_start_matches("n."));
        }
    }
    Ok(vec![vec![json!(id), Value::Object(node.props.clone())]])
}

fn segment<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let start = text.find(keyword)? + keyword.len();
    let rest = &text[start..];
    let end = [" REMOVE ", " RETURN "]
        .iter()
        .filter_map(|next| rest.find(next))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn create_relationship(
    state: &mut GraphState,
    text: &str,
    params: &Props,
) -> Result<Vec<Vec<Value>>, DriverError> {
    let from = int_param(params, "from")?;
    let to = int_param(params, "to")?;
    for id in [from, to] {
        if !state.nodes.contains_key(&id) {
            return Err(not_found("node", id));
        }
    }
    let rel_type = between(text, "[rel:", " {data}]")
        .unwrap_or_default()
        .to_owned();
    let props = map_param(params, "data");
    let id = state.allocate();
    state.rels.insert(
        id,
        StoredRelationship {
            from,
            to,
            rel_type: rel_type.clone(),
            props: props.clone(),
        },
    );
    Ok(vec![vec![json!(id), json!(rel_type), Value::Object(props)]])
}
