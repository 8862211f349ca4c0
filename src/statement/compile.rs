use serde_json::Value;

use super::ast::{
    is_plain_ident, Arrow, Clause, NodePattern, Param, PathPattern, Pattern, Projection,
    PropEquals, PropRef, RelPattern, StartPoint,
};
use super::Statement;
use crate::model::{NodeId, Props, RelId};
use crate::options::{Direction, NodeLookup, ResolvedRelationship};

const NODE: &str = "n";
const REL: &str = "rel";
const REL_NODE: &str = "relNode";

fn node_start(var: &str, param: &str) -> StartPoint {
    StartPoint::Node {
        var: var.to_owned(),
        id: Param::new(param),
    }
}

fn node_projection() -> Vec<Projection> {
    vec![Projection::Id(NODE.into()), Projection::Var(NODE.into())]
}

/// `CREATE (n:Label {props}) RETURN id(n), n`, optionally linking the new node
/// to an existing one found through `relationship`.
pub fn compile_create(
    label: &str,
    props: Props,
    relationship: Option<&ResolvedRelationship>,
) -> Statement {
    let mut params = Props::new();
    params.insert("props".into(), Value::Object(props));
    let created = NodePattern::var(NODE)
        .labeled(label)
        .with_props(Param::new("props"));

    let Some(rel) = relationship else {
        let clauses = [
            Clause::Create(vec![Pattern::Node(created)]),
            Clause::Return(node_projection()),
        ];
        return Statement::from_parts(&clauses, params);
    };

    let lookup = match &rel.lookup {
        NodeLookup::Identity(id) => {
            params.insert("indexValue".into(), Value::from(*id));
            Clause::Start(vec![node_start(REL_NODE, "indexValue")])
        }
        NodeLookup::Property { field, value } => {
            params.insert("indexValue".into(), value.clone());
            Clause::Match {
                pattern: Pattern::Node(NodePattern::var(REL_NODE).labeled(&rel.node_label)),
                filter: Some(PropEquals {
                    var: REL_NODE.into(),
                    key: field.clone(),
                    value: Param::new("indexValue"),
                }),
            }
        }
    };
    params.insert("relData".into(), Value::Object(rel.data.clone()));

    let link = PathPattern {
        left: NodePattern::var(NODE),
        rel: RelPattern {
            var: REL.into(),
            rel_type: Some(rel.rel_type.clone()),
            props: Some(Param::new("relData")),
        },
        arrow: match rel.direction {
            Direction::To => Arrow::Left,
            Direction::From => Arrow::Right,
        },
        right: NodePattern::var(REL_NODE),
    };

    let mut returns = node_projection();
    returns.push(Projection::Type(REL.into()));
    returns.push(Projection::Var(REL.into()));

    let clauses = [
        lookup,
        Clause::Create(vec![Pattern::Node(created), Pattern::Path(link)]),
        Clause::Return(returns),
    ];
    Statement::from_parts(&clauses, params)
}

/// `START n = node({nodeId}) SET ... REMOVE ... RETURN id(n), n`.
///
/// `updates` is the requested delta and decides which keys are touched;
/// `validated` is the schema's sanitized view of the merged entity and
/// supplies the values. Keys the schema nulls out (or requested as null and
/// stripped) are removed; keys the schema dropped entirely are left alone.
pub fn compile_update(node_id: NodeId, updates: &Props, validated: &Props) -> Statement {
    let mut params = Props::new();
    params.insert("nodeId".into(), Value::from(node_id));

    let mut sets = Vec::new();
    let mut removes = Vec::new();
    for (idx, (key, requested)) in updates.iter().enumerate() {
        match validated.get(key) {
            Some(Value::Null) => removes.push(PropRef {
                var: NODE.into(),
                key: key.clone(),
            }),
            Some(value) => {
                let name = update_param_name(key, idx, &params);
                params.insert(name.clone(), value.clone());
                sets.push(PropEquals {
                    var: NODE.into(),
                    key: key.clone(),
                    value: Param::new(name),
                });
            }
            None if requested.is_null() => removes.push(PropRef {
                var: NODE.into(),
                key: key.clone(),
            }),
            None => {}
        }
    }

    let clauses = [
        Clause::Start(vec![node_start(NODE, "nodeId")]),
        Clause::Set(sets),
        Clause::Remove(removes),
        Clause::Return(node_projection()),
    ];
    Statement::from_parts(&clauses, params)
}

fn update_param_name(key: &str, idx: usize, taken: &Props) -> String {
    let base = if is_plain_ident(key) {
        key.to_owned()
    } else {
        format!("p{idx}")
    };
    let mut name = format!("{base}_NEW");
    let mut bump = 0usize;
    while taken.contains_key(&name) {
        bump += 1;
        name = format!("{base}_{bump}_NEW");
    }
    name
}

/// `START n = node({nodeId}) RETURN id(n), n`.
pub fn compile_read(node_id: NodeId) -> Statement {
    let mut params = Props::new();
    params.insert("nodeId".into(), Value::from(node_id));
    let clauses = [
        Clause::Start(vec![node_start(NODE, "nodeId")]),
        Clause::Return(node_projection()),
    ];
    Statement::from_parts(&clauses, params)
}

/// `START n = node({nodeId}) DELETE n`, or with `force` also every attached
/// relationship.
pub fn compile_remove(node_id: NodeId, force: bool) -> Statement {
    let mut params = Props::new();
    params.insert("nodeId".into(), Value::from(node_id));
    let start = Clause::Start(vec![node_start(NODE, "nodeId")]);
    let clauses = if force {
        vec![
            start,
            Clause::OptionalMatch(Pattern::Path(PathPattern {
                left: NodePattern::var(NODE),
                rel: RelPattern {
                    var: "r".into(),
                    ..RelPattern::default()
                },
                arrow: Arrow::Either,
                right: NodePattern::anonymous(),
            })),
            Clause::Delete(vec![NODE.into(), "r".into()]),
        ]
    } else {
        vec![start, Clause::Delete(vec![NODE.into()])]
    };
    Statement::from_parts(&clauses, params)
}

/// `START from = node({from}), to = node({to}) CREATE (from)-[rel:TYPE {data}]->(to)
/// RETURN id(rel), type(rel), rel`.
pub fn compile_create_relationship(
    from: NodeId,
    to: NodeId,
    rel_type: &str,
    data: Props,
) -> Statement {
    let mut params = Props::new();
    params.insert("from".into(), Value::from(from));
    params.insert("to".into(), Value::from(to));
    params.insert("data".into(), Value::Object(data));
    let clauses = [
        Clause::Start(vec![node_start("from", "from"), node_start("to", "to")]),
        Clause::Create(vec![Pattern::Path(PathPattern {
            left: NodePattern::var("from"),
            rel: RelPattern {
                var: REL.into(),
                rel_type: Some(rel_type.to_owned()),
                props: Some(Param::new("data")),
            },
            arrow: Arrow::Right,
            right: NodePattern::var("to"),
        })]),
        Clause::Return(vec![
            Projection::Id(REL.into()),
            Projection::Type(REL.into()),
            Projection::Var(REL.into()),
        ]),
    ];
    Statement::from_parts(&clauses, params)
}

/// `START rel = relationship({relId}) DELETE rel`.
pub fn compile_remove_relationship(rel_id: RelId) -> Statement {
    let mut params = Props::new();
    params.insert("relId".into(), Value::from(rel_id));
    let clauses = [
        Clause::Start(vec![StartPoint::Relationship {
            var: REL.into(),
            id: Param::new("relId"),
        }]),
        Clause::Delete(vec![REL.into()]),
    ];
    Statement::from_parts(&clauses, params)
}
