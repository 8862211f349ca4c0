//! Clause-level syntax tree for the statements the mapper emits.
//!
//! Statements are assembled as an ordered list of [`Clause`]s and rendered in
//! one pass, so clause order is fixed by construction and each clause can be
//! rendered on its own. Identifiers are the only user-influenced text that
//! reaches the output; they are back-tick quoted whenever they are not plain
//! identifiers. Values never appear in the text, only `{param}` placeholders.

use std::borrow::Cow;
use std::fmt;

/// Returns `name` unchanged when it is a plain identifier, otherwise wrapped in
/// back-ticks with embedded back-ticks doubled.
pub fn ident(name: &str) -> Cow<'_, str> {
    if is_plain_ident(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}

/// Whether `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Named parameter placeholder, rendered as `{name}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Param(pub String);

impl Param {
    /// Placeholder for parameter `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

/// `var = node({param})` or `var = relationship({param})` inside `START`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StartPoint {
    /// Node looked up by identity.
    Node {
        /// Bound variable.
        var: String,
        /// Parameter holding the node id.
        id: Param,
    },
    /// Relationship looked up by identity.
    Relationship {
        /// Bound variable.
        var: String,
        /// Parameter holding the relationship id.
        id: Param,
    },
}

impl fmt::Display for StartPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPoint::Node { var, id } => write!(f, "{var} = node({id})"),
            StartPoint::Relationship { var, id } => write!(f, "{var} = relationship({id})"),
        }
    }
}

/// `(var:Label {props})`; an empty var renders as an anonymous node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodePattern {
    /// Bound variable, empty for an anonymous node.
    pub var: String,
    /// Optional label.
    pub label: Option<String>,
    /// Optional property map parameter.
    pub props: Option<Param>,
}

impl NodePattern {
    /// Bare `(var)`.
    pub fn var(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            ..Self::default()
        }
    }

    /// Anonymous `()`.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Adds a label.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a property map parameter.
    pub fn with_props(mut self, props: Param) -> Self {
        self.props = Some(props);
        self
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        f.write_str(&self.var)?;
        if let Some(label) = &self.label {
            write!(f, ":{}", ident(label))?;
        }
        if let Some(props) = &self.props {
            write!(f, " {props}")?;
        }
        f.write_str(")")
    }
}

/// Arrow drawn between the left and right node of a [`PathPattern`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arrow {
    /// `-[...]->`
    Right,
    /// `<-[...]-`
    Left,
    /// `-[...]-`
    Either,
}

/// `[var:TYPE {props}]`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RelPattern {
    /// Bound variable.
    pub var: String,
    /// Optional relationship type.
    pub rel_type: Option<String>,
    /// Optional property map parameter.
    pub props: Option<Param>,
}

impl fmt::Display for RelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        f.write_str(&self.var)?;
        if let Some(rel_type) = &self.rel_type {
            write!(f, ":{}", ident(rel_type))?;
        }
        if let Some(props) = &self.props {
            write!(f, " {props}")?;
        }
        f.write_str("]")
    }
}

/// A single-hop path `(left)-[rel]-(right)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathPattern {
    /// Node on the left of the arrow.
    pub left: NodePattern,
    /// Relationship segment.
    pub rel: RelPattern,
    /// Arrow direction.
    pub arrow: Arrow,
    /// Node on the right of the arrow.
    pub right: NodePattern,
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = match self.arrow {
            Arrow::Right => ("-", "->"),
            Arrow::Left => ("<-", "-"),
            Arrow::Either => ("-", "-"),
        };
        write!(f, "{}{head}{}{tail}{}", self.left, self.rel, self.right)
    }
}

/// Pattern element of `CREATE` / `MATCH`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Pattern {
    /// Single node.
    Node(NodePattern),
    /// Single-hop path.
    Path(PathPattern),
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Node(node) => node.fmt(f),
            Pattern::Path(path) => path.fmt(f),
        }
    }
}

/// `var.key = {param}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropEquals {
    /// Variable owning the property.
    pub var: String,
    /// Property key.
    pub key: String,
    /// Parameter holding the value.
    pub value: Param,
}

impl fmt::Display for PropEquals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} = {}", self.var, ident(&self.key), self.value)
    }
}

/// `var.key`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropRef {
    /// Variable owning the property.
    pub var: String,
    /// Property key.
    pub key: String,
}

impl fmt::Display for PropRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.var, ident(&self.key))
    }
}

/// Item of a `RETURN` clause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Projection {
    /// `id(var)`
    Id(String),
    /// `type(var)`
    Type(String),
    /// `var`
    Var(String),
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Id(var) => write!(f, "id({var})"),
            Projection::Type(var) => write!(f, "type({var})"),
            Projection::Var(var) => f.write_str(var),
        }
    }
}

/// One clause of a statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Clause {
    /// `START a = node({x}), ...`
    Start(Vec<StartPoint>),
    /// `MATCH pattern [WHERE var.key = {param}]`
    Match {
        /// Matched pattern.
        pattern: Pattern,
        /// Optional equality filter.
        filter: Option<PropEquals>,
    },
    /// `OPTIONAL MATCH pattern`
    OptionalMatch(Pattern),
    /// `CREATE p1, p2`
    Create(Vec<Pattern>),
    /// `SET a.x = {x}, ...`
    Set(Vec<PropEquals>),
    /// `REMOVE a.x, ...`
    Remove(Vec<PropRef>),
    /// `DELETE a, b`
    Delete(Vec<String>),
    /// `RETURN id(a), a, ...`
    Return(Vec<Projection>),
}

impl Clause {
    /// Clauses with nothing to say render to nothing and are dropped from the
    /// statement.
    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Start(items) => items.is_empty(),
            Clause::Create(items) => items.is_empty(),
            Clause::Set(items) => items.is_empty(),
            Clause::Remove(items) => items.is_empty(),
            Clause::Delete(items) => items.is_empty(),
            Clause::Return(items) => items.is_empty(),
            Clause::Match { .. } | Clause::OptionalMatch(_) => false,
        }
    }

    /// Leading keyword of the clause.
    pub fn keyword(&self) -> &'static str {
        match self {
            Clause::Start(_) => "START",
            Clause::Match { .. } => "MATCH",
            Clause::OptionalMatch(_) => "OPTIONAL MATCH",
            Clause::Create(_) => "CREATE",
            Clause::Set(_) => "SET",
            Clause::Remove(_) => "REMOVE",
            Clause::Delete(_) => "DELETE",
            Clause::Return(_) => "RETURN",
        }
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        item.fmt(f)?;
    }
    Ok(())
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())?;
        f.write_str(" ")?;
        match self {
            Clause::Start(items) => join(f, items),
            Clause::Match { pattern, filter } => {
                pattern.fmt(f)?;
                if let Some(filter) = filter {
                    write!(f, " WHERE {filter}")?;
                }
                Ok(())
            }
            Clause::OptionalMatch(pattern) => pattern.fmt(f),
            Clause::Create(items) => join(f, items),
            Clause::Set(items) => join(f, items),
            Clause::Remove(items) => join(f, items),
            Clause::Delete(items) => join(f, items),
            Clause::Return(items) => join(f, items),
        }
    }
}

/// Renders the non-empty clauses of `clauses` separated by single spaces.
pub fn render(clauses: &[Clause]) -> String {
    let mut out = String::new();
    for clause in clauses.iter().filter(|c| !c.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&clause.to_string());
    }
    out
}
