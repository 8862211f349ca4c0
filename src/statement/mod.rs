#![forbid(unsafe_code)]

//! Statement compilation.
//!
//! [`compile`] turns each mapper operation into a [`Statement`] by assembling
//! an [`ast`] clause list and rendering it.

/// Clause-level syntax tree and rendering.
pub mod ast;

/// Pure compilers for the mapper operations.
pub mod compile;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Props;

pub use compile::{
    compile_create, compile_create_relationship, compile_read, compile_remove,
    compile_remove_relationship, compile_update,
};

/// A parameterized statement in the shape the transactional endpoint expects:
/// `{"statement": "...", "parameters": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    statement: String,
    parameters: Props,
}

impl Statement {
    pub(crate) fn from_parts(clauses: &[ast::Clause], parameters: Props) -> Self {
        let statement = ast::render(clauses);
        debug_assert_eq!(
            placeholders(&statement),
            sorted_keys(&parameters),
            "statement placeholders must match parameter keys"
        );
        Self {
            statement,
            parameters,
        }
    }

    /// Statement text.
    pub fn text(&self) -> &str {
        &self.statement
    }

    /// Parameter map.
    pub fn parameters(&self) -> &Props {
        &self.parameters
    }

    /// Single parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Wire form of the statement.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "statement": self.statement,
            "parameters": Value::Object(self.parameters.clone()),
        })
    }
}

fn sorted_keys(parameters: &Props) -> Vec<String> {
    let mut keys: Vec<String> = parameters.keys().cloned().collect();
    keys.sort();
    keys
}

/// Sorted, de-duplicated parameter names referenced by `{name}` placeholders
/// in `text`. Back-tick quoted identifiers are skipped.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => {
                // `` is an escaped back-tick inside a quoted identifier.
                while let Some(q) = chars.next() {
                    if q == '`' {
                        if chars.peek() == Some(&'`') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '{' => {
                let mut name = String::new();
                for n in chars.by_ref() {
                    if n == '}' {
                        names.push(std::mem::take(&mut name));
                        break;
                    }
                    name.push(n);
                }
            }
            _ => {}
        }
    }
    names.sort();
    names.dedup();
    names
}
