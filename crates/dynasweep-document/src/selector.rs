//! Path selectors over document trees
//!
//! A selector is a `/`-separated list of steps, each a key optionally
//! followed by a `[Field=Value]` filter:
//!
//! - `Duration` → the first `Duration` node at any depth
//! - `MSD/Species` → `Species` directly under an `MSD` node
//! - `EventCounters/Entry[Name=SOCells]` → the `Entry` element whose
//!   `Name` field equals `SOCells`
//!
//! The first step matches at any depth, following steps match direct
//! children. Arrays are transparent: a key holding an array yields each
//! element.

use crate::error::DocumentError;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    key: String,
    filter: Option<(String, String)>,
}

impl Step {
    fn parse(text: &str) -> Result<Self, DocumentError> {
        let invalid = || DocumentError::InvalidSelector(text.to_string());
        let (key, filter) = match text.find('[') {
            None => (text, None),
            Some(open) => {
                let inner = text[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
                let (field, value) = inner.split_once('=').ok_or_else(invalid)?;
                let value = value.trim_matches(|c| c == '"' || c == '\'');
                if field.is_empty() {
                    return Err(invalid());
                }
                (&text[..open], Some((field.to_string(), value.to_string())))
            }
        };
        if key.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            key: key.to_string(),
            filter,
        })
    }

    fn accepts(&self, node: &Value) -> bool {
        let Some((field, expected)) = &self.filter else {
            return true;
        };
        match node.get(field) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == *expected,
            Some(Value::Bool(b)) => b.to_string() == *expected,
            _ => false,
        }
    }

    /// Direct children of `node` matched by this step
    fn children<'a>(&self, node: &'a Value, out: &mut Vec<&'a Value>) {
        let Some(child) = node.as_object().and_then(|map| map.get(&self.key)) else {
            return;
        };
        match child {
            Value::Array(items) => out.extend(items.iter().filter(|item| self.accepts(item))),
            other if self.accepts(other) => out.push(other),
            _ => {}
        }
    }
}

/// A parsed document selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<Step>,
    text: String,
}

impl Selector {
    /// Parse a selector
    ///
    /// # Errors
    /// `InvalidSelector` on empty steps or malformed filters
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let steps = text
            .split('/')
            .map(Step::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            steps,
            text: text.to_string(),
        })
    }

    /// All matching nodes in document order
    #[must_use]
    pub fn select_all<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let Some((first, rest)) = self.steps.split_first() else {
            return Vec::new();
        };

        let mut current = Vec::new();
        visit(root, &mut |node| first.children(node, &mut current));

        for step in rest {
            let mut next = Vec::new();
            for node in current {
                step.children(node, &mut next);
            }
            current = next;
        }
        current
    }

    /// First matching node
    #[must_use]
    pub fn select<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.select_all(root).into_iter().next()
    }

    /// Selector source text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Pre-order walk over every node of the tree
fn visit<'a>(node: &'a Value, f: &mut impl FnMut(&'a Value)) {
    f(node);
    match node {
        Value::Object(map) => map.values().for_each(|child| visit(child, f)),
        Value::Array(items) => items.iter().for_each(|child| visit(child, f)),
        _ => {}
    }
}

impl FromStr for Selector {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
