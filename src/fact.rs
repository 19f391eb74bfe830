//! Facts, literals, and the objects they range over.
//!
//! A fact is a predicate applied to objects. Objects are either concrete
//! constants, placeholders standing in for not-yet-sampled stream outputs, or
//! schema variables (only inside action/axiom/stream templates).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stream::InstanceId;

/// Predicate name of the equality pseudo-predicate.
pub const EQ: &str = "=";

/// Predicate name of the sentinel atom that optimizer blocking rules derive.
pub const UNSATISFIABLE: &str = "unsatisfiable";

/// Symbolic stand-in for one output slot of a sampler instance.
///
/// Two placeholders are equal exactly when they name the same instance and
/// output slot. Rebinding a fluent result creates a new instance, so it also
/// creates a disjoint set of placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    /// Instance that will produce the value.
    pub instance: InstanceId,
    /// Output slot of that instance.
    pub output_index: usize,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.instance, self.output_index)
    }
}

/// An argument of a fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Object {
    /// A concrete value.
    Constant(String),
    /// An optimistic value awaiting a sampler.
    Placeholder(Placeholder),
    /// A schema parameter such as `?x`.
    Variable(String),
}

impl Object {
    /// Creates a constant object.
    #[must_use]
    pub fn constant(name: impl Into<String>) -> Self {
        Self::Constant(name.into())
    }

    /// Creates a schema variable.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Whether this is a concrete object.
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Whether this stands for an unsampled output.
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Whether this is a schema variable.
    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    /// The placeholder, if this is one.
    pub const fn as_placeholder(&self) -> Option<Placeholder> {
        match self {
            Self::Placeholder(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(name) => write!(f, "{name}"),
            Self::Placeholder(p) => write!(f, "{p}"),
            Self::Variable(name) => write!(f, "{name}"),
        }
    }
}

impl From<Placeholder> for Object {
    fn from(p: Placeholder) -> Self {
        Self::Placeholder(p)
    }
}

/// Object substitution used to instantiate templates.
pub type Mapping = BTreeMap<Object, Object>;

/// Builds a mapping by zipping keys with values.
#[must_use]
pub fn mapping_from<'a>(
    keys: impl IntoIterator<Item = &'a Object>,
    values: impl IntoIterator<Item = &'a Object>,
) -> Mapping {
    keys.into_iter()
        .cloned()
        .zip(values.into_iter().cloned())
        .collect()
}

/// A predicate applied to objects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// Predicate name.
    pub predicate: String,
    /// Arguments.
    pub args: Vec<Object>,
}

impl Fact {
    /// Creates a fact.
    #[must_use]
    pub fn new(predicate: impl Into<String>, args: Vec<Object>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    /// Shorthand for a fact whose arguments are all constants.
    #[must_use]
    pub fn ground<S: AsRef<str>>(predicate: impl Into<String>, args: &[S]) -> Self {
        Self::new(
            predicate,
            args.iter().map(|a| Object::constant(a.as_ref())).collect(),
        )
    }

    /// The sentinel fact derived by optimizer blocking rules.
    #[must_use]
    pub fn unsatisfiable() -> Self {
        Self::new(UNSATISFIABLE, Vec::new())
    }

    /// True when every argument is a constant.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Object::is_constant)
    }

    /// True when some argument is a placeholder.
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.args.iter().any(Object::is_placeholder)
    }

    /// True for the equality pseudo-predicate.
    #[must_use]
    pub fn is_equality(&self) -> bool {
        self.predicate == EQ
    }

    /// Replaces every argument found in `mapping`.
    #[must_use]
    pub fn substitute(&self, mapping: &Mapping) -> Self {
        Self {
            predicate: self.predicate.clone(),
            args: self
                .args
                .iter()
                .map(|a| mapping.get(a).cloned().unwrap_or_else(|| a.clone()))
                .collect(),
        }
    }

    /// Positive literal of this fact.
    #[must_use]
    pub fn positive(self) -> Literal {
        Literal::positive(self)
    }

    /// Negative literal of this fact.
    #[must_use]
    pub fn negative(self) -> Literal {
        Literal::negative(self)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// A possibly negated fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// Underlying atom.
    pub fact: Fact,
    /// Whether the literal requires the atom to be false.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

impl Literal {
    /// Literal requiring `fact` to hold.
    #[must_use]
    pub const fn positive(fact: Fact) -> Self {
        Self {
            fact,
            negated: false,
        }
    }

    /// Literal requiring `fact` not to hold.
    #[must_use]
    pub const fn negative(fact: Fact) -> Self {
        Self {
            fact,
            negated: true,
        }
    }

    /// The literal with the opposite sign.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            fact: self.fact.clone(),
            negated: !self.negated,
        }
    }

    /// Predicate name of the underlying atom.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.fact.predicate
    }

    /// Apply `mapping` to the literal's fact.
    #[must_use]
    pub fn substitute(&self, mapping: &Mapping) -> Self {
        Self {
            fact: self.fact.substitute(mapping),
            negated: self.negated,
        }
    }

    /// Closed-world truth of this literal in `state`.
    #[must_use]
    pub fn holds_in<F>(&self, contains: F) -> bool
    where
        F: Fn(&Fact) -> bool,
    {
        contains(&self.fact) != self.negated
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not {}", self.fact)
        } else {
            write!(f, "{}", self.fact)
        }
    }
}
