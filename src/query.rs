//! Query construction: condition trees and the fluent [`Query`] builder.
//!
//! Conditions form a closed vocabulary — equality and inclusion leaves over
//! plain fields or relationships, composed with AND/OR. Negation lives on the
//! leaf as a flag; [`Condition::negate`] rewrites composite NOT via De Morgan
//! before anything reaches the resolver.

use crate::model::{Model, Relationship, Value};

#[derive(Clone, Debug)]
pub enum Subject {
    Field(String),
    Related(Relationship),
}

#[derive(Clone, Debug)]
pub enum Operator {
    Equal(Value),
    In(Vec<Value>),
}

impl Operator {
    pub(crate) fn values(&self) -> &[Value] {
        match self {
            Operator::Equal(v) => std::slice::from_ref(v),
            Operator::In(vs) => vs,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Comparison {
    pub subject: Subject,
    pub op: Operator,
    pub negated: bool,
}

#[derive(Clone, Debug)]
pub enum Condition {
    Compare(Comparison),
    /// AND over children.
    All(Vec<Condition>),
    /// OR over children.
    Any(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Condition::Compare(Comparison {
            subject: Subject::Field(field.to_string()),
            op: Operator::Equal(value.into()),
            negated: false,
        })
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Condition::eq(field, value).negate()
    }

    pub fn one_of(field: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Condition::Compare(Comparison {
            subject: Subject::Field(field.to_string()),
            op: Operator::In(values.into_iter().map(Into::into).collect()),
            negated: false,
        })
    }

    /// Records whose `relationship` reaches the given parent key value.
    pub fn related(relationship: Relationship, parent_key: impl Into<Value>) -> Self {
        Condition::Compare(Comparison {
            subject: Subject::Related(relationship),
            op: Operator::Equal(parent_key.into()),
            negated: false,
        })
    }

    pub fn all(children: Vec<Condition>) -> Self {
        Condition::All(children)
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Condition::Any(children)
    }

    /// Logical NOT, normalized away at construction time: leaves toggle their
    /// flag, AND/OR swap and recurse (De Morgan).
    pub fn negate(self) -> Self {
        match self {
            Condition::Compare(mut cmp) => {
                cmp.negated = !cmp.negated;
                Condition::Compare(cmp)
            }
            Condition::All(children) => {
                Condition::Any(children.into_iter().map(Condition::negate).collect())
            }
            Condition::Any(children) => {
                Condition::All(children.into_iter().map(Condition::negate).collect())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// A read/update/delete selector: model, optional condition tree, ordering,
/// pagination, and projected fields (empty = all).
#[derive(Clone, Debug)]
pub struct Query {
    pub model: Model,
    pub condition: Option<Condition>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub fields: Vec<String>,
}

impl Query {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            condition: None,
            order: Vec::new(),
            limit: None,
            offset: 0,
            fields: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order.push(Order {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}
