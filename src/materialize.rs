//! Record Materializer: fetch candidate records, coerce stored text back into
//! typed values, and re-apply the query predicate in memory.
//!
//! The in-memory pass is required whenever the resolver returned a superset:
//! unindexed fallback, AND nodes with unresolvable branches, the many-to-many
//! scan path.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::keys;
use crate::model::{Model, Record, Relationship, Value};
use crate::query::{Condition, Direction, Query, Subject};
use crate::resolve;
use crate::store::Store;

/// Fetch and coerce the records behind `ids`. Identities whose hash has gone
/// missing (deleted between resolution and fetch) are skipped.
pub(crate) async fn fetch<S: Store>(
    store: &mut S,
    model: &Model,
    ids: &[String],
) -> Result<Vec<Record>, Error> {
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let hash = store
            .hash_get_all(&keys::record_hash(&model.name, id))
            .await?;
        if hash.is_empty() {
            continue;
        }
        let mut record = Record::new();
        for (field, raw) in hash {
            let value = match model.find_property(&field) {
                Some(property) => property.kind.coerce(&field, &raw)?,
                None => Value::Str(raw),
            };
            record.insert(field, value);
        }
        records.push(record);
    }
    Ok(records)
}

/// A condition tree compiled for synchronous per-record evaluation: field
/// leaves compare stored forms, many-to-many leaves have been resolved up
/// front into identity sets.
pub(crate) enum Predicate {
    Field {
        field: String,
        stored: Vec<String>,
        negated: bool,
    },
    MemberOf {
        ids: HashSet<String>,
        negated: bool,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

pub(crate) fn prepare<'a, S: Store>(
    store: &'a mut S,
    model: &'a Model,
    condition: &'a Condition,
) -> Pin<Box<dyn Future<Output = Result<Predicate, Error>> + 'a>> {
    Box::pin(async move {
        match condition {
            Condition::All(children) => {
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    out.push(prepare(store, model, child).await?);
                }
                Ok(Predicate::All(out))
            }
            Condition::Any(children) => {
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    out.push(prepare(store, model, child).await?);
                }
                Ok(Predicate::Any(out))
            }
            Condition::Compare(cmp) => {
                let stored = || cmp.op.values().iter().map(Value::to_stored).collect();
                match &cmp.subject {
                    Subject::Field(field) => Ok(Predicate::Field {
                        field: field.clone(),
                        stored: stored(),
                        negated: cmp.negated,
                    }),
                    Subject::Related(Relationship::ManyToOne { child_field }) => {
                        Ok(Predicate::Field {
                            field: child_field.clone(),
                            stored: stored(),
                            negated: cmp.negated,
                        })
                    }
                    Subject::Related(Relationship::ManyToMany {
                        join_model,
                        near_field,
                        far_field,
                    }) => {
                        let ids = resolve::join_matches(
                            store,
                            join_model,
                            near_field,
                            far_field,
                            cmp.op.values(),
                        )
                        .await?;
                        Ok(Predicate::MemberOf {
                            ids,
                            negated: cmp.negated,
                        })
                    }
                }
            }
        }
    })
}

impl Predicate {
    pub(crate) fn matches(&self, model: &Model, record: &Record) -> Result<bool, Error> {
        Ok(match self {
            Predicate::Field {
                field,
                stored,
                negated,
            } => {
                // null (absent) fields never equal a concrete value
                let hit = record
                    .get(field)
                    .is_some_and(|v| stored.contains(&v.to_stored()));
                hit != *negated
            }
            Predicate::MemberOf { ids, negated } => {
                ids.contains(&model.identity(record)?) != *negated
            }
            Predicate::All(children) => {
                for child in children {
                    if !child.matches(model, record)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Any(children) => {
                for child in children {
                    if child.matches(model, record)? {
                        return Ok(true);
                    }
                }
                false
            }
        })
    }
}

/// In-memory ordering and pagination, used whenever a condition was present.
pub(crate) fn order_and_slice(records: &mut Vec<Record>, query: &Query) {
    if !query.order.is_empty() {
        records.sort_by(|a, b| {
            for order in &query.order {
                let ord = compare_values(a.get(&order.field), b.get(&order.field));
                let ord = match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    if query.offset > 0 {
        let offset = query.offset.min(records.len());
        records.drain(..offset);
    }
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
}

pub(crate) fn project(records: Vec<Record>, fields: &[String]) -> Vec<Record> {
    if fields.is_empty() {
        return records;
    }
    records
        .into_iter()
        .map(|record| record.project(fields))
        .collect()
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x, y) {
            (Value::Int(i), Value::Int(j)) => i.cmp(j),
            (Value::DateTime(i), Value::DateTime(j)) => i.cmp(j),
            (Value::Date(i), Value::Date(j)) => i.cmp(j),
            _ => x.to_stored().cmp(&y.to_stored()),
        },
    }
}
