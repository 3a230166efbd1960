//! Key Resolver: translate a condition tree into sets of candidate identities
//! using the store's native set algebra over the secondary indexes.
//!
//! A leaf whose index set does not exist cannot be answered and comes back
//! [`Resolution::Unindexed`]; the caller then scans the all-keys set and
//! relies on the materializer's in-memory predicate. AND nodes intersect only
//! their exactly-known branches, so a resolved set is an upper bound on the
//! true match set; the materializer re-applies the full predicate either way.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use log::trace;

use crate::error::Error;
use crate::keys;
use crate::model::{Model, Relationship, Value};
use crate::query::{Comparison, Condition, Subject};
use crate::store::Store;

pub(crate) enum Resolution {
    /// Definite candidate identities (possibly a superset for AND nodes with
    /// unresolvable branches).
    Keys(HashSet<String>),
    /// No index can answer the tree; scan and filter instead.
    Unindexed,
}

/// Intermediate form: a leaf that maps straight onto one index set keeps the
/// set's *key* so AND nodes can hand several of them to a native intersect.
enum Resolved {
    Index(String),
    Members(HashSet<String>),
    Unindexed,
}

pub(crate) async fn resolve<S: Store>(
    store: &mut S,
    model: &Model,
    condition: &Condition,
) -> Result<Resolution, Error> {
    match resolve_tree(store, model, condition).await? {
        Resolved::Index(key) => Ok(Resolution::Keys(store.set_members(&key).await?)),
        Resolved::Members(members) => Ok(Resolution::Keys(members)),
        Resolved::Unindexed => Ok(Resolution::Unindexed),
    }
}

fn resolve_tree<'a, S: Store>(
    store: &'a mut S,
    model: &'a Model,
    condition: &'a Condition,
) -> Pin<Box<dyn Future<Output = Result<Resolved, Error>> + 'a>> {
    Box::pin(async move {
        match condition {
            Condition::Compare(cmp) => resolve_leaf(store, model, cmp).await,
            Condition::All(children) => {
                let mut index_keys = Vec::new();
                let mut member_sets = Vec::new();
                for child in children {
                    match resolve_tree(store, model, child).await? {
                        Resolved::Index(key) => index_keys.push(key),
                        Resolved::Members(members) => member_sets.push(members),
                        // left for the materializer's predicate
                        Resolved::Unindexed => trace!("AND branch not answerable from indexes"),
                    }
                }
                let mut sets = member_sets.into_iter();
                let mut out = match index_keys.len() {
                    0 => match sets.next() {
                        Some(set) => set,
                        None => return Ok(Resolved::Unindexed),
                    },
                    1 => store.set_members(&index_keys[0]).await?,
                    _ => store.set_intersect(&index_keys).await?,
                };
                for set in sets {
                    out.retain(|id| set.contains(id));
                }
                Ok(Resolved::Members(out))
            }
            Condition::Any(children) => {
                let mut out = HashSet::new();
                for child in children {
                    match resolve_tree(store, model, child).await? {
                        Resolved::Index(key) => out.extend(store.set_members(&key).await?),
                        Resolved::Members(members) => out.extend(members),
                        // a union with an unknown branch has no usable bound
                        Resolved::Unindexed => return Ok(Resolved::Unindexed),
                    }
                }
                Ok(Resolved::Members(out))
            }
        }
    })
}

async fn resolve_leaf<S: Store>(
    store: &mut S,
    model: &Model,
    cmp: &Comparison,
) -> Result<Resolved, Error> {
    match &cmp.subject {
        Subject::Field(field) if model.is_key_field(field) => {
            resolve_key_field(store, model, cmp).await
        }
        Subject::Field(field) => resolve_indexed(store, model, field, cmp).await,
        Subject::Related(Relationship::ManyToOne { child_field }) => {
            resolve_indexed(store, model, child_field, cmp).await
        }
        Subject::Related(Relationship::ManyToMany {
            join_model,
            near_field,
            far_field,
        }) => {
            let matched =
                join_matches(store, join_model, near_field, far_field, cmp.op.values()).await?;
            if cmp.negated {
                let mut out = store.set_members(&keys::all_keys_set(model)).await?;
                out.retain(|id| !matched.contains(id));
                Ok(Resolved::Members(out))
            } else {
                Ok(Resolved::Members(matched))
            }
        }
    }
}

/// Primary-key leaf: a membership probe against the all-keys set per value.
async fn resolve_key_field<S: Store>(
    store: &mut S,
    model: &Model,
    cmp: &Comparison,
) -> Result<Resolved, Error> {
    let all = keys::all_keys_set(model);
    let mut matched = HashSet::new();
    for value in cmp.op.values() {
        let identity = value.to_stored();
        if store.set_contains(&all, &identity).await? {
            matched.insert(identity);
        }
    }
    if cmp.negated {
        let mut out = store.set_members(&all).await?;
        out.retain(|id| !matched.contains(id));
        Ok(Resolved::Members(out))
    } else {
        Ok(Resolved::Members(matched))
    }
}

/// Plain-field or many-to-one leaf, answered from field index sets.
async fn resolve_indexed<S: Store>(
    store: &mut S,
    model: &Model,
    field: &str,
    cmp: &Comparison,
) -> Result<Resolved, Error> {
    let mut indexes = Vec::new();
    for value in cmp.op.values() {
        let index = keys::field_index(&model.name, field, value);
        // an absent set may mean the field is unindexed, or merely that no
        // live record holds this value; either way no index answers the leaf
        if !store.exists(&index).await? {
            trace!("no index set at {index}");
            return Ok(Resolved::Unindexed);
        }
        indexes.push(index);
    }
    if cmp.negated {
        // complement within the live universe, server-side
        let mut args = vec![keys::all_keys_set(model)];
        args.extend(indexes);
        return Ok(Resolved::Members(store.set_difference(&args).await?));
    }
    if let [index] = indexes.as_slice() {
        return Ok(Resolved::Index(index.clone()));
    }
    let mut out = HashSet::new();
    for index in &indexes {
        out.extend(store.set_members(index).await?);
    }
    Ok(Resolved::Members(out))
}

/// Many-to-many traversal: enumerate the join model's index set for the far
/// foreign key, then read the near foreign key out of each join record. This
/// path always yields a definite (possibly empty) set.
pub(crate) async fn join_matches<S: Store>(
    store: &mut S,
    join_model: &Model,
    near_field: &str,
    far_field: &str,
    values: &[Value],
) -> Result<HashSet<String>, Error> {
    let mut matched = HashSet::new();
    for value in values {
        let index = keys::field_index(&join_model.name, far_field, value);
        for join_id in store.set_members(&index).await? {
            let hash = store
                .hash_get_all(&keys::record_hash(&join_model.name, &join_id))
                .await?;
            if let Some(near_key) = hash.get(near_field) {
                matched.insert(near_key.clone());
            }
        }
    }
    Ok(matched)
}
