//! The adapter façade: create/read/update/delete over a [`Store`], plus the
//! index maintenance the read path depends on.
//!
//! Each logical mutation issues several independent store round trips (all-keys
//! membership, record hash, one index set per indexed field). There is no
//! atomicity across them: a crash mid-write can leave an index entry stale
//! relative to the record hash, and batch operations are at-least-once — a
//! failure partway through leaves earlier records committed.

use log::debug;

use crate::error::Error;
use crate::keys;
use crate::materialize;
use crate::model::{Model, PropertyKind, Record, Value};
use crate::query::{Direction, Query};
use crate::resolve::{self, Resolution};
use crate::store::{RedisStore, Store};

pub struct Database<S> {
    store: S,
}

impl Database<RedisStore> {
    /// Connect to a Redis-compatible server.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        Ok(Self {
            store: RedisStore::connect(url).await?,
        })
    }
}

impl<S: Store> Database<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Insert records. Serial primary-key fields left unset are assigned from
    /// the per-model counter, in place, so callers see the identities they got.
    pub async fn create(&mut self, model: &Model, records: &mut [Record]) -> Result<(), Error> {
        for record in records.iter_mut() {
            for field in &model.key_fields {
                let property = model
                    .find_property(field)
                    .ok_or_else(|| Error::UnknownField(field.clone()))?;
                if property.kind == PropertyKind::Serial && record.get(field).is_none() {
                    let next = self.store.increment(&keys::serial_counter(model)).await?;
                    record.insert(field.clone(), Value::Int(next));
                }
            }
            let identity = model.identity(record)?;
            debug!("create {}:{identity}", model.name);

            self.store
                .set_add(&keys::all_keys_set(model), &identity)
                .await?;

            let mut fields = Vec::with_capacity(record.len());
            for (field, value) in record.fields() {
                if model.find_property(field).is_none() {
                    return Err(Error::UnknownField(field.clone()));
                }
                if model.is_indexed(field) {
                    self.store
                        .set_add(&keys::field_index(&model.name, field, value), &identity)
                        .await?;
                }
                fields.push((field.clone(), value.to_stored()));
            }
            self.store
                .hash_set(&keys::record_hash(&model.name, &identity), &fields)
                .await?;
        }
        Ok(())
    }

    /// Run a query: resolve the condition against the indexes, materialize,
    /// filter, order, paginate, project.
    pub async fn read(&mut self, query: &Query) -> Result<Vec<Record>, Error> {
        let model = &query.model;

        // With no condition and at most one order field, enumeration, ordering
        // and pagination are the store's native SORT over the all-keys set.
        if query.condition.is_none() && query.order.len() <= 1 {
            let ids = self.enumerate_sorted(query).await?;
            let records = materialize::fetch(&mut self.store, model, &ids).await?;
            return Ok(materialize::project(records, &query.fields));
        }

        let ids: Vec<String> = match &query.condition {
            Some(condition) => {
                match resolve::resolve(&mut self.store, model, condition).await? {
                    Resolution::Keys(ids) => ids.into_iter().collect(),
                    Resolution::Unindexed => {
                        debug!("{} query not answerable from indexes, scanning", model.name);
                        self.store
                            .set_members(&keys::all_keys_set(model))
                            .await?
                            .into_iter()
                            .collect()
                    }
                }
            }
            None => self
                .store
                .set_members(&keys::all_keys_set(model))
                .await?
                .into_iter()
                .collect(),
        };

        let fetched = materialize::fetch(&mut self.store, model, &ids).await?;
        let mut records = match &query.condition {
            Some(condition) => {
                let predicate = materialize::prepare(&mut self.store, model, condition).await?;
                let mut kept = Vec::with_capacity(fetched.len());
                for record in fetched {
                    if predicate.matches(model, &record)? {
                        kept.push(record);
                    }
                }
                kept
            }
            None => fetched,
        };

        materialize::order_and_slice(&mut records, query);
        Ok(materialize::project(records, &query.fields))
    }

    /// Apply `changes` to every record the selector matches. A change to
    /// `None` nulls the field (the hash field is deleted). Primary-key fields
    /// cannot change; identities are immutable.
    pub async fn update(
        &mut self,
        changes: &[(String, Option<Value>)],
        query: &Query,
    ) -> Result<(), Error> {
        let model = query.model.clone();
        for (field, _) in changes {
            if model.find_property(field).is_none() {
                return Err(Error::UnknownField(field.clone()));
            }
            if model.is_key_field(field) {
                return Err(Error::InvalidIdentity(format!(
                    "primary key field {field} cannot be updated"
                )));
            }
        }

        let mut selector = query.clone();
        selector.fields.clear();
        let records = self.read(&selector).await?;

        for record in records {
            let identity = model.identity(&record)?;
            debug!("update {}:{identity}", model.name);
            let hash_key = keys::record_hash(&model.name, &identity);
            for (field, change) in changes {
                let old = record.get(field);
                let unchanged = match (old, change) {
                    (Some(o), Some(n)) => o.to_stored() == n.to_stored(),
                    (None, None) => true,
                    _ => false,
                };
                if unchanged {
                    continue;
                }
                // membership under the old value is now stale; drop it before
                // anything else so a crash cannot leave both entries behind
                if model.is_indexed(field) {
                    if let Some(old) = old {
                        self.store
                            .set_remove(&keys::field_index(&model.name, field, old), &identity)
                            .await?;
                    }
                }
                match change {
                    Some(value) => {
                        self.store
                            .hash_set(&hash_key, &[(field.clone(), value.to_stored())])
                            .await?;
                        if model.is_indexed(field) {
                            self.store
                                .set_add(&keys::field_index(&model.name, field, value), &identity)
                                .await?;
                        }
                    }
                    None => {
                        self.store
                            .hash_delete(&hash_key, std::slice::from_ref(field))
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove every record the selector matches, together with its all-keys
    /// membership and the index entries for its current field values.
    pub async fn delete(&mut self, query: &Query) -> Result<(), Error> {
        let model = query.model.clone();
        let mut selector = query.clone();
        selector.fields.clear();
        let records = self.read(&selector).await?;

        for record in records {
            let identity = model.identity(&record)?;
            debug!("delete {}:{identity}", model.name);
            self.store
                .set_remove(&keys::all_keys_set(&model), &identity)
                .await?;
            let mut field_names = Vec::with_capacity(record.len());
            for (field, value) in record.fields() {
                if model.is_indexed(field) {
                    self.store
                        .set_remove(&keys::field_index(&model.name, field, value), &identity)
                        .await?;
                }
                field_names.push(field.clone());
            }
            self.store
                .hash_delete(&keys::record_hash(&model.name, &identity), &field_names)
                .await?;
        }
        Ok(())
    }

    pub async fn count(&mut self, query: &Query) -> Result<usize, Error> {
        Ok(self.read(query).await?.len())
    }

    pub async fn first(&mut self, query: &Query) -> Result<Option<Record>, Error> {
        let mut limited = query.clone();
        limited.limit = Some(1);
        Ok(self.read(&limited).await?.into_iter().next())
    }

    /// Drop all data in the store.
    pub async fn flush_all(&mut self) -> Result<(), Error> {
        self.store.flush().await
    }

    /// Condition-free enumeration: the store sorts the all-keys set, weighting
    /// by the record hash field when an order is given, and applies LIMIT.
    async fn enumerate_sorted(&mut self, query: &Query) -> Result<Vec<String>, Error> {
        let model = &query.model;
        let all = keys::all_keys_set(model);
        let (by, descending, alpha) = match query.order.first() {
            Some(order) => {
                let property = model
                    .find_property(&order.field)
                    .ok_or_else(|| Error::UnknownField(order.field.clone()))?;
                let numeric = matches!(
                    property.kind,
                    PropertyKind::Integer | PropertyKind::Serial
                );
                (
                    Some(format!("{}:*->{}", model.name, order.field)),
                    order.direction == Direction::Descending,
                    !numeric,
                )
            }
            // no explicit order: store-native, sorted over the identities
            None => (None, false, true),
        };
        let limit = query.limit.map(|count| (query.offset, count));
        let mut ids = self
            .store
            .sort(&all, by.as_deref(), limit, descending, alpha)
            .await?;
        // offset without a limit cannot be expressed in a LIMIT clause
        if query.limit.is_none() && query.offset > 0 {
            let offset = query.offset.min(ids.len());
            ids.drain(..offset);
        }
        Ok(ids)
    }
}
