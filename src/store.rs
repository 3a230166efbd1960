//! Storage primitives: the thin slice of the backing store the adapter needs.
//!
//! [`Store`] is the round-trip boundary: hash field access, set membership
//! algebra, an atomic counter, and sort-by-external-key. [`RedisStore`] maps it
//! onto a Redis connection; [`MemoryStore`] gives the same observable
//! semantics in-process (tests run against it).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::error::Error;

/// One awaited call is one store round trip; callers issue them sequentially
/// and get no atomicity across calls.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn hash_get_all(&mut self, key: &str) -> Result<HashMap<String, String>, Error>;
    async fn hash_set(&mut self, key: &str, fields: &[(String, String)]) -> Result<(), Error>;
    async fn hash_delete(&mut self, key: &str, fields: &[String]) -> Result<(), Error>;
    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), Error>;
    async fn set_remove(&mut self, key: &str, member: &str) -> Result<(), Error>;
    async fn set_members(&mut self, key: &str) -> Result<HashSet<String>, Error>;
    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, Error>;
    /// Intersection of the named sets; any absent key empties the result.
    async fn set_intersect(&mut self, keys: &[String]) -> Result<HashSet<String>, Error>;
    /// First named set minus all the others.
    async fn set_difference(&mut self, keys: &[String]) -> Result<HashSet<String>, Error>;
    /// Whether the key exists at all (an empty set does not).
    async fn exists(&mut self, key: &str) -> Result<bool, Error>;
    async fn increment(&mut self, key: &str) -> Result<i64, Error>;
    /// Sort the members of `key`, optionally weighting each member `m` by the
    /// hash field named by `by` with `*` replaced by `m` (`hashkey->field`
    /// form). `alpha` selects lexicographic over numeric comparison.
    async fn sort(
        &mut self,
        key: &str,
        by: Option<&str>,
        limit: Option<(usize, usize)>,
        descending: bool,
        alpha: bool,
    ) -> Result<Vec<String>, Error>;
    /// Drop everything. Test and bootstrap convenience.
    async fn flush(&mut self) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

impl Store for RedisStore {
    async fn hash_get_all(&mut self, key: &str) -> Result<HashMap<String, String>, Error> {
        Ok(self.conn.hgetall(key).await?)
    }

    async fn hash_set(&mut self, key: &str, fields: &[(String, String)]) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }
        let _: () = self.conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hash_delete(&mut self, key: &str, fields: &[String]) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }
        let _: () = self.conn.hdel(key, fields.to_vec()).await?;
        Ok(())
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), Error> {
        let _: () = self.conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&mut self, key: &str, member: &str) -> Result<(), Error> {
        let _: () = self.conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&mut self, key: &str) -> Result<HashSet<String>, Error> {
        Ok(self.conn.smembers(key).await?)
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, Error> {
        Ok(self.conn.sismember(key, member).await?)
    }

    async fn set_intersect(&mut self, keys: &[String]) -> Result<HashSet<String>, Error> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self.conn.sinter(keys.to_vec()).await?)
    }

    async fn set_difference(&mut self, keys: &[String]) -> Result<HashSet<String>, Error> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self.conn.sdiff(keys.to_vec()).await?)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, Error> {
        Ok(self.conn.exists(key).await?)
    }

    async fn increment(&mut self, key: &str) -> Result<i64, Error> {
        Ok(self.conn.incr(key, 1i64).await?)
    }

    async fn sort(
        &mut self,
        key: &str,
        by: Option<&str>,
        limit: Option<(usize, usize)>,
        descending: bool,
        alpha: bool,
    ) -> Result<Vec<String>, Error> {
        let mut cmd = redis::cmd("SORT");
        cmd.arg(key);
        if let Some(pattern) = by {
            cmd.arg("BY").arg(pattern);
        }
        if let Some((offset, count)) = limit {
            cmd.arg("LIMIT").arg(offset).arg(count);
        }
        if descending {
            cmd.arg("DESC");
        }
        if alpha {
            cmd.arg("ALPHA");
        }
        Ok(cmd.query_async(&mut self.conn).await?)
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let _: () = redis::cmd("FLUSHDB").query_async(&mut self.conn).await?;
        Ok(())
    }
}

/// In-process store with Redis-shaped semantics. Cheap to clone; clones share
/// the same data, so tests can inspect what the adapter wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    counters: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    async fn hash_get_all(&mut self, key: &str) -> Result<HashMap<String, String>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_set(&mut self, key: &str, fields: &[(String, String)]) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_delete(&mut self, key: &str, fields: &[String]) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(hash) = inner.hashes.get_mut(key) {
            for field in fields {
                hash.remove(field);
            }
            if hash.is_empty() {
                inner.hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&mut self, key: &str, member: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
            // an emptied set key ceases to exist, as in Redis
            if set.is_empty() {
                inner.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&mut self, key: &str) -> Result<HashSet<String>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).cloned().unwrap_or_default())
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn set_intersect(&mut self, keys: &[String]) -> Result<HashSet<String>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut iter = keys.iter();
        let Some(first) = iter.next() else {
            return Ok(HashSet::new());
        };
        let mut out = inner.sets.get(first).cloned().unwrap_or_default();
        for key in iter {
            match inner.sets.get(key) {
                Some(set) => out.retain(|m| set.contains(m)),
                None => return Ok(HashSet::new()),
            }
        }
        Ok(out)
    }

    async fn set_difference(&mut self, keys: &[String]) -> Result<HashSet<String>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut iter = keys.iter();
        let Some(first) = iter.next() else {
            return Ok(HashSet::new());
        };
        let mut out = inner.sets.get(first).cloned().unwrap_or_default();
        for key in iter {
            if let Some(set) = inner.sets.get(key) {
                out.retain(|m| !set.contains(m));
            }
        }
        Ok(out)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.counters.contains_key(key))
    }

    async fn increment(&mut self, key: &str) -> Result<i64, Error> {
        let mut inner = self.inner.lock().unwrap();
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn sort(
        &mut self,
        key: &str,
        by: Option<&str>,
        limit: Option<(usize, usize)>,
        descending: bool,
        alpha: bool,
    ) -> Result<Vec<String>, Error> {
        let inner = self.inner.lock().unwrap();
        let members: Vec<String> = inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        // weight of a member: the member itself, or the BY pattern expanded
        // against it (`prefix*suffix` with suffix carrying `->field`)
        let weight_of = |member: &str| -> Option<String> {
            let Some(pattern) = by else {
                return Some(member.to_string());
            };
            let (head, tail) = pattern.split_once('*')?;
            let expanded = format!("{head}{member}{tail}");
            let (hash_key, field) = expanded.split_once("->")?;
            inner.hashes.get(hash_key).and_then(|h| h.get(field)).cloned()
        };

        let mut weighted = Vec::with_capacity(members.len());
        for member in members {
            let weight = weight_of(&member);
            let numeric = if alpha {
                0.0
            } else {
                match &weight {
                    Some(w) => w.parse::<f64>().map_err(|_| Error::BadStoredValue {
                        field: key.to_string(),
                        value: w.clone(),
                    })?,
                    None => 0.0,
                }
            };
            weighted.push((weight.unwrap_or_default(), numeric, member));
        }

        if alpha {
            weighted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.cmp(&b.2)));
        } else {
            weighted.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.cmp(&b.2)));
        }
        if descending {
            weighted.reverse();
        }

        let mut out: Vec<String> = weighted.into_iter().map(|(_, _, m)| m).collect();
        if let Some((offset, count)) = limit {
            out = out.into_iter().skip(offset).take(count).collect();
        }
        Ok(out)
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.hashes.clear();
        inner.sets.clear();
        inner.counters.clear();
        Ok(())
    }
}
