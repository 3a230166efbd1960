//! A record/query layer over hash-and-set key-value stores.
//!
//! Records (typed fields, composite primary keys) live in per-record hashes;
//! per-field secondary indexes and a per-model all-keys set live in native
//! sets. Queries are boolean trees of equality/inclusion/relationship
//! comparisons, answered where possible by set algebra over the indexes and
//! backstopped by an in-memory filter during materialization.
//!
//! ```no_run
//! use kv_record::{Condition, Database, MemoryStore, Model, PropertyKind, Query, Record};
//!
//! # async fn demo() -> Result<(), kv_record::Error> {
//! let book = Model::new("book")
//!     .key("id", PropertyKind::Serial)
//!     .indexed("title", PropertyKind::String);
//!
//! let mut db = Database::new(MemoryStore::new());
//! let mut rows = vec![Record::new().with("title", "Harry Potter")];
//! db.create(&book, &mut rows).await?;
//!
//! let found = db
//!     .read(&Query::new(book.clone()).filter(Condition::eq("title", "Harry Potter")))
//!     .await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

mod db;
mod error;
pub mod keys;
mod materialize;
mod model;
mod query;
mod resolve;
mod store;

pub use db::Database;
pub use error::Error;
pub use model::{Model, Property, PropertyKind, Record, Relationship, Value};
pub use query::{Comparison, Condition, Direction, Operator, Order, Query, Subject};
pub use store::{MemoryStore, RedisStore, Store};
