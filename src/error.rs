#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("bad stored value for {field}: {value:?}")]
    BadStoredValue { field: String, value: String },
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}
