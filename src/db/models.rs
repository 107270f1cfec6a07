use sqlx::FromRow;

/// One row of the key-value table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}
