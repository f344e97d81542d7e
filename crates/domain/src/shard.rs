//! The `(db, table)` pair a sharding key routes to.

use std::fmt;

/// A target database/table pair. `db == ""` denotes the default/single-DB
/// deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardTarget {
    pub db: String,
    pub table: String,
}

impl ShardTarget {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self { db: db.into(), table: table.into() }
    }

    pub fn single(table: impl Into<String>) -> Self {
        Self { db: String::new(), table: table.into() }
    }

    /// Key used to identify this shard's distributed lock
    /// (`"<db>.<table>"`).
    pub fn lock_key(&self) -> String {
        format!("{}.{}", self.db, self.table)
    }
}

impl fmt::Display for ShardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.db.is_empty() {
            f.write_str(&self.table)
        } else {
            write!(f, "{}.{}", self.db, self.table)
        }
    }
}
