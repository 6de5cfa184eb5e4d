//! SQL database abstraction trait.

use sea_query::{InsertStatement, SelectStatement};
use sea_query_binder::SqlxValues;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type and query building methods. Statements are
/// rendered with bound parameters rather than inlined literals.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Name used in log lines.
    const NAME: &'static str;

    /// Build a parameterized query from a sea-query SELECT statement.
    fn build_select(stmt: SelectStatement) -> (String, SqlxValues);

    /// Build a parameterized query from a sea-query INSERT statement.
    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues);
}
