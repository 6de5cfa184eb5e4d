//! Unified SQL storage implementations.
//!
//! This module provides the shared [`ResponseStore`](crate::interfaces::ResponseStore)
//! implementation for SQL-based backends (PostgreSQL, SQLite). The
//! implementation is parameterized by database type using the `SqlDatabase`
//! trait.

mod query;
mod response_store;
pub(crate) mod statements;


pub use query::SqlDatabase;
pub use response_store::SqlResponseStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};
    use sqlx::PgPool;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        const NAME: &'static str = "postgres";

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }
    }

    /// PostgreSQL response store.
    pub type PostgresResponseStore = super::SqlResponseStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};
    use sqlx::SqlitePool;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        const NAME: &'static str = "sqlite";

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }
    }

    /// SQLite response store.
    pub type SqliteResponseStore = super::SqlResponseStore<Sqlite>;
}
