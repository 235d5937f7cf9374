//! Storage layer for persisting nodes, links and repository objects.
//!
//! Provides an abstraction over storage backends; `MemStore` keeps everything
//! in memory and supports nested transactions through savepoints.

pub mod data;
mod db;
pub mod query;
mod store;

use strum::{AsRefStr, EnumIter};

use crate::Result;

use query::*;

pub use db::MemStore;
pub use store::Store;

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq, EnumIter)]
pub enum StoreIden {
    /// Node records.
    #[strum(serialize = "nodes")]
    Nodes,
    /// Provenance links.
    #[strum(serialize = "links")]
    Links,
    /// Content-addressed repository objects.
    #[strum(serialize = "objects")]
    Objects,
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Queries records with filtering and ordering.
    fn query(
        &self,
        query: &Query,
    ) -> Result<Vec<Self::Item>>;

    /// Creates a new record.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Deletes a record by ID.
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;
}

/// Trait for database store backends.
///
/// Transactions nest: every `begin` opens a savepoint that is closed by the
/// matching `commit` or `rollback`.
pub trait DbStore: Send + Sync {
    /// Initializes the database and registers collections with the store.
    fn init(
        &self,
        s: &Store,
    );

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}
