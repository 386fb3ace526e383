//! Media server client
//!
//! GraphQL implementation of [`StashBackend`](crate::tagger::StashBackend).

pub mod graphql;

pub use graphql::GraphqlClient;
