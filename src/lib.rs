#![doc = include_str!("../README.md")]

pub use bytes;
pub use rasn_ldap;

pub use connection::{Connection, ConnectionBuilder};
pub use error::{Bound, Error, OperationError, Result};
pub use model::*;
pub use options::*;
pub use search::{SearchSession, SearchState};
pub use value::{Table, Value};

pub(crate) mod channel;
pub(crate) mod codec;
pub(crate) mod conn;
pub(crate) mod filter;
pub(crate) mod request;

pub mod attrs;
pub mod client;
pub mod connection;
pub mod directory;
pub mod error;
pub mod model;
pub mod options;
pub mod search;
pub mod value;

#[cfg(test)]
pub(crate) mod fake;
