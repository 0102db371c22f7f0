//! Directory primitives
//!
//! [`Directory`] is the contract between the session layer and whatever
//! actually talks to the server. [`crate::client::LdapClient`] implements it
//! over TCP; tests plug in scripted implementations.

use std::time::Duration;

use bytes::Bytes;

use crate::{
    error::Result,
    model::{MessageId, Operation, SearchMessage, SearchParams},
};

/// Blocking LDAP primitives.
///
/// Server-side rejections are reported as [`crate::error::Error::ServerError`].
/// Implementations must support several outstanding searches multiplexed by message id.
pub trait Directory: Send {
    /// Simple bind; `None` credentials perform an anonymous bind
    fn bind_simple(&mut self, who: Option<&str>, password: Option<&str>) -> Result<()>;

    /// Release the session. Called at most once.
    fn unbind(&mut self) -> Result<()>;

    /// Submit an add, delete or modify operation and wait for its result
    fn submit(&mut self, op: Operation) -> Result<()>;

    /// Compare an attribute value. `Ok(true)`/`Ok(false)` are both successful outcomes.
    fn compare(&mut self, dn: &str, attribute: &str, value: Bytes) -> Result<bool>;

    /// Submit a search and return its message id without waiting for results
    fn submit_search(&mut self, params: &SearchParams) -> Result<MessageId>;

    /// Wait for the next result message of a search.
    ///
    /// `None` timeout blocks indefinitely; `Ok(None)` means the timeout elapsed.
    fn poll_result(&mut self, id: MessageId, timeout: Option<Duration>) -> Result<Option<SearchMessage>>;

    /// Free all state of a search. `abandon` asks the server to stop sending results.
    /// Must not wait for the server.
    fn finish_search(&mut self, id: MessageId, abandon: bool);
}
