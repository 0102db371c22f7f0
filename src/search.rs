//! Search sessions

use std::time::Duration;

use log::{debug, trace};

use crate::{
    connection::SessionRef,
    error::{Error, Result},
    model::{Entry, MessageId, SearchMessage},
};

/// Search session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Results may still arrive
    Active,
    /// The server sent its final result
    Exhausted,
    /// Cancelled by the caller or terminated by a protocol violation
    Closed,
}

/// One outstanding search request.
///
/// The session keeps the directory session alive until it is exhausted or closed,
/// even if the originating [`crate::Connection`] is closed first.
/// Search references are skipped.
///
/// Waiting for a result holds the shared directory session. Until that wait ends,
/// other searches and connection calls on the same session block, including from
/// other threads. Set a timeout with [`SearchSession::set_timeout`] or
/// [`crate::SearchOptions::timeout`] if that matters.
pub struct SearchSession {
    session: Option<SessionRef>,
    id: MessageId,
    timeout: Option<Duration>,
    state: SearchState,
}

impl SearchSession {
    pub(crate) fn new(session: SessionRef, id: MessageId, timeout: Option<Duration>) -> Self {
        Self {
            session: Some(session),
            id,
            timeout,
            state: SearchState::Active,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.id
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SearchState::Active
    }

    /// Set the timeout for waiting on the next result, `None` blocks indefinitely
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Wait for the next entry.
    ///
    /// Returns `Ok(None)` exactly once, when the server sends its final result.
    /// Any call after that, or after [`SearchSession::close`], fails with [`Error::SearchClosed`].
    /// [`Error::ResultTimeout`] and [`Error::ResultError`] leave the session open so the call can be retried.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let session = match (&self.session, self.state) {
            (Some(session), SearchState::Active) => session.clone(),
            _ => return Err(Error::SearchClosed),
        };

        loop {
            let polled = session.lock().directory.poll_result(self.id, self.timeout);

            match polled.map_err(Error::into_result_error)? {
                None => return Err(Error::ResultTimeout),
                Some(SearchMessage::Entry(raw)) => {
                    let entry = Entry::decode(raw);
                    trace!("Search {}: entry {}", self.id, entry.dn);
                    return Ok(Some(entry));
                }
                Some(SearchMessage::Reference(urls)) => {
                    debug!("Search {}: skipping reference {:?}", self.id, urls);
                }
                Some(SearchMessage::Done(result)) => {
                    debug!("Search {} done", self.id);
                    self.release(SearchState::Exhausted);
                    return result.map(|_| None).map_err(Error::server);
                }
                Some(SearchMessage::Unexpected(kind)) => {
                    self.release(SearchState::Closed);
                    return Err(Error::UnexpectedMessageType(kind));
                }
            }
        }
    }

    /// Cancel the search. Returns `false` if it was already exhausted or closed.
    pub fn close(&mut self) -> bool {
        if self.state == SearchState::Active {
            debug!("Search {} cancelled", self.id);
            self.release(SearchState::Closed);
            true
        } else {
            false
        }
    }

    fn release(&mut self, state: SearchState) {
        if let Some(session) = self.session.take() {
            session
                .lock()
                .directory
                .finish_search(self.id, state != SearchState::Exhausted);
        }
        self.state = state;
    }
}

impl Iterator for SearchSession {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_open() {
            return None;
        }
        self.next_entry().transpose()
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.close();
    }
}
