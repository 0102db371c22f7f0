//! Scripted in-memory directory used by unit tests

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use parking_lot::Mutex;
use rasn_ldap::ResultCode;

use crate::{
    directory::Directory,
    error::{Error, OperationError, Result},
    model::{Attribute, MessageId, Operation, RawEntry, SearchMessage, SearchParams},
};

pub(crate) type PollStep = Result<Option<SearchMessage>>;

/// Every call the session layer made, in order
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub binds: Vec<(Option<String>, Option<String>)>,
    pub unbinds: usize,
    pub submits: Vec<Operation>,
    pub compares: Vec<(String, String, Bytes)>,
    pub searches: Vec<SearchParams>,
    pub polls: usize,
    pub finished: Vec<(MessageId, bool)>,
}

pub(crate) struct FakeDirectory {
    calls: Arc<Mutex<Calls>>,
    bind_error: Option<OperationError>,
    search_error: Option<OperationError>,
    submit_results: VecDeque<Result<()>>,
    compare_results: VecDeque<Result<bool>>,
    scripts: VecDeque<Vec<PollStep>>,
    active: HashMap<MessageId, VecDeque<PollStep>>,
    next_id: MessageId,
}

impl FakeDirectory {
    pub fn new() -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let fake = Self {
            calls: calls.clone(),
            bind_error: None,
            search_error: None,
            submit_results: VecDeque::new(),
            compare_results: VecDeque::new(),
            scripts: VecDeque::new(),
            active: HashMap::new(),
            next_id: 1,
        };
        (fake, calls)
    }

    pub fn fail_bind(mut self, message: &str) -> Self {
        self.bind_error = Some(OperationError::new(ResultCode::InvalidCredentials, message));
        self
    }

    pub fn fail_search(mut self, message: &str) -> Self {
        self.search_error = Some(OperationError::new(ResultCode::ProtocolError, message));
        self
    }

    /// Queue the outcome of the next add/delete/modify; unqueued submissions succeed
    pub fn submit_result(mut self, result: Result<()>) -> Self {
        self.submit_results.push_back(result);
        self
    }

    pub fn compare_result(mut self, result: Result<bool>) -> Self {
        self.compare_results.push_back(result);
        self
    }

    /// Queue the poll results of the next submitted search
    pub fn search_script(mut self, steps: Vec<PollStep>) -> Self {
        self.scripts.push_back(steps);
        self
    }
}

impl Directory for FakeDirectory {
    fn bind_simple(&mut self, who: Option<&str>, password: Option<&str>) -> Result<()> {
        self.calls
            .lock()
            .binds
            .push((who.map(str::to_owned), password.map(str::to_owned)));
        match &self.bind_error {
            Some(e) => Err(Error::server(e.clone())),
            None => Ok(()),
        }
    }

    fn unbind(&mut self) -> Result<()> {
        self.calls.lock().unbinds += 1;
        Ok(())
    }

    fn submit(&mut self, op: Operation) -> Result<()> {
        self.calls.lock().submits.push(op);
        self.submit_results.pop_front().unwrap_or(Ok(()))
    }

    fn compare(&mut self, dn: &str, attribute: &str, value: Bytes) -> Result<bool> {
        self.calls
            .lock()
            .compares
            .push((dn.to_owned(), attribute.to_owned(), value));
        self.compare_results.pop_front().unwrap_or(Ok(true))
    }

    fn submit_search(&mut self, params: &SearchParams) -> Result<MessageId> {
        self.calls.lock().searches.push(params.clone());
        if let Some(e) = &self.search_error {
            return Err(Error::server(e.clone()));
        }
        let id = self.next_id;
        self.next_id += 1;
        let script = self.scripts.pop_front().unwrap_or_default();
        self.active.insert(id, script.into());
        Ok(id)
    }

    fn poll_result(&mut self, id: MessageId, _timeout: Option<Duration>) -> Result<Option<SearchMessage>> {
        self.calls.lock().polls += 1;
        match self.active.get_mut(&id) {
            Some(steps) => steps.pop_front().unwrap_or(Ok(None)),
            None => Err(Error::InvalidMessageId),
        }
    }

    fn finish_search(&mut self, id: MessageId, abandon: bool) {
        self.calls.lock().finished.push((id, abandon));
        self.active.remove(&id);
    }
}

/// Search entry message with string attribute names and raw values
pub(crate) fn entry(dn: &str, attributes: &[(&str, &[&[u8]])]) -> SearchMessage {
    SearchMessage::Entry(RawEntry {
        dn: Bytes::copy_from_slice(dn.as_bytes()),
        attributes: attributes
            .iter()
            .map(|(name, values)| Attribute {
                name: (*name).to_owned(),
                values: values.iter().map(|v| Bytes::copy_from_slice(v)).collect(),
            })
            .collect(),
    })
}

/// Successful final search result
pub(crate) fn done() -> SearchMessage {
    SearchMessage::Done(Ok(()))
}
