//! LDAP network client
//!
//! [`LdapClient`] implements [`Directory`] on top of an asynchronous TCP
//! channel. It owns a small tokio runtime and blocks on it, so callers see
//! plain synchronous calls.

use std::{collections::HashMap, future::Future, time::Duration};

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, warn};
use rasn_ldap::{
    AbandonRequest, AuthenticationChoice, BindRequest, LdapMessage, LdapResult, ProtocolOp, ResultCode, UnbindRequest,
};
use tokio::runtime::{self, Runtime};

use crate::{
    conn::{LdapConnection, MessageStream},
    connection::PROTOCOL_VERSION,
    directory::Directory,
    error::{Error, Result},
    model::{MessageId, Operation, RawEntry, SearchMessage, SearchParams},
    options::ConnectionOptions,
    request::{compare_request, search_request},
};

fn check_result(result: LdapResult) -> Result<()> {
    if result.result_code == ResultCode::Success {
        Ok(())
    } else {
        Err(Error::server(result.into()))
    }
}

fn op_name(op: &ProtocolOp) -> &'static str {
    match op {
        ProtocolOp::BindRequest(_) => "BindRequest",
        ProtocolOp::BindResponse(_) => "BindResponse",
        ProtocolOp::UnbindRequest(_) => "UnbindRequest",
        ProtocolOp::SearchRequest(_) => "SearchRequest",
        ProtocolOp::SearchResEntry(_) => "SearchResEntry",
        ProtocolOp::SearchResRef(_) => "SearchResRef",
        ProtocolOp::SearchResDone(_) => "SearchResDone",
        ProtocolOp::ModifyRequest(_) => "ModifyRequest",
        ProtocolOp::ModifyResponse(_) => "ModifyResponse",
        ProtocolOp::AddRequest(_) => "AddRequest",
        ProtocolOp::AddResponse(_) => "AddResponse",
        ProtocolOp::DelRequest(_) => "DelRequest",
        ProtocolOp::DelResponse(_) => "DelResponse",
        ProtocolOp::CompareRequest(_) => "CompareRequest",
        ProtocolOp::CompareResponse(_) => "CompareResponse",
        ProtocolOp::AbandonRequest(_) => "AbandonRequest",
        ProtocolOp::ExtendedReq(_) => "ExtendedRequest",
        ProtocolOp::ExtendedResp(_) => "ExtendedResponse",
        _ => "other protocol operation",
    }
}

impl From<LdapMessage> for SearchMessage {
    fn from(msg: LdapMessage) -> Self {
        match msg.protocol_op {
            ProtocolOp::SearchResEntry(entry) => SearchMessage::Entry(RawEntry::from(entry)),
            ProtocolOp::SearchResRef(refs) => SearchMessage::Reference(
                refs.0
                    .into_iter()
                    .map(|uri| String::from_utf8_lossy(&uri).into_owned())
                    .collect(),
            ),
            ProtocolOp::SearchResDone(done) => SearchMessage::Done(if done.0.result_code == ResultCode::Success {
                Ok(())
            } else {
                Err(done.0.into())
            }),
            other => SearchMessage::Unexpected(op_name(&other).to_owned()),
        }
    }
}

/// Blocking LDAP client over TCP
pub struct LdapClient {
    runtime: Runtime,
    connection: LdapConnection,
    id_counter: MessageId,
    operation_timeout: Option<Duration>,
    searches: HashMap<MessageId, MessageStream>,
}

impl LdapClient {
    /// Connect to a server. No bind is performed.
    pub fn connect(host: &str, options: &ConnectionOptions) -> Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ldap-session")
            .enable_all()
            .build()?;

        debug!("Connecting to {}:{}", host, options.port);
        let connection = runtime.block_on(LdapConnection::connect(host, options.port, options.connect_timeout))?;

        Ok(Self {
            runtime,
            connection,
            id_counter: 1,
            operation_timeout: options.operation_timeout,
            searches: HashMap::new(),
        })
    }

    fn new_id(&mut self) -> MessageId {
        let id = self.id_counter;
        // message id 0 is reserved for unsolicited notifications
        self.id_counter = self.id_counter.checked_add(1).filter(|&id| id <= i32::MAX as u32).unwrap_or(1);
        id
    }

    fn block_on<F, T>(&self, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.runtime.block_on(async move {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| Error::ResultTimeout)?,
                None => fut.await,
            }
        })
    }

    fn send_recv(&mut self, op: ProtocolOp) -> Result<ProtocolOp> {
        let msg = LdapMessage::new(self.new_id(), op);
        let mut connection = self.connection.clone();
        let resp = self.block_on(self.operation_timeout, async move { connection.send_recv(msg).await })?;
        Ok(resp.protocol_op)
    }
}

impl Directory for LdapClient {
    fn bind_simple(&mut self, who: Option<&str>, password: Option<&str>) -> Result<()> {
        let auth_choice = AuthenticationChoice::Simple(password.unwrap_or_default().to_owned().into());
        let req = BindRequest::new(PROTOCOL_VERSION as _, who.unwrap_or_default().to_owned().into(), auth_choice);

        match self.send_recv(ProtocolOp::BindRequest(req))? {
            ProtocolOp::BindResponse(resp) => {
                if resp.result_code == ResultCode::Success {
                    Ok(())
                } else {
                    Err(Error::server(resp.into()))
                }
            }
            _ => Err(Error::InvalidResponse),
        }
    }

    fn unbind(&mut self) -> Result<()> {
        self.searches.clear();
        let msg = LdapMessage::new(self.new_id(), ProtocolOp::UnbindRequest(UnbindRequest));
        let mut connection = self.connection.clone();
        self.block_on(self.operation_timeout, async move { connection.send_last(msg).await })
    }

    fn submit(&mut self, op: Operation) -> Result<()> {
        match self.send_recv(op.into())? {
            ProtocolOp::AddResponse(resp) => check_result(resp.0),
            ProtocolOp::DelResponse(resp) => check_result(resp.0),
            ProtocolOp::ModifyResponse(resp) => check_result(resp.0),
            _ => Err(Error::InvalidResponse),
        }
    }

    fn compare(&mut self, dn: &str, attribute: &str, value: Bytes) -> Result<bool> {
        match self.send_recv(compare_request(dn, attribute, value))? {
            ProtocolOp::CompareResponse(resp) => match resp.0.result_code {
                ResultCode::CompareTrue => Ok(true),
                ResultCode::CompareFalse => Ok(false),
                _ => Err(Error::server(resp.0.into())),
            },
            _ => Err(Error::InvalidResponse),
        }
    }

    fn submit_search(&mut self, params: &SearchParams) -> Result<MessageId> {
        let op = search_request(params)?;
        let id = self.new_id();
        let msg = LdapMessage::new(id, op);

        let mut connection = self.connection.clone();
        let stream = self.block_on(self.operation_timeout, async move { connection.send_recv_stream(msg).await })?;
        self.searches.insert(id, stream);

        Ok(id)
    }

    fn poll_result(&mut self, id: MessageId, timeout: Option<Duration>) -> Result<Option<SearchMessage>> {
        let Self { runtime, searches, .. } = self;
        let stream = searches.get_mut(&id).ok_or(Error::InvalidMessageId)?;

        let next = runtime.block_on(async {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, stream.next()).await.ok(),
                None => Some(stream.next().await),
            }
        });

        match next {
            None => Ok(None),
            Some(None) => Err(Error::ResultError("Connection closed".to_owned())),
            Some(Some(msg)) => Ok(Some(msg.into())),
        }
    }

    fn finish_search(&mut self, id: MessageId, abandon: bool) {
        // dropping the stream unregisters the message id
        self.searches.remove(&id);

        if abandon {
            debug!("Abandoning search {}", id);
            let msg = LdapMessage::new(self.new_id(), ProtocolOp::AbandonRequest(AbandonRequest(id)));
            let mut connection = self.connection.clone();
            if let Err(e) = self.block_on(self.operation_timeout, async move { connection.send(msg).await }) {
                warn!("Abandon of search {} failed: {}", id, e);
            }
        }
    }
}
