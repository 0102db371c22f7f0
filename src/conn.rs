use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, Stream, StreamExt};
use log::{debug, trace};
use parking_lot::RwLock;
use rasn_ldap::{LdapMessage, ProtocolOp};

use crate::{
    channel::{LdapChannel, LdapMessageSender},
    error::Error,
    model::MessageId,
};

const NOTICE_OF_DISCONNECTION_OID: &[u8] = b"1.3.6.1.4.1.1466.20036";

// `None` once the dispatcher has exited
type ClientMap = Arc<RwLock<Option<HashMap<MessageId, UnboundedSender<LdapMessage>>>>>;

fn connection_closed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "Connection closed")
}

/// Message dispatcher: routes incoming messages to per-request streams by message id
#[derive(Clone)]
pub(crate) struct LdapConnection {
    clients: ClientMap,
    channel_sender: LdapMessageSender,
}

impl LdapConnection {
    pub(crate) async fn connect<A>(address: A, port: u16, timeout: Duration) -> Result<Self, Error>
    where
        A: AsRef<str>,
    {
        let (channel_sender, mut channel_receiver) = LdapChannel::for_client(address, port).connect(timeout).await?;
        let connection = Self {
            clients: Arc::new(RwLock::new(Some(HashMap::new()))),
            channel_sender,
        };

        let clients = connection.clients.clone();

        tokio::spawn(async move {
            while let Some(msg) = channel_receiver.next().await {
                match msg.protocol_op {
                    ProtocolOp::ExtendedResp(ref resp)
                        if msg.message_id == 0
                            && resp.response_name.as_deref() == Some(NOTICE_OF_DISCONNECTION_OID) =>
                    {
                        debug!("Notice of disconnection received, exiting");
                        break;
                    }
                    _ => {
                        let sender = clients.read().as_ref().and_then(|map| map.get(&msg.message_id).cloned());
                        match sender {
                            // receiver gone means the request was already finished
                            Some(sender) => {
                                let _ = sender.unbounded_send(msg);
                            }
                            None => trace!("Dropping message for unknown id {}", msg.message_id),
                        }
                    }
                }
            }
            // ends every outstanding stream and refuses new ones
            clients.write().take();
            debug!("Dispatcher finished");
        });

        Ok(connection)
    }

    /// Send a request and return the stream of its responses
    pub(crate) async fn send_recv_stream(&mut self, msg: LdapMessage) -> Result<MessageStream, Error> {
        let id = msg.message_id;

        // register first so that an early response is not lost
        let (tx, rx) = mpsc::unbounded();
        match self.clients.write().as_mut() {
            Some(map) => map.insert(id, tx),
            None => return Err(connection_closed().into()),
        };
        let stream = MessageStream {
            id,
            clients: self.clients.clone(),
            receiver: rx,
        };

        self.channel_sender.send(msg).await?;
        Ok(stream)
    }

    /// Send a request without waiting for any response
    pub(crate) async fn send(&mut self, msg: LdapMessage) -> Result<(), Error> {
        Ok(self.channel_sender.send(msg).await?)
    }

    /// Send a final request and shut the channel down once it is written
    pub(crate) async fn send_last(&mut self, msg: LdapMessage) -> Result<(), Error> {
        let mut stream = self.send_recv_stream(msg).await?;
        self.channel_sender.close_channel();

        // the stream ends when the dispatcher exits
        while stream.next().await.is_some() {}
        Ok(())
    }

    /// Send a request and wait for its single response
    pub(crate) async fn send_recv(&mut self, msg: LdapMessage) -> Result<LdapMessage, Error> {
        Ok(self
            .send_recv_stream(msg)
            .await?
            .next()
            .await
            .ok_or_else(connection_closed)?)
    }
}

/// Responses to one request
pub(crate) struct MessageStream {
    id: MessageId,
    clients: ClientMap,
    receiver: UnboundedReceiver<LdapMessage>,
}

impl Stream for MessageStream {
    type Item = LdapMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(map) = self.clients.write().as_mut() {
            map.remove(&self.id);
        }
    }
}

/// Unsolicited notice of disconnection as sent by a server that is going away
#[cfg(test)]
pub(crate) fn notice_of_disconnection() -> LdapMessage {
    LdapMessage::new(
        0,
        ProtocolOp::ExtendedResp(rasn_ldap::ExtendedResponse {
            result_code: rasn_ldap::ResultCode::Unavailable,
            matched_dn: Default::default(),
            diagnostic_message: "Server shutting down".into(),
            referral: None,
            response_name: Some(bytes::Bytes::from_static(NOTICE_OF_DISCONNECTION_OID)),
            response_value: None,
        }),
    )
}
