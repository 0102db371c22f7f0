//! Low-level LDAP channel operations

use std::{io, time::Duration};

use futures::{
    channel::mpsc::{self, Receiver, Sender},
    future,
    sink::SinkExt,
    StreamExt, TryStreamExt,
};
use log::debug;
use rasn_ldap::LdapMessage;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{lookup_host, TcpStream},
};

use crate::{codec::LdapCodec, error::Error};

const CHANNEL_SIZE: usize = 1024;

pub type LdapMessageSender = Sender<LdapMessage>;
pub type LdapMessageReceiver = Receiver<LdapMessage>;

fn io_error<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// LDAP channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("Connect timeout expired")]
    ConnectTimeout(#[from] tokio::time::error::Elapsed),
    #[error("Cannot resolve address {0}")]
    Resolve(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// LDAP TCP channel connector
pub struct LdapChannel {
    address: String,
    port: u16,
}

impl LdapChannel {
    /// Create a client-side channel with a given server address and port
    pub fn for_client<S>(address: S, port: u16) -> Self
    where
        S: AsRef<str>,
    {
        LdapChannel {
            address: address.as_ref().to_owned(),
            port,
        }
    }

    /// Connect to a server.
    /// Returns a pair of (sender, receiver) endpoints
    pub async fn connect(self, timeout: Duration) -> ChannelResult<(LdapMessageSender, LdapMessageReceiver)> {
        let address = lookup_host((self.address.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| ChannelError::Resolve(self.address.clone()))?;

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address)).await??;
        stream.set_nodelay(true)?;

        debug!("Connection established to {}", address);

        Ok(make_channel(stream))
    }
}

fn make_channel<S>(stream: S) -> (LdapMessageSender, LdapMessageReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let framed = tokio_util::codec::Framed::new(stream, LdapCodec);

    // socket -> tx_in -> rx_in (returned to the dispatcher)
    let (tx_in, rx_in) = mpsc::channel(CHANNEL_SIZE);

    // returned tx_out -> rx_out -> socket
    let (tx_out, rx_out) = mpsc::channel(CHANNEL_SIZE);

    let channel = async move {
        let (mut sink, stream) = framed.split();

        let mut rx = rx_out.map(Ok::<_, Error>);
        let to_wire = sink.send_all(&mut rx);

        let mut tx = tx_in.sink_map_err(io_error);
        let from_wire = stream.map_err(io_error).forward(&mut tx);

        // either side finishing tears down the other
        let _ = future::select(to_wire, from_wire).await;
        debug!("Channel closed");
    };

    tokio::spawn(channel);

    (tx_out, rx_in)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rasn_ldap::{ProtocolOp, UnbindRequest};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use super::*;

    fn new_msg() -> LdapMessage {
        LdapMessage::new(1, ProtocolOp::UnbindRequest(UnbindRequest))
    }

    async fn start_echo_server(num_msgs: usize) -> SocketAddr {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = tcp.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = tcp.accept().await {
                let framed = Framed::new(stream, LdapCodec);
                let (mut sink, stream) = framed.split();
                sink.send_all(&mut stream.take(num_msgs)).await.unwrap();
            }
        });

        address
    }

    #[tokio::test]
    async fn test_connection_success() {
        let address = start_echo_server(2).await;

        let (mut sender, mut receiver) = LdapChannel::for_client(address.ip().to_string(), address.port())
            .connect(Duration::from_secs(5))
            .await
            .unwrap();
        let msg = new_msg();

        sender.send(msg.clone()).await.unwrap();
        sender.send(msg.clone()).await.unwrap();

        let mut received = 0;
        while let Some(m) = receiver.next().await {
            assert_eq!(msg, m);
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_connection_fail() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = tcp.local_addr().unwrap().port();
        drop(tcp);

        let res = LdapChannel::for_client("127.0.0.1", port)
            .connect(Duration::from_secs(5))
            .await;

        assert!(res.is_err());
    }
}
