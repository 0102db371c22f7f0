//! Connection handle
//!
//! A [`Connection`] owns one bound directory session. The session itself is
//! shared with every [`SearchSession`] opened on it and is unbound only when
//! the last of them lets go, so closing a connection with searches still in
//! flight is safe.
//!
//! A connection expects one logical caller at a time. Calls are serialized on
//! the shared session, but interleaving operations from several threads gives
//! no ordering guarantees beyond that.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    attrs::{build_attribute_names, build_attributes, build_modify_batch},
    client::LdapClient,
    directory::Directory,
    error::{Error, Result},
    model::{ModOp, Operation, Scope, SearchParams},
    options::{ConnectionOptions, Limits, SearchOptions},
    search::SearchSession,
    value::{Table, Value},
};

/// LDAP protocol version negotiated on every connection
pub const PROTOCOL_VERSION: u32 = 3;

/// Native session shared between a connection and its searches
pub(crate) struct SharedSession {
    pub(crate) directory: Box<dyn Directory>,
}

impl Drop for SharedSession {
    fn drop(&mut self) {
        debug!("Releasing directory session");
        if let Err(e) = self.directory.unbind() {
            warn!("Unbind failed: {}", e);
        }
    }
}

pub(crate) type SessionRef = Arc<Mutex<SharedSession>>;

fn split_address(address: &str) -> (String, Option<u16>) {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_owned(), Some(port)),
            Err(_) => (address.to_owned(), None),
        },
        _ => (address.to_owned(), None),
    }
}

/// Connection builder
pub struct ConnectionBuilder {
    host: String,
    port: Option<u16>,
    options: ConnectionOptions,
}

impl ConnectionBuilder {
    /// Set port number, overriding the port given in the address and the options
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set connection options
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect and perform a simple bind. `None` credentials bind anonymously.
    pub fn open(self, who: Option<&str>, password: Option<&str>) -> Result<Connection> {
        let mut options = self.options;
        if let Some(port) = self.port {
            options.port = port;
        }
        let client = LdapClient::connect(&self.host, &options)?;
        Connection::bind(client, who, password, options)
    }
}

/// Bound LDAP connection
pub struct Connection {
    session: Option<SessionRef>,
    options: ConnectionOptions,
}

impl Connection {
    /// Create connection builder. The address may carry a port: `host:port`.
    pub fn builder<A: AsRef<str>>(address: A) -> ConnectionBuilder {
        let (host, port) = split_address(address.as_ref());
        ConnectionBuilder {
            host,
            port,
            options: ConnectionOptions::default(),
        }
    }

    /// Connect to `address` with default options and perform a simple bind
    pub fn open<A: AsRef<str>>(address: A, who: Option<&str>, password: Option<&str>) -> Result<Self> {
        Self::builder(address).open(who, password)
    }

    /// Bind an established directory session
    pub fn bind<D>(directory: D, who: Option<&str>, password: Option<&str>, options: ConnectionOptions) -> Result<Self>
    where
        D: Directory + 'static,
    {
        let connection = Self::new(directory, options);
        debug!("Binding as {}", who.unwrap_or("<anonymous>"));
        connection
            .session()?
            .lock()
            .directory
            .bind_simple(who, password)
            .map_err(|e| match e {
                Error::ServerError { error, .. } => Error::BindFailed(error),
                other => other,
            })?;
        Ok(connection)
    }

    /// Wrap an already bound directory session
    pub fn new<D>(directory: D, options: ConnectionOptions) -> Self
    where
        D: Directory + 'static,
    {
        Self {
            session: Some(Arc::new(Mutex::new(SharedSession {
                directory: Box::new(directory),
            }))),
            options,
        }
    }

    fn session(&self) -> Result<&SessionRef> {
        self.session.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Close the connection. Returns `false` if it was already closed.
    ///
    /// The directory session is unbound once no open search refers to it.
    pub fn close(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                debug!("Closing connection, {} search(es) still open", Arc::strong_count(&session) - 1);
                drop(session);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    pub fn protocol_version(&self) -> u32 {
        PROTOCOL_VERSION
    }

    pub fn limits(&self) -> &Limits {
        &self.options.limits
    }

    /// Add an entry. Every named field of `attributes` becomes one attribute.
    pub fn add(&self, dn: &str, attributes: &Table) -> Result<()> {
        let session = self.session()?;
        let attributes = build_attributes(attributes, ModOp::Add, &self.options.limits)?;
        debug!("Adding {} with {} attribute(s)", dn, attributes.len());
        session.lock().directory.submit(Operation::Add {
            dn: dn.to_owned(),
            attributes,
        })
    }

    /// Delete an entry
    pub fn delete(&self, dn: &str) -> Result<()> {
        let session = self.session()?;
        debug!("Deleting {}", dn);
        session.lock().directory.submit(Operation::Delete { dn: dn.to_owned() })
    }

    /// Apply modify batches in order, one request per batch.
    ///
    /// Each batch holds its marker (`+`, `-` or `=`) in the first positional slot and
    /// attributes as named fields. Processing stops at the first failing batch; batches
    /// already applied stay applied. Errors carry the 1-based batch index.
    pub fn modify<'t, I>(&self, dn: &str, batches: I) -> Result<()>
    where
        I: IntoIterator<Item = &'t Table>,
    {
        let session = self.session()?;
        for (i, batch) in batches.into_iter().enumerate() {
            let index = i + 1;
            let changes = build_modify_batch(batch, &self.options.limits).map_err(|e| e.with_batch(index))?;
            debug!("Modifying {}: batch {} with {} change(s)", dn, index, changes.len());
            session
                .lock()
                .directory
                .submit(Operation::Modify {
                    dn: dn.to_owned(),
                    changes,
                })
                .map_err(|e| e.with_batch(index))?;
        }
        Ok(())
    }

    /// Compare an attribute value. Returns whether the entry holds it.
    pub fn compare<V: Into<Value>>(&self, dn: &str, attribute: &str, value: V) -> Result<bool> {
        let session = self.session()?;
        let value = value.into();
        let value = value.as_bytes().ok_or_else(|| Error::InvalidValueType {
            attribute: Some(attribute.to_owned()),
            position: None,
            found: value.type_name(),
        })?;
        debug!("Comparing {} of {}", attribute, dn);
        session.lock().directory.compare(dn, attribute, value)
    }

    /// Start a search with the connection's default search options.
    ///
    /// `scope` is matched on its first character (`b`, `o`, `s`), anything else selects
    /// subtree. `attributes` lists the requested attribute names, `None` requests all.
    pub fn search(&self, base: &str, scope: &str, filter: &str, attributes: Option<&Table>) -> Result<SearchSession> {
        let options = self.options.search.clone();
        self.search_with(base, Scope::parse(scope), filter, attributes, &options)
    }

    /// Start a search with explicit options
    pub fn search_with(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: Option<&Table>,
        options: &SearchOptions,
    ) -> Result<SearchSession> {
        let session = self.session()?;
        let attributes = attributes
            .map(|names| build_attribute_names(names, &self.options.limits))
            .transpose()?;

        let params = SearchParams {
            base: base.to_owned(),
            scope,
            filter: filter.to_owned(),
            attributes,
            attrs_only: options.attrs_only,
            size_limit: options.size_limit,
            time_limit: u32::try_from(options.time_limit.as_secs()).unwrap_or(u32::MAX),
        };

        let id = session.lock().directory.submit_search(&params)?;
        debug!("Search {} started: base {}, scope {:?}, filter {}", id, base, scope, filter);

        Ok(SearchSession::new(session.clone(), id, options.timeout))
    }
}
