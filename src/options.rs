//! LDAP session options

use std::time::Duration;

/// Default LDAP port
pub const DEFAULT_PORT: u16 = 389;

/// Capacity limits enforced before any request is submitted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub(crate) max_attributes: usize,
    pub(crate) max_values: usize,
    pub(crate) max_cells: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_attributes: 100,
            max_values: 100,
            max_cells: 200,
        }
    }
}

impl Limits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of attributes per operation, default is 100
    pub fn max_attributes(mut self, max: usize) -> Self {
        self.max_attributes = max;
        self
    }

    /// Maximum number of values across all attributes of one operation, default is 100
    pub fn max_values(mut self, max: usize) -> Self {
        self.max_values = max;
        self
    }

    /// Maximum number of value cells, counting one terminator per attribute, default is 200
    pub fn max_cells(mut self, max: usize) -> Self {
        self.max_cells = max;
        self
    }
}

/// Search options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub(crate) attrs_only: bool,
    pub(crate) size_limit: u32,
    pub(crate) time_limit: Duration,
    pub(crate) timeout: Option<Duration>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return attribute names only, without values
    pub fn attrs_only(mut self, flag: bool) -> Self {
        self.attrs_only = flag;
        self
    }

    /// Server-side size limit, 0 means no limit
    pub fn size_limit(mut self, size_limit: u32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Server-side time limit, zero means no limit
    pub fn time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Client-side timeout when waiting for the next search result.
    /// By default the session blocks until the server responds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Connection options
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub(crate) port: u16,
    pub(crate) connect_timeout: Duration,
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) limits: Limits,
    pub(crate) search: SearchOptions,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            operation_timeout: None,
            limits: Limits::default(),
            search: SearchOptions::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set port number, default is 389
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// TCP connect timeout, default is 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Timeout for synchronous operations (bind, add, delete, modify, compare).
    /// By default there is none.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Default options for searches issued on this connection
    pub fn search_options(mut self, options: SearchOptions) -> Self {
        self.search = options;
        self
    }
}
