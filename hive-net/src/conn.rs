//! # Peer Connections
//!
//! Purpose: Reuse blocking TCP connections to one peer to keep handshake
//! latency and allocation churn off the request path.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: A bounded set of idle connections per peer.
//! 2. **Minimal Locking**: The pool mutex is held only to move connections
//!    in and out of the idle queue.
//! 3. **Fail Fast**: A full pool errors immediately instead of queueing.
//! 4. **No Poisoned Reuse**: A connection that saw an I/O or framing error
//!    is dropped, never returned to the pool.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;

use crate::frame::{encode_command, read_frame, Frame, FrameError};

/// Errors surfaced by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Network or I/O failure while reading or writing.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    /// The byte stream violated the wire framing.
    #[error("protocol violation")]
    Protocol,
    /// The response frame did not match the command that was sent.
    #[error("unexpected response frame")]
    UnexpectedFrame,
    /// No idle connection and the total cap is reached.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// The peer address does not parse as a socket address.
    #[error("invalid peer address {0:?}")]
    InvalidAddress(String),
}

impl From<FrameError> for NetError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Protocol => NetError::Protocol,
            FrameError::Io(err) => NetError::Io(err),
        }
    }
}

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum idle connections kept around.
    pub max_idle: usize,
    /// Maximum connections alive at once, idle and leased together.
    pub max_total: usize,
    /// TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Read and write timeout applied to every connection.
    pub io_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            max_idle: 4,
            max_total: 16,
            connect_timeout: Some(Duration::from_secs(2)),
            io_timeout: Some(Duration::from_secs(5)),
        }
    }
}

struct PoolState {
    idle: VecDeque<Conn>,
    total: usize,
}

/// Bounded pool of blocking connections to a single peer address.
pub(crate) struct ConnectionPool {
    addr: String,
    options: PoolOptions,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub(crate) fn new(addr: impl Into<String>, options: PoolOptions) -> Self {
        ConnectionPool {
            addr: addr.into(),
            options,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
            }),
        }
    }

    /// Borrows a connection, reusing an idle one or dialing a new one.
    pub(crate) fn lease(&self) -> Result<Lease<'_>, NetError> {
        if let Some(conn) = self.state.lock().idle.pop_front() {
            return Ok(Lease::new(self, conn));
        }

        {
            let mut state = self.state.lock();
            if state.total >= self.options.max_total {
                return Err(NetError::PoolExhausted);
            }
            state.total += 1;
        }

        match Conn::open(&self.addr, &self.options) {
            Ok(conn) => Ok(Lease::new(self, conn)),
            Err(err) => {
                self.forget_one();
                Err(err)
            }
        }
    }

    fn park(&self, conn: Conn) {
        let mut state = self.state.lock();
        if state.idle.len() < self.options.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }

    fn forget_one(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
    }
}

/// RAII connection borrow; returns the connection to the pool on drop
/// unless it failed.
pub(crate) struct Lease<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Conn>,
    healthy: bool,
}

impl<'a> Lease<'a> {
    fn new(pool: &'a ConnectionPool, conn: Conn) -> Self {
        Lease {
            pool,
            conn: Some(conn),
            healthy: true,
        }
    }

    /// Sends one command and reads its response frame.
    pub(crate) fn exec(&mut self, args: &[&[u8]]) -> Result<Frame, NetError> {
        let conn = self.conn.as_mut().expect("leased connection");
        let result = conn.exec(args);
        if result.is_err() {
            self.healthy = false;
        }
        result
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.healthy {
            self.pool.park(conn);
        } else {
            self.pool.forget_one();
        }
    }
}

/// Single TCP connection with reusable buffers.
struct Conn {
    reader: BufReader<TcpStream>,
    line: Vec<u8>,
    out: Vec<u8>,
}

impl Conn {
    fn open(addr: &str, options: &PoolOptions) -> Result<Self, NetError> {
        let sock: SocketAddr = addr
            .parse()
            .map_err(|_| NetError::InvalidAddress(addr.to_owned()))?;
        let stream = match options.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&sock, timeout)?,
            None => TcpStream::connect(sock)?,
        };
        stream.set_read_timeout(options.io_timeout)?;
        stream.set_write_timeout(options.io_timeout)?;
        // Peer requests are small; Nagle would only add latency.
        stream.set_nodelay(true)?;

        Ok(Conn {
            reader: BufReader::new(stream),
            line: Vec::with_capacity(128),
            out: Vec::with_capacity(256),
        })
    }

    fn exec(&mut self, args: &[&[u8]]) -> Result<Frame, NetError> {
        self.out.clear();
        encode_command(args, &mut self.out);

        let stream = self.reader.get_mut();
        stream.write_all(&self.out)?;
        stream.flush()?;

        Ok(read_frame(&mut self.reader, &mut self.line)?)
    }
}
