//! Redis-backed credential store
//!
//! A small pooled RESP client. Only `AUTH` and `GET` are issued.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::StoreError;

use super::config::RedisConfig;
use super::resp::{self, RespValue};
use super::CredentialStore;

/// A single RESP connection over any async byte stream
pub struct RedisConnection<T> {
    stream: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<T> RedisConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(256),
        }
    }

    /// Send a command and wait for its reply
    ///
    /// Error replies are returned as [`StoreError::Server`].
    pub async fn command(&mut self, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        self.write_buf.clear();
        resp::encode_command(&mut self.write_buf, args);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        loop {
            if let Some(value) = resp::decode(&mut self.read_buf)? {
                return match value {
                    RespValue::Error(msg) => Err(StoreError::Server(msg)),
                    value => Ok(value),
                };
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    /// Authenticate the connection
    pub async fn auth(&mut self, password: &str) -> Result<(), StoreError> {
        self.command(&[b"AUTH", password.as_bytes()]).await.map(|_| ())
    }

    /// Fetch a string value; `None` if the key does not exist
    pub async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.command(&[b"GET", key.as_bytes()]).await? {
            RespValue::BulkString(None) => Ok(None),
            RespValue::BulkString(Some(data)) => String::from_utf8(data.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Protocol("value is not valid UTF-8".into())),
            RespValue::SimpleString(s) => Ok(Some(s)),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to GET: {:?}",
                other
            ))),
        }
    }
}

struct IdleConnection {
    conn: RedisConnection<TcpStream>,
    returned_at: Instant,
}

struct PoolInner {
    config: RedisConfig,
    idle: Mutex<Vec<IdleConnection>>,
    active: Arc<Semaphore>,
}

impl PoolInner {
    fn take_idle(&self) -> Option<RedisConnection<TcpStream>> {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let timeout = self.config.idle_timeout;
        idle.retain(|c| c.returned_at.elapsed() < timeout);
        idle.pop().map(|c| c.conn)
    }

    fn put_idle(&self, conn: RedisConnection<TcpStream>) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.config.max_idle && !self.active.is_closed() {
            idle.push(IdleConnection {
                conn,
                returned_at: Instant::now(),
            });
        }
    }

    async fn dial(&self) -> Result<RedisConnection<TcpStream>, StoreError> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(|e| {
            tracing::warn!(addr = %self.config.addr, error = %e, "Credential store connect failed");
            StoreError::Io(e)
        })?;
        stream.set_nodelay(true)?;

        let mut conn = RedisConnection::new(stream);
        if let Some(ref password) = self.config.password {
            if let Err(e) = conn.auth(password).await {
                tracing::warn!(addr = %self.config.addr, error = %e, "Credential store AUTH failed");
                return Err(e);
            }
        }

        tracing::debug!(addr = %self.config.addr, "Credential store connection opened");
        Ok(conn)
    }
}

/// Connection checked out of the pool
///
/// Returned to the idle list on drop unless it was marked broken.
struct PooledConnection {
    conn: Option<RedisConnection<TcpStream>>,
    pool: Arc<PoolInner>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.broken {
                self.pool.put_idle(conn);
            }
        }
    }
}

/// Credential store backed by a Redis server
#[derive(Clone)]
pub struct RedisCredentialStore {
    inner: Arc<PoolInner>,
}

impl RedisCredentialStore {
    /// Create a store; connections are opened lazily
    pub fn new(config: RedisConfig) -> Self {
        let max_active = config.max_active.max(1);

        Self {
            inner: Arc::new(PoolInner {
                config,
                idle: Mutex::new(Vec::new()),
                active: Arc::new(Semaphore::new(max_active)),
            }),
        }
    }

    /// Create a store from `REDIS_HOST` / `REDIS_PASSWORD`
    pub fn from_env() -> Self {
        Self::new(RedisConfig::from_env())
    }

    /// Get the pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }

    /// Number of idle pooled connections
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .map(|idle| idle.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    /// Close the pool; pending and future lookups fail with `PoolClosed`
    pub fn close(&self) {
        self.inner.active.close();
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    async fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let permit = Arc::clone(&self.inner.active)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)?;

        let conn = match self.inner.take_idle() {
            Some(conn) => conn,
            None => self.inner.dial().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            broken: false,
            _permit: permit,
        })
    }
}

impl CredentialStore for RedisCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut pooled = self.acquire().await?;
        let Some(conn) = pooled.conn.as_mut() else {
            return Err(StoreError::PoolClosed);
        };

        let result = conn.get(key).await;
        if let Err(ref e) = result {
            // Server error replies leave the connection usable
            pooled.broken = !matches!(e, StoreError::Server(_));
        }
        result
    }
}
