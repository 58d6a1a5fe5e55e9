use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::io::{Io, TimedIo};
use crate::pool::{Origin, PooledConn};
use crate::timings::IoMarks;
use crate::{Error, Result};

/// A freshly opened connection plus the time each setup phase took.
#[derive(Debug)]
pub(crate) struct Dialed {
    pub(crate) conn: PooledConn,
    pub(crate) dns: Duration,
    pub(crate) connect: Duration,
    pub(crate) tls: Duration,
}

impl Dialed {
    pub(crate) fn setup_time(&self) -> Duration {
        self.dns + self.connect + self.tls
    }
}

#[derive(Clone)]
pub(crate) struct Dialer {
    connect_timeout: Option<Duration>,
    tls: TlsConnector,
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Dialer {
    pub(crate) fn new(connect_timeout: Option<Duration>, tls: Arc<ClientConfig>) -> Self {
        Self {
            connect_timeout,
            tls: TlsConnector::from(tls),
        }
    }

    pub(crate) async fn dial(&self, origin: &Origin) -> Result<Dialed> {
        let started = Instant::now();
        let addrs = resolve(origin).await?;
        let dns = started.elapsed();

        let started = Instant::now();
        let tcp = self.connect_any(&addrs).await?;
        let connect = started.elapsed();
        // Latency matters more than batching for small request/response exchanges.
        let _ = tcp.set_nodelay(true);

        let started = Instant::now();
        let stream: Box<dyn Io> = if origin.tls {
            let name = ServerName::try_from(origin.host.clone())
                .map_err(|_| Error::InvalidUrl(origin.host.clone()))?;
            Box::new(self.tls.connect(name, tcp).await.map_err(Error::Tls)?)
        } else {
            Box::new(tcp)
        };
        let tls = if origin.tls {
            started.elapsed()
        } else {
            Duration::ZERO
        };

        let marks = IoMarks::new();
        let io = TokioIo::new(TimedIo::new(stream, marks.clone()));
        let (sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(Error::Handshake)?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(error = %err, "http connection closed with error");
            }
        });

        Ok(Dialed {
            conn: PooledConn { sender, marks },
            dns,
            connect,
            tls,
        })
    }

    async fn connect_any(&self, addrs: &[SocketAddr]) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in addrs {
            let attempt = TcpStream::connect(addr);
            let res = match self.connect_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(res) => res,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect timed out after {limit:?}"),
                    )),
                },
                None => attempt.await,
            };
            match res {
                Ok(stream) => return Ok(stream),
                Err(source) => {
                    tracing::debug!(%addr, error = %source, "connect attempt failed");
                    last_err = Some(Error::Connect {
                        addr: addr.to_string(),
                        source,
                    });
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Connect {
            addr: String::new(),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to connect"),
        }))
    }
}

async fn resolve(origin: &Origin) -> Result<Vec<SocketAddr>> {
    let dns_err = |source| Error::Dns {
        host: origin.host.clone(),
        source,
    };
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((origin.host.as_str(), origin.port))
        .await
        .map_err(dns_err)?
        .collect();
    if addrs.is_empty() {
        return Err(dns_err(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses resolved",
        )));
    }
    Ok(addrs)
}
