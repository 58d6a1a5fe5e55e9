use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::SendRequest;
use parking_lot::Mutex;

use crate::timings::IoMarks;
use crate::{Error, Result};

/// Connection key: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Origin {
    pub(crate) tls: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Origin {
    pub(crate) fn from_url(url: &url::Url) -> Result<Self> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(Error::UnsupportedScheme(url.to_string())),
        };
        let host = match url.host() {
            Some(url::Host::Domain(d)) => d.to_string(),
            Some(url::Host::Ipv4(ip)) => ip.to_string(),
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Error::InvalidUrl(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        Ok(Self { tls, host, port })
    }
}

#[derive(Debug)]
pub(crate) struct PooledConn {
    pub(crate) sender: SendRequest<Full<Bytes>>,
    pub(crate) marks: Arc<IoMarks>,
}

/// Idle keep-alive connections, at most `max_idle_per_host` per origin.
#[derive(Debug)]
pub(crate) struct Pool {
    idle: Mutex<HashMap<Origin, Vec<PooledConn>>>,
    max_idle_per_host: usize,
}

impl Pool {
    pub(crate) fn new(max_idle_per_host: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle_per_host,
        }
    }

    pub(crate) fn checkout(&self, origin: &Origin) -> Option<PooledConn> {
        let mut idle = self.idle.lock();
        let conns = idle.get_mut(origin)?;
        while let Some(conn) = conns.pop() {
            if !conn.sender.is_closed() {
                return Some(conn);
            }
        }
        None
    }

    pub(crate) fn checkin(&self, origin: Origin, conn: PooledConn) {
        if conn.sender.is_closed() || self.max_idle_per_host == 0 {
            return;
        }
        let mut idle = self.idle.lock();
        let conns = idle.entry(origin).or_default();
        if conns.len() < self.max_idle_per_host {
            conns.push(conn);
        }
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> Result<Origin> {
        let url = url::Url::parse(s).map_err(|_| Error::InvalidUrl(s.to_string()))?;
        Origin::from_url(&url)
    }

    #[test]
    fn origin_uses_known_default_ports() {
        let o = origin("https://api.example.com/v1").unwrap_or_else(|e| panic!("{e}"));
        assert!(o.tls);
        assert_eq!(o.port, 443);

        let o = origin("http://[::1]:8080/").unwrap_or_else(|e| panic!("{e}"));
        assert!(!o.tls);
        assert_eq!(o.host, "::1");
        assert_eq!(o.port, 8080);
    }

    #[test]
    fn origin_rejects_other_schemes() {
        let err = origin("ftp://example.com/").err();
        assert!(matches!(err, Some(Error::UnsupportedScheme(_))));
    }

    #[test]
    fn empty_pool_has_nothing_to_check_out() {
        let pool = Pool::new(4);
        let o = origin("http://127.0.0.1:1/").unwrap_or_else(|e| panic!("{e}"));
        assert!(pool.checkout(&o).is_none());
        assert_eq!(pool.idle_count(), 0);
    }
}
