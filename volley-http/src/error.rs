use std::io;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse transport failure class, used as the `error_kind` metric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    RequestBuild,
    HeaderName,
    HeaderValue,
    Dns,
    Connect,
    Tls,
    Handshake,
    Request,
    Timeout,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme (expected http or https): {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("dns lookup for {host} failed: {source}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake failed: {0}")]
    Tls(#[source] io::Error),

    #[error("tls configuration failed: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("http/1.1 handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("http request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[source] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpTransportErrorKind::UnsupportedScheme,
            Self::RequestBuild(_) => HttpTransportErrorKind::RequestBuild,
            Self::HeaderName(_) => HttpTransportErrorKind::HeaderName,
            Self::HeaderValue(_) => HttpTransportErrorKind::HeaderValue,
            Self::Dns { .. } => HttpTransportErrorKind::Dns,
            Self::Connect { .. } => HttpTransportErrorKind::Connect,
            Self::Tls(_) | Self::TlsConfig(_) => HttpTransportErrorKind::Tls,
            Self::Handshake(_) => HttpTransportErrorKind::Handshake,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::Timeout(_) => HttpTransportErrorKind::Timeout,
            Self::BodyRead(_) => HttpTransportErrorKind::BodyRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_as_snake_case_tags() {
        let err = Error::Dns {
            host: "nowhere.invalid".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        };
        assert_eq!(err.transport_error_kind().to_string(), "dns");
        assert_eq!(
            Error::Timeout(Duration::from_secs(1))
                .transport_error_kind()
                .to_string(),
            "timeout"
        );
        assert_eq!(HttpTransportErrorKind::BodyRead.to_string(), "body_read");
    }
}
