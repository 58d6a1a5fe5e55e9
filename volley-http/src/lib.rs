#![forbid(unsafe_code)]

mod client;
mod connect;
mod error;
mod io;
mod pool;
mod timings;
mod tls;
mod types;
mod util;

pub use client::{ClientOptions, HttpClient};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use timings::Timings;
pub use types::{HttpRequest, HttpResponse};
