// deckathlon-api: Async transport for the Deckathlon game server's JSON API

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::HttpTransport;
pub use error::Error;
pub use request::{ApiRequest, ApiResponse, Method, Transport};
pub use transport::{TlsMode, TransportConfig};
