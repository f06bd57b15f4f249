//! Keeping a session view in step with the server.
//!
//! [`LiveSession`] owns one view: the live channel while it is healthy, a
//! reconnect schedule when it drops, and snapshot polling once the channel
//! is given up on.

pub mod connection;
pub mod http;
pub mod session;
pub mod transport;
pub mod ws;

pub use connection::{classify_error, ConnectionMode, ConnectionState, Directive, FailureKind};
pub use http::{HttpAuth, HttpGameApi};
pub use session::LiveSession;
pub use transport::{
    ApiFuture, AuthProvider, Channel, ChannelConnector, ChannelEvent, GameApi, Services,
    TokenStore,
};
pub use ws::WsConnector;
