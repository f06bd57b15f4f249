//! Chess game sessions: the rules adapter, bot opponents, live and polled
//! synchronisation with the game service, matchmaking and replay, plus the
//! reference session server those clients talk to.

pub mod bot;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod lobby;
pub mod models;
pub mod replay;
pub mod routes;
pub mod sync;
pub mod websocket;
