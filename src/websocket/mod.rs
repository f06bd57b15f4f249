pub mod handler;

pub use handler::{admit, announce, make_move, ws_index, ChessWebSocket};
