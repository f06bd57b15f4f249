pub mod app_state;
pub mod game_state;
pub mod invite;
pub mod messages;
pub mod rewards;
pub mod session;

// Re-export important types
pub use app_state::AppState;
pub use game_state::GameState;
pub use invite::*;
pub use messages::*;
pub use session::*;
