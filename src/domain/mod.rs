pub mod changes;
pub mod game;
pub mod square;
pub mod state;
pub mod user;
pub mod vote;

pub use changes::*;
pub use game::*;
pub use square::*;
pub use state::*;
pub use user::*;
pub use vote::*;
