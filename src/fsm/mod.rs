pub mod game;
pub mod seat_table;

pub use game::{FsmState, GameFsm};
pub use seat_table::SeatTable;
