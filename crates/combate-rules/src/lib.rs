//! The rule engine for Combate.
//!
//! Everything in this crate is a pure function over
//! [`combate_protocol`] data: no I/O, no clocks, no shared state apart
//! from the piece id counter. The dispatcher calls [`apply_move`] with
//! the current snapshot and swaps in the returned one.
//!
//! - [`catalog`] — the one rank table: strength, army counts, mobility
//! - [`board`] — bounds, lakes, home rows
//! - [`resolve_combat`] — who wins when two pieces meet
//! - [`validate_move`] / [`apply_move`] — move legality and the full turn
//! - [`random_deployment`] — the instant setup that skips placement

pub mod board;
pub mod catalog;
mod combat;
mod deploy;
mod error;
mod movement;

pub use combat::{CombatOutcome, resolve_combat};
pub use deploy::{conceal_order, next_piece_id, random_deployment};
pub use error::MoveError;
pub use movement::{apply_move, is_defeated, validate_move};
