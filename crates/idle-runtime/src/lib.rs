#![deny(warnings)]

//! Concurrent production and upgrade engine for the idle foundry game.
//!
//! Every player owns three factories (iron, copper, gold). Each factory runs a
//! tokio task crediting its wallet on a fixed interval, and can be upgraded
//! one level at a time for a price paid from all three wallets. Payment is
//! taken eagerly and refunded if the factory cannot start the upgrade; the
//! check, payment and state transition form a single turn per player.
//!
//! All background tasks belong to a [`Player`] and stop when it is shut down
//! or dropped.

mod error;
mod factory;
mod game;
mod lifecycle;
mod player;
mod snapshot;
mod wallet;

pub use error::EngineError;
pub use factory::{Factory, FactoryStatus, UpgradeWindow};
pub use game::Game;
pub use player::Player;
pub use snapshot::{FactorySnapshot, PlayerSnapshot, PossessionSnapshot, UpgradeSnapshot};
pub use wallet::{Reservation, Wallet, Wallets};
