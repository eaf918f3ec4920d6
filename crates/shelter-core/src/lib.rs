//! Shelter Core - session driver for the shelter exploration game
//!
//! Wraps the pure rule engines from `shelter-logic` in a stateful
//! [`Session`](session::Session) that owns the world grid, the roster, the
//! quest and chapter books and the round clock.
//!
//! # Example
//!
//! ```rust,no_run
//! use shelter_core::prelude::*;
//!
//! let bundle = load_config_dir("data").expect("config");
//! let mut session = Session::new(bundle, SessionOptions::with_seed(7));
//!
//! session.start_expedition(&["anna".to_string()]);
//! loop {
//!     let report = session.advance_round();
//!     if report.arrived_at.is_some() {
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod persistence;
pub mod session;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::config::{load_config_dir, ConfigError, SessionOptions};
    pub use crate::persistence::{SaveError, SaveSlots};
    pub use crate::session::{
        Battlefield, CombatReport, CombatResolver, Expedition, LootReport, RoundReport, Session,
    };
    pub use shelter_logic::grid::GridPos;
    pub use shelter_logic::inventory::ItemStack;
}
