//! Pure simulation logic for the shelter exploration game.
//!
//! This crate contains the rule engines that are independent of any UI,
//! storage, or runtime. Functions take plain data and return results, making
//! them unit-testable and usable from the session driver, the headless
//! harness, and any future front-end.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`board`] | 6x4 exploration layer generation from weighted spawn tables |
//! | [`chapter`] | Chapter unlock state machine and map sequencing |
//! | [`constants`] | Board geometry, round/day lengths, defaults |
//! | [`grid`] | World grid cells, walkability, BFS pathfinding |
//! | [`inventory`] | Item stacks, capacity-bounded distribution, death drops |
//! | [`loot`] | Advanced-output condition registry and loot resolution |
//! | [`parse`] | `id_qty` stack lists, `key=value` params, pipe lists |
//! | [`party`] | Explorers, monsters, roster and equipment registry |
//! | [`quest`] | Quest trigger/completion state machine |
//! | [`round`] | Round clock, day calculation, death-drop expiry |
//! | [`tables`] | Static configuration table rows and the config bundle |

pub mod board;
pub mod chapter;
pub mod constants;
pub mod grid;
pub mod inventory;
pub mod loot;
pub mod parse;
pub mod party;
pub mod quest;
pub mod round;
pub mod tables;
