//! Game constants: board geometry, clock lengths, table defaults.
//!
//! Plain constants with no runtime dependency. The session driver, the
//! harness and the engines all read these.

/// Exploration board width (columns).
pub const BOARD_WIDTH: usize = 6;

/// Exploration board height (rows).
pub const BOARD_HEIGHT: usize = 4;

/// Total cells on one exploration layer.
pub const BOARD_CELLS: usize = BOARD_WIDTH * BOARD_HEIGHT;

/// Fixed number of equipment slots per explorer.
pub const EQUIPMENT_SLOTS: usize = 6;

/// Rounds in one in-game day.
pub const ROUNDS_PER_DAY: u32 = 48;

/// Rounds a death drop stays on the map, counting the round of death.
pub const DEATH_DROP_RETENTION_ROUNDS: u32 = 96;

/// Quest priority when the table leaves it blank (lowest display priority).
pub const DEFAULT_QUEST_PRIORITY: u32 = 999;

/// Max stack size for ids missing from the resource and item tables.
pub const DEFAULT_MAX_STACK: i64 = 99;

/// Inventory slots for explorers whose table row leaves it blank.
pub const DEFAULT_INVENTORY_CAPACITY: usize = 4;

pub mod condition_types {
    /// Party members sharing an identity tag.
    pub const EXPLORER_TAG_COUNT: &str = "ExplorerTagCount";
    /// Matching loot objects stacked in one board column.
    pub const COLUMN_CLUSTER: &str = "ColumnCluster";
    /// Legacy table tag for [`COLUMN_CLUSTER`].
    pub const COLUMN_CLUSTER_LEGACY: &str = "Advanced_10002";
}

pub mod cell_types {
    pub const SHELTER: &str = "Shelter";
    pub const ROAD: &str = "Road";
    pub const EXPLORATION_POINT: &str = "ExplorationPoint";
    pub const OBSTACLE: &str = "Obstacle";
    pub const BUILT: &str = "Built";
}
