//! Round clock.

use serde::{Deserialize, Serialize};

use crate::constants::ROUNDS_PER_DAY;
use crate::grid::GridMap;

/// What happened when the clock ticked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTick {
    pub round: u32,
    pub day: u32,
    /// A new day started on this tick.
    pub new_day: bool,
    pub expired_drops: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundClock {
    round: u32,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(round: u32) -> Self {
        Self { round }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn day(&self) -> u32 {
        day_of(self.round)
    }

    /// Move to the next round and clear death drops older than `retention`.
    pub fn advance(&mut self, map: &mut GridMap, retention: u32) -> RoundTick {
        let before = self.day();
        self.round += 1;
        let day = self.day();
        RoundTick {
            round: self.round,
            day,
            new_day: day != before,
            expired_drops: map.expire_death_drops(self.round, retention),
        }
    }
}

/// `round / 48 + 1`.
pub fn day_of(round: u32) -> u32 {
    round / ROUNDS_PER_DAY + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEATH_DROP_RETENTION_ROUNDS;
    use crate::grid::{CellType, GridCell, GridPos};
    use crate::inventory::{DeathDrop, ItemStack};

    fn one_cell_map() -> GridMap {
        GridMap::from_cells([GridCell {
            pos: GridPos { x: 0, y: 0 },
            cell_type: CellType::Road,
            exploration_point_id: None,
            progress: None,
            death_drop: None,
        }])
    }

    #[test]
    fn test_day_boundaries() {
        assert_eq!(day_of(0), 1);
        assert_eq!(day_of(47), 1);
        assert_eq!(day_of(48), 2);
        assert_eq!(day_of(96), 3);
    }

    #[test]
    fn test_advance_reports_new_day() {
        let mut map = one_cell_map();
        let mut clock = RoundClock::at(47);
        let tick = clock.advance(&mut map, DEATH_DROP_RETENTION_ROUNDS);
        assert_eq!(tick.round, 48);
        assert_eq!(tick.day, 2);
        assert!(tick.new_day);
        assert!(!clock.advance(&mut map, DEATH_DROP_RETENTION_ROUNDS).new_day);
    }

    #[test]
    fn test_death_drop_expires_after_retention() {
        let mut map = one_cell_map();
        let pos = GridPos { x: 0, y: 0 };
        assert!(map.place_death_drop(
            pos,
            DeathDrop {
                items: vec![ItemStack::new("wood", 1)],
                death_round: 10,
                owner_id: "a".into(),
            },
        ));

        let mut clock = RoundClock::at(104);
        assert_eq!(clock.advance(&mut map, 96).expired_drops, 0);
        assert!(map.cell(pos).unwrap().death_drop.is_some());

        assert_eq!(clock.advance(&mut map, 96).expired_drops, 1);
        assert!(map.cell(pos).unwrap().death_drop.is_none());
    }
}
