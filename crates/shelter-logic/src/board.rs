//! Exploration board generation.
//!
//! One layer is a 6x4 grid of cells. Generation places the surviving
//! explorers on distinct random cells first, then visits every remaining
//! cell in random order and fills it from the point's weighted spawn table:
//! a monster if the drawn monster template exists, otherwise a loot object
//! if the drawn loot template exists, otherwise nothing.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_CELLS, BOARD_WIDTH};
use crate::party::{Monster, MonsterId, MonsterIdAllocator};
use crate::tables::{ExplorationPointRow, LootRow, MonsterRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnKind {
    Monster,
    Garbage,
}

impl SpawnKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Monster" => Some(Self::Monster),
            "Garbage" => Some(Self::Garbage),
            _ => None,
        }
    }
}

/// One parsed spawn table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    pub kind: SpawnKind,
    pub id: String,
    pub weight: f64,
}

/// Parse `Kind_id_weight|Kind_id_weight`.
///
/// The id is every token between the first and the last, so ids may contain
/// underscores. Entries with fewer than three tokens, an empty id or an
/// unknown kind are dropped. A malformed, zero or non-finite weight becomes 1.
pub fn parse_spawn_entries(raw: &str) -> Vec<SpawnEntry> {
    raw.split('|')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('_').collect();
            if parts.len() < 3 {
                return None;
            }
            let kind = SpawnKind::parse(parts[0])?;
            let id = parts[1..parts.len() - 1].join("_");
            if id.is_empty() {
                return None;
            }
            let weight = match parts[parts.len() - 1].trim().parse::<f64>() {
                Ok(w) if w.is_finite() && w != 0.0 => w,
                _ => 1.0,
            };
            Some(SpawnEntry { kind, id, weight })
        })
        .collect()
}

/// Weight-proportional pick. Non-positive weights never win unless every
/// weight is non-positive, in which case the first entry is returned.
pub fn choose_weighted<'a>(entries: &[&'a SpawnEntry], rng: &mut impl Rng) -> Option<&'a SpawnEntry> {
    let first = *entries.first()?;
    let mut total: f64 = entries.iter().map(|e| draw_weight(e.weight)).sum();
    if total <= 0.0 {
        return Some(first);
    }
    // Sums past f64::MAX are drawn on weights scaled by the largest one
    let mut scale = 1.0;
    if !total.is_finite() {
        scale = entries
            .iter()
            .map(|e| draw_weight(e.weight))
            .fold(0.0, f64::max);
        total = entries.iter().map(|e| draw_weight(e.weight) / scale).sum();
    }
    let roll = rng.gen_range(0.0..total);
    let mut acc = 0.0;
    for entry in entries {
        let w = draw_weight(entry.weight) / scale;
        acc += w;
        if w > 0.0 && roll < acc {
            return Some(*entry);
        }
    }
    // Float rounding on the last bucket
    entries.iter().rev().find(|e| draw_weight(e.weight) > 0.0).copied()
}

/// NaN and non-positive weights never win; infinity counts as `f64::MAX`.
fn draw_weight(weight: f64) -> f64 {
    if weight.is_nan() || weight <= 0.0 {
        0.0
    } else {
        weight.min(f64::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardCell {
    pub index: usize,
    pub explorer: Option<String>,
    pub monster: Option<MonsterId>,
    pub garbage: Option<String>,
}

impl BoardCell {
    pub fn is_empty(&self) -> bool {
        self.explorer.is_none() && self.monster.is_none() && self.garbage.is_none()
    }

    /// Column on the board (`index mod BOARD_WIDTH`).
    pub fn column(&self) -> usize {
        self.index % BOARD_WIDTH
    }

    pub fn row(&self) -> usize {
        self.index / BOARD_WIDTH
    }
}

/// One generated layer of an exploration point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationLayer {
    /// 1-based.
    pub layer_index: u32,
    pub cells: Vec<BoardCell>,
}

impl ExplorationLayer {
    pub fn empty(layer_index: u32) -> Self {
        Self {
            layer_index,
            cells: (0..BOARD_CELLS)
                .map(|index| BoardCell {
                    index,
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn cell(&self, index: usize) -> Option<&BoardCell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut BoardCell> {
        self.cells.get_mut(index)
    }

    pub fn explorer_cell(&self, explorer_id: &str) -> Option<usize> {
        self.cells
            .iter()
            .position(|c| c.explorer.as_deref() == Some(explorer_id))
    }

    pub fn monster_cell(&self, id: &MonsterId) -> Option<usize> {
        self.cells.iter().position(|c| c.monster.as_ref() == Some(id))
    }

    /// Remove a monster from whichever cell holds it.
    pub fn clear_monster(&mut self, id: &MonsterId) -> bool {
        match self.cells.iter_mut().find(|c| c.monster.as_ref() == Some(id)) {
            Some(cell) => {
                cell.monster = None;
                true
            }
            None => false,
        }
    }

    pub fn clear_explorer(&mut self, explorer_id: &str) -> bool {
        match self
            .cells
            .iter_mut()
            .find(|c| c.explorer.as_deref() == Some(explorer_id))
        {
            Some(cell) => {
                cell.explorer = None;
                true
            }
            None => false,
        }
    }

    /// Count of occupant ids across all cells and kinds.
    pub fn occupant_count(&self) -> usize {
        self.cells
            .iter()
            .map(|c| {
                usize::from(c.explorer.is_some())
                    + usize::from(c.monster.is_some())
                    + usize::from(c.garbage.is_some())
            })
            .sum()
    }

    pub fn monsters(&self) -> impl Iterator<Item = &MonsterId> {
        self.cells.iter().filter_map(|c| c.monster.as_ref())
    }
}

/// Everything a layer generation needs.
#[derive(Debug, Clone, Copy)]
pub struct LayerInput<'a> {
    pub point: &'a ExplorationPointRow,
    /// Surviving explorer ids, in party order.
    pub explorers: &'a [String],
    pub monsters: &'a [MonsterRow],
    pub loot: &'a [LootRow],
    /// 1-based.
    pub layer_index: u32,
}

/// A generated layer plus the monsters spawned on it, ready to register.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLayer {
    pub layer: ExplorationLayer,
    pub monsters: Vec<Monster>,
}

/// Generate one fully populated exploration layer.
pub fn generate_layer(
    input: &LayerInput<'_>,
    ids: &mut MonsterIdAllocator,
    rng: &mut impl Rng,
) -> GeneratedLayer {
    let mut layer = ExplorationLayer::empty(input.layer_index);

    // Random visiting order doubles as sampling without replacement
    let mut free: Vec<usize> = (0..BOARD_CELLS).collect();
    free.shuffle(rng);
    let mut free = free.into_iter();

    for explorer_id in input.explorers {
        let Some(index) = free.next() else {
            break;
        };
        layer.cells[index].explorer = Some(explorer_id.clone());
    }

    let entries = parse_spawn_entries(&input.point.spawn_table);
    let monster_entries: Vec<&SpawnEntry> = entries
        .iter()
        .filter(|e| e.kind == SpawnKind::Monster)
        .collect();
    let garbage_entries: Vec<&SpawnEntry> = entries
        .iter()
        .filter(|e| e.kind == SpawnKind::Garbage)
        .collect();

    let monster_catalog: HashMap<&str, &MonsterRow> =
        input.monsters.iter().map(|m| (m.id.as_str(), m)).collect();
    let loot_catalog: HashMap<&str, &LootRow> =
        input.loot.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut monsters = Vec::new();
    for index in free {
        if let Some(template) = choose_weighted(&monster_entries, rng)
            .and_then(|e| monster_catalog.get(e.id.as_str()))
        {
            let id = ids.issue(&template.id, input.layer_index);
            layer.cells[index].monster = Some(id.clone());
            monsters.push(Monster::from_template(id, template));
            continue;
        }

        if let Some(entry) = choose_weighted(&garbage_entries, rng) {
            if loot_catalog.contains_key(entry.id.as_str()) {
                layer.cells[index].garbage = Some(entry.id.clone());
            }
        }
    }

    GeneratedLayer { layer, monsters }
}
