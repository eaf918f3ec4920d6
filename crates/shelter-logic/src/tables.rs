//! Static configuration table rows.
//!
//! One struct per table. Rows are read-only for the lifetime of a session;
//! the engines borrow them. Optional columns default so that sparse JSON
//! tables still load.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INVENTORY_CAPACITY, DEFAULT_MAX_STACK};
use crate::parse::split_list;

/// Explorer template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerRow {
    pub id: String,
    pub name_key: String,
    pub max_hp: u32,
    /// Starting HP; `None` means start at `max_hp`.
    pub initial_hp: Option<u32>,
    pub max_stamina: u32,
    pub initial_stamina: Option<u32>,
    pub attack: u32,
    pub inventory_capacity: Option<usize>,
    /// Pre-collapse identity tags, pipe-delimited (`Engineer|Medic`).
    pub identity_tags: String,
    /// Slot-type tag per equipment slot, pipe-delimited.
    pub equipment_slots: String,
    pub talent_ids: String,
}

impl ExplorerRow {
    pub fn tags(&self) -> Vec<String> {
        split_list(&self.identity_tags)
    }

    pub fn capacity(&self) -> usize {
        self.inventory_capacity.unwrap_or(DEFAULT_INVENTORY_CAPACITY)
    }

    pub fn starting_hp(&self) -> u32 {
        self.initial_hp.unwrap_or(self.max_hp).min(self.max_hp)
    }

    pub fn starting_stamina(&self) -> u32 {
        self.initial_stamina
            .unwrap_or(self.max_stamina)
            .min(self.max_stamina)
    }
}

/// Monster template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterRow {
    pub id: String,
    pub name_key: String,
    pub hp: u32,
    pub attack: u32,
}

/// World map cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapCellRow {
    pub x: i32,
    pub y: i32,
    pub cell_type: String,
    pub exploration_point_id: Option<String>,
}

/// Exploration point: layer count and board spawn table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationPointRow {
    pub id: String,
    pub name_key: String,
    pub max_layers: u32,
    pub difficulty: String,
    /// `Kind_id_weight|Kind_id_weight`.
    pub spawn_table: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRow {
    pub id: String,
    pub name_key: String,
    pub rarity: String,
    pub max_stack: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRow {
    pub id: String,
    pub name_key: String,
    pub item_type: String,
    pub max_stack: i64,
}

/// Loot object ("garbage") template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootRow {
    pub id: String,
    pub name_key: String,
    /// `id_qty|id_qty`.
    pub base_output: String,
    /// Loot categories, pipe-delimited.
    pub categories: String,
    /// Advanced-output condition ids, pipe-delimited.
    pub condition_ids: String,
    /// `id_qty|id_qty`; empty means no upgraded tier.
    pub advanced_output: String,
}

impl LootRow {
    pub fn category_list(&self) -> Vec<String> {
        split_list(&self.categories)
    }

    pub fn condition_id_list(&self) -> Vec<String> {
        split_list(&self.condition_ids)
    }
}

/// Advanced-output condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionRow {
    pub id: String,
    pub name_key: String,
    /// Loot categories the condition applies to; empty applies to all.
    pub categories: String,
    /// Handler type tag, e.g. `ExplorerTagCount`.
    pub condition_type: String,
    /// `key=value;key=value`.
    pub params: String,
}

impl ConditionRow {
    pub fn category_list(&self) -> Vec<String> {
        split_list(&self.categories)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestRow {
    pub id: String,
    pub name_key: String,
    pub trigger_type: String,
    pub trigger_params: String,
    pub completion_type: String,
    pub completion_target_id: String,
    pub completion_target_value: i64,
    pub reward_resources: String,
    pub reward_items: String,
    pub next_quest_id: Option<String>,
    pub priority: Option<u32>,
    pub chapter_end: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterRow {
    pub id: String,
    pub name_key: String,
    pub number: u32,
    /// Ordered map ids, pipe-delimited.
    pub map_ids: String,
}

/// Every static table the core consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigBundle {
    pub explorers: Vec<ExplorerRow>,
    pub monsters: Vec<MonsterRow>,
    pub map_cells: Vec<MapCellRow>,
    pub exploration_points: Vec<ExplorationPointRow>,
    pub resources: Vec<ResourceRow>,
    pub items: Vec<ItemRow>,
    pub loot_objects: Vec<LootRow>,
    pub loot_conditions: Vec<ConditionRow>,
    pub quests: Vec<QuestRow>,
    pub chapters: Vec<ChapterRow>,
}

impl ConfigBundle {
    pub fn explorer(&self, id: &str) -> Option<&ExplorerRow> {
        self.explorers.iter().find(|r| r.id == id)
    }

    pub fn monster(&self, id: &str) -> Option<&MonsterRow> {
        self.monsters.iter().find(|r| r.id == id)
    }

    pub fn point(&self, id: &str) -> Option<&ExplorationPointRow> {
        self.exploration_points.iter().find(|r| r.id == id)
    }

    pub fn loot(&self, id: &str) -> Option<&LootRow> {
        self.loot_objects.iter().find(|r| r.id == id)
    }

    /// Max stack for a resource or item id. Resources win over items;
    /// unknown ids and non-positive table values get `fallback`.
    pub fn max_stack(&self, id: &str, fallback: i64) -> i64 {
        let from_tables = self
            .resources
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.max_stack)
            .or_else(|| self.items.iter().find(|r| r.id == id).map(|r| r.max_stack));
        match from_tables {
            Some(n) if n > 0 => n,
            _ => fallback,
        }
    }

    /// [`Self::max_stack`] with the crate-wide default.
    pub fn max_stack_or_default(&self, id: &str) -> i64 {
        self.max_stack(id, DEFAULT_MAX_STACK)
    }
}
