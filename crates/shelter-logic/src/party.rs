//! Explorers, monsters, and the roster that owns idle explorers.
//!
//! An explorer belongs to exactly one place at a time: the [`Roster`] while
//! idle, or an expedition party while out. Equipment is the only state that
//! survives a reset; the roster keeps it per explorer id.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::EQUIPMENT_SLOTS;
use crate::inventory::ItemStack;
use crate::parse::split_list;
use crate::tables::{ExplorerRow, MonsterRow};

pub type Equipment = [Option<String>; EQUIPMENT_SLOTS];

/// A playable character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explorer {
    pub id: String,
    pub config_id: String,
    /// Identity tags, used by tag-count loot conditions.
    pub tags: Vec<String>,
    pub hp: u32,
    pub max_hp: u32,
    pub stamina: u32,
    pub max_stamina: u32,
    pub attack: u32,
    pub capacity: usize,
    pub inventory: Vec<ItemStack>,
    pub equipment: Equipment,
    slot_types: [String; EQUIPMENT_SLOTS],
}

impl Explorer {
    pub fn from_config(row: &ExplorerRow) -> Self {
        let mut slot_types: [String; EQUIPMENT_SLOTS] = Default::default();
        for (slot, tag) in slot_types.iter_mut().zip(split_list(&row.equipment_slots)) {
            *slot = tag;
        }
        Self {
            id: row.id.clone(),
            config_id: row.id.clone(),
            tags: row.tags(),
            hp: row.starting_hp(),
            max_hp: row.max_hp,
            stamina: row.starting_stamina(),
            max_stamina: row.max_stamina,
            attack: row.attack,
            capacity: row.capacity(),
            inventory: Vec::new(),
            equipment: Default::default(),
            slot_types,
        }
    }

    /// An explorer with no template, for harnesses and tests.
    pub fn bare(id: &str, capacity: usize) -> Self {
        Self::from_config(&ExplorerRow {
            id: id.to_string(),
            max_hp: 10,
            max_stamina: 10,
            inventory_capacity: Some(capacity),
            ..Default::default()
        })
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }

    pub fn heal(&mut self, amount: u32) {
        self.hp = self.hp.saturating_add(amount).min(self.max_hp);
    }

    /// Spend stamina; `false` (and no change) if there is not enough.
    pub fn spend_stamina(&mut self, amount: u32) -> bool {
        if self.stamina < amount {
            return false;
        }
        self.stamina -= amount;
        true
    }

    pub fn slot_types(&self) -> &[String; EQUIPMENT_SLOTS] {
        &self.slot_types
    }

    /// Put `item_id` into `slot`. The slot's type tag must be empty or equal
    /// `item_type`. Returns `false` without change otherwise.
    pub fn equip(&mut self, slot: usize, item_id: &str, item_type: &str) -> bool {
        match self.slot_types.get(slot) {
            Some(tag) if tag.is_empty() || tag == item_type => {
                self.equipment[slot] = Some(item_id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn unequip(&mut self, slot: usize) -> Option<String> {
        self.equipment.get_mut(slot).and_then(Option::take)
    }

    /// Restore HP, stamina, capacity and inventory from the template.
    /// Equipment is left alone.
    pub fn reset_to(&mut self, row: &ExplorerRow) {
        self.hp = row.starting_hp();
        self.max_hp = row.max_hp;
        self.stamina = row.starting_stamina();
        self.max_stamina = row.max_stamina;
        self.attack = row.attack;
        self.capacity = row.capacity();
        self.tags = row.tags();
        self.inventory.clear();
    }
}

/// Runtime identity of one spawned monster.
///
/// Never equal to the template id, so two spawns of the same template
/// cannot collide in a registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonsterId {
    pub template: String,
    pub layer: u32,
    pub serial: u32,
}

impl fmt::Display for MonsterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@L{}#{}", self.template, self.layer, self.serial)
    }
}

/// Per-session monster id source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterIdAllocator {
    next_serial: u32,
}

impl MonsterIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, template: &str, layer: u32) -> MonsterId {
        let serial = self.next_serial;
        self.next_serial += 1;
        MonsterId {
            template: template.to_string(),
            layer,
            serial,
        }
    }

    pub fn issued(&self) -> u32 {
        self.next_serial
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monster {
    pub id: MonsterId,
    pub hp: u32,
    pub max_hp: u32,
    pub attack: u32,
}

impl Monster {
    pub fn from_template(id: MonsterId, row: &MonsterRow) -> Self {
        Self {
            id,
            hp: row.hp,
            max_hp: row.hp,
            attack: row.attack,
        }
    }

    pub fn template_id(&self) -> &str {
        &self.id.template
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }
}

/// Every explorer not currently on an expedition, plus the per-id
/// equipment registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    templates: BTreeMap<String, ExplorerRow>,
    idle: BTreeMap<String, Explorer>,
    equipment: BTreeMap<String, Equipment>,
}

impl Roster {
    pub fn from_rows(rows: &[ExplorerRow]) -> Self {
        let mut roster = Self::default();
        for row in rows {
            roster.templates.insert(row.id.clone(), row.clone());
            roster.idle.insert(row.id.clone(), Explorer::from_config(row));
        }
        roster
    }

    pub fn get(&self, id: &str) -> Option<&Explorer> {
        self.idle.get(id)
    }

    pub fn idle_ids(&self) -> impl Iterator<Item = &str> {
        self.idle.keys().map(String::as_str)
    }

    pub fn equipment_of(&self, id: &str) -> Option<&Equipment> {
        self.equipment.get(id)
    }

    /// Move the listed idle explorers out into a party, in the given order.
    /// Unknown, duplicate or already-departed ids are skipped.
    pub fn take_party(&mut self, ids: &[String]) -> Vec<Explorer> {
        ids.iter().filter_map(|id| self.idle.remove(id)).collect()
    }

    /// Bring explorers home: remember their equipment, reset everything else.
    pub fn return_party(&mut self, party: Vec<Explorer>) {
        for mut explorer in party {
            self.equipment
                .insert(explorer.id.clone(), explorer.equipment.clone());
            if let Some(row) = self.templates.get(&explorer.config_id) {
                explorer.reset_to(row);
            }
            self.idle.insert(explorer.id.clone(), explorer);
        }
    }

    /// Reset every idle explorer to template defaults, restoring equipment
    /// from the registry.
    pub fn reset_idle(&mut self) {
        for explorer in self.idle.values_mut() {
            if let Some(row) = self.templates.get(&explorer.config_id) {
                explorer.reset_to(row);
            }
            if let Some(gear) = self.equipment.get(&explorer.id) {
                explorer.equipment = gear.clone();
            }
        }
    }

    /// Equip an idle explorer and record it in the registry.
    pub fn equip(&mut self, id: &str, slot: usize, item_id: &str, item_type: &str) -> bool {
        let Some(explorer) = self.idle.get_mut(id) else {
            return false;
        };
        if !explorer.equip(slot, item_id, item_type) {
            return false;
        }
        self.equipment
            .insert(id.to_string(), explorer.equipment.clone());
        true
    }

    /// Forget an explorer's equipment (it was dropped on death).
    pub fn clear_equipment(&mut self, id: &str) {
        self.equipment.remove(id);
    }
}
