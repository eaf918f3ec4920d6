//! Session driver - owns the registries and wires the rule engines together
//!
//! A [`Session`] is the single writer for one game. The UI (or the headless
//! harness) drives it with two kinds of input: "advance one round" and
//! "request a path", plus explicit actions on an exploration board. Combat
//! itself is resolved outside through [`CombatResolver`].

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::mem;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use shelter_logic::board::{generate_layer, ExplorationLayer, LayerInput};
use shelter_logic::chapter::ChapterBook;
use shelter_logic::grid::{CellType, GridMap, GridPos};
use shelter_logic::inventory::{create_death_drop, distribute, ItemStack};
use shelter_logic::loot::{resolve_output, ConditionRegistry, LootContext, ResolvedOutput};
use shelter_logic::party::{Explorer, Monster, MonsterId, MonsterIdAllocator, Roster};
use shelter_logic::quest::{CompletionOutcome, QuestBook, QuestContext, QuestReward};
use shelter_logic::round::{RoundClock, RoundTick};
use shelter_logic::tables::ConfigBundle;

use crate::config::SessionOptions;
use crate::persistence::{load_state, save_state, SaveData, SaveError};

/// What a combat resolver sees and hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct Battlefield {
    pub board: ExplorationLayer,
    pub party: Vec<Explorer>,
    pub monsters: Vec<Monster>,
}

/// External combat rules. Takes the current layer, party and monsters and
/// returns their updated versions; HP at 0 means dead.
pub trait CombatResolver {
    fn resolve(&mut self, field: Battlefield) -> Battlefield;
}

/// A party out of the shelter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expedition {
    /// Party order is loot fill order.
    pub party: Vec<Explorer>,
    pub position: GridPos,
    /// Remaining cells to walk, next cell first.
    pub route: Vec<GridPos>,
    /// Exploration point being explored, set on arrival.
    pub point_id: Option<String>,
    pub layer: Option<ExplorationLayer>,
    /// Monsters alive on the current layer.
    pub monsters: BTreeMap<MonsterId, Monster>,
    /// Loot that did not fit in any inventory.
    pub holding: Vec<ItemStack>,
}

impl Expedition {
    fn new(party: Vec<Explorer>, position: GridPos) -> Self {
        Self {
            party,
            position,
            route: Vec::new(),
            point_id: None,
            layer: None,
            monsters: BTreeMap::new(),
            holding: Vec::new(),
        }
    }

    pub fn is_exploring(&self) -> bool {
        self.layer.is_some()
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.party.iter().map(|e| e.id.clone()).collect()
    }
}

/// Everything that changes during play. This is what a save contains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub clock: RoundClock,
    pub map: GridMap,
    pub roster: Roster,
    pub quests: QuestBook,
    pub chapters: ChapterBook,
    pub monster_ids: MonsterIdAllocator,
    /// Shelter storage, id to quantity.
    pub storage: BTreeMap<String, i64>,
    pub shelter_level: u32,
    pub expedition: Option<Expedition>,
    /// Explorers lost on expeditions.
    pub fallen: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub tick: RoundTick,
    /// Cell the party stepped onto this round.
    pub moved_to: Option<GridPos>,
    /// Exploration point reached this round.
    pub arrived_at: Option<String>,
    /// Layer generated on arrival.
    pub layer_generated: Option<u32>,
    pub accepted_quests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatReport {
    pub defeated: Vec<MonsterId>,
    pub fallen: Vec<String>,
    /// Nobody survived; the expedition is over.
    pub party_wiped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LootReport {
    pub loot_id: String,
    pub output: ResolvedOutput,
    /// Part of the output moved to the holding area.
    pub overflow: Vec<ItemStack>,
}

/// One game in progress.
pub struct Session {
    bundle: ConfigBundle,
    options: SessionOptions,
    registry: ConditionRegistry,
    rng: StdRng,
    state: SessionState,
}

impl Session {
    pub fn new(bundle: ConfigBundle, options: SessionOptions) -> Self {
        let quest_ctx = QuestContext {
            shelter_level: options.starting_shelter_level,
            ..QuestContext::default()
        };
        let state = SessionState {
            clock: RoundClock::new(),
            map: GridMap::from_rows(&bundle.map_cells),
            roster: Roster::from_rows(&bundle.explorers),
            quests: QuestBook::new(&bundle.quests, quest_ctx),
            chapters: ChapterBook::new(&bundle.chapters),
            monster_ids: MonsterIdAllocator::new(),
            storage: BTreeMap::new(),
            shelter_level: options.starting_shelter_level,
            expedition: None,
            fallen: BTreeSet::new(),
        };
        if state.map.shelter().is_none() {
            log::warn!("Map has no shelter cell; expeditions cannot start");
        }
        log::info!(
            "Session created: {} map cells, {} explorers, {} quests, seed={}",
            state.map.cell_count(),
            bundle.explorers.len(),
            bundle.quests.len(),
            options.seed,
        );
        Self {
            rng: StdRng::seed_from_u64(options.seed),
            bundle,
            options,
            registry: ConditionRegistry::with_builtin(),
            state,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn bundle(&self) -> &ConfigBundle {
        &self.bundle
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn round(&self) -> u32 {
        self.state.clock.round()
    }

    pub fn day(&self) -> u32 {
        self.state.clock.day()
    }

    pub fn map(&self) -> &GridMap {
        &self.state.map
    }

    pub fn roster(&self) -> &Roster {
        &self.state.roster
    }

    pub fn quests(&self) -> &QuestBook {
        &self.state.quests
    }

    pub fn chapters(&self) -> &ChapterBook {
        &self.state.chapters
    }

    pub fn expedition(&self) -> Option<&Expedition> {
        self.state.expedition.as_ref()
    }

    pub fn storage(&self) -> &BTreeMap<String, i64> {
        &self.state.storage
    }

    pub fn stored(&self, id: &str) -> i64 {
        self.state.storage.get(id).copied().unwrap_or(0)
    }

    /// Register extra loot condition kinds.
    pub fn registry_mut(&mut self) -> &mut ConditionRegistry {
        &mut self.registry
    }

    // ── Expedition lifecycle ───────────────────────────────────────────

    /// Send idle explorers out from the shelter. `false` (no change) if an
    /// expedition is already out, the map has no shelter, or no listed id
    /// is idle.
    pub fn start_expedition(&mut self, party_ids: &[String]) -> bool {
        if self.state.expedition.is_some() {
            return false;
        }
        let Some(shelter) = self.state.map.shelter() else {
            return false;
        };
        let party = self.state.roster.take_party(party_ids);
        if party.is_empty() {
            return false;
        }

        self.state.quests.update_party(&party);
        log::info!(
            "Expedition started with {:?} at round {}",
            party.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            self.round()
        );
        self.state.expedition = Some(Expedition::new(party, shelter));
        true
    }

    /// Plan a route to `target`. Returns the number of steps, or `None` if
    /// there is no expedition walking or no path.
    pub fn request_path(&mut self, target: GridPos) -> Option<usize> {
        let expedition = self.state.expedition.as_mut()?;
        if expedition.is_exploring() {
            return None;
        }
        let path = self.state.map.find_path(expedition.position, target)?;
        let steps = path.len();
        log::debug!(
            "Route {:?} -> {:?}: {} steps",
            expedition.position,
            target,
            steps
        );
        expedition.route = path;
        Some(steps)
    }

    /// Advance the world by one round.
    pub fn advance_round(&mut self) -> RoundReport {
        let mut report = RoundReport::default();

        if let Some(expedition) = self.state.expedition.as_mut() {
            if !expedition.route.is_empty() {
                let next = expedition.route.remove(0);
                expedition.position = next;
                report.moved_to = Some(next);

                if expedition.route.is_empty() && expedition.layer.is_none() {
                    report.arrived_at = self
                        .state
                        .map
                        .cell(next)
                        .filter(|c| c.cell_type == CellType::ExplorationPoint)
                        .and_then(|c| c.exploration_point_id.clone());
                }
            }
        }

        if let Some(point_id) = report.arrived_at.clone() {
            log::info!("Party arrived at exploration point {}", point_id);
            if let Some(expedition) = self.state.expedition.as_mut() {
                expedition.point_id = Some(point_id);
            }
            if self.enter_layer(1) {
                report.layer_generated = Some(1);
            }
        }

        report.tick = self
            .state
            .clock
            .advance(&mut self.state.map, self.options.death_drop_retention);
        if report.tick.expired_drops > 0 {
            log::debug!("{} death drops expired", report.tick.expired_drops);
        }
        report.accepted_quests = self
            .state
            .quests
            .update_round(report.tick.round, report.tick.day);
        for id in &report.accepted_quests {
            log::info!("Quest {} accepted", id);
        }
        report
    }

    /// Generate layer `index` of the current exploration point.
    fn enter_layer(&mut self, index: u32) -> bool {
        let Some(expedition) = self.state.expedition.as_mut() else {
            return false;
        };
        let Some(point) = expedition
            .point_id
            .as_deref()
            .and_then(|id| self.bundle.point(id))
        else {
            log::warn!("Exploration point {:?} has no table row", expedition.point_id);
            return false;
        };

        let explorers: Vec<String> = expedition
            .party
            .iter()
            .filter(|e| e.is_alive())
            .map(|e| e.id.clone())
            .collect();
        let generated = generate_layer(
            &LayerInput {
                point,
                explorers: &explorers,
                monsters: &self.bundle.monsters,
                loot: &self.bundle.loot_objects,
                layer_index: index,
            },
            &mut self.state.monster_ids,
            &mut self.rng,
        );

        let max_layers = point.max_layers.max(1);
        self.state
            .map
            .set_progress(expedition.position, layer_progress(index, max_layers));

        log::info!(
            "Layer {}/{} of {} generated: {} monsters, {} occupied cells",
            index,
            max_layers,
            point.id,
            generated.monsters.len(),
            generated.layer.occupant_count()
        );
        expedition.monsters = generated
            .monsters
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        expedition.layer = Some(generated.layer);
        true
    }

    /// Hand the board to `resolver` and apply the outcome. `None` when no
    /// layer is active.
    pub fn apply_combat(&mut self, resolver: &mut dyn CombatResolver) -> Option<CombatReport> {
        let expedition = self.state.expedition.as_mut()?;
        let board = expedition.layer.take()?;
        let field = resolver.resolve(Battlefield {
            board,
            party: mem::take(&mut expedition.party),
            monsters: mem::take(&mut expedition.monsters).into_values().collect(),
        });

        let mut report = CombatReport::default();
        let mut board = field.board;

        for monster in field.monsters {
            if monster.is_alive() {
                expedition.monsters.insert(monster.id.clone(), monster);
            } else {
                report.defeated.push(monster.id);
            }
        }
        // Anything the resolver dropped is gone from the board too
        let stale: Vec<MonsterId> = board
            .monsters()
            .filter(|id| !expedition.monsters.contains_key(*id))
            .cloned()
            .collect();
        for id in &stale {
            board.clear_monster(id);
        }

        for explorer in field.party {
            if explorer.is_alive() {
                expedition.party.push(explorer);
                continue;
            }
            board.clear_explorer(&explorer.id);
            if let Some(drop) = create_death_drop(&explorer, self.state.clock.round()) {
                self.state.map.place_death_drop(expedition.position, drop);
            }
            self.state.roster.clear_equipment(&explorer.id);
            self.state.fallen.insert(explorer.id.clone());
            log::info!("Explorer {} fell at {:?}", explorer.id, expedition.position);
            report.fallen.push(explorer.id);
        }
        expedition.layer = Some(board);

        for id in &report.defeated {
            self.state.quests.record_monster_defeated(&id.template);
        }
        report.party_wiped = expedition.party.is_empty();
        self.state.quests.update_party(&expedition.party);

        if report.party_wiped {
            log::info!("Party wiped out; expedition lost");
            self.state.expedition = None;
        }
        Some(report)
    }

    /// Search the loot object on `cell_index` of the current layer.
    pub fn search_loot(&mut self, cell_index: usize) -> Option<LootReport> {
        let expedition = self.state.expedition.as_mut()?;
        let layer = expedition.layer.as_mut()?;
        let loot_id = layer.cell(cell_index)?.garbage.clone()?;
        let Some(loot) = self.bundle.loot(&loot_id) else {
            log::warn!("Loot object {} has no table row; clearing cell", loot_id);
            if let Some(cell) = layer.cell_mut(cell_index) {
                cell.garbage = None;
            }
            return None;
        };

        let output = resolve_output(
            loot,
            &self.bundle.loot_conditions,
            &LootContext {
                party: &expedition.party,
                board: &*layer,
                loot_catalog: &self.bundle.loot_objects,
            },
            &self.registry,
        );
        if let Some(cell) = layer.cell_mut(cell_index) {
            cell.garbage = None;
        }

        let bundle = &self.bundle;
        let fallback = self.options.default_max_stack;
        let overflow = distribute(&mut expedition.party, &output.stacks, |id| {
            bundle.max_stack(id, fallback)
        });
        merge_stacks(&mut expedition.holding, &overflow);
        self.state.quests.update_party(&expedition.party);

        log::debug!(
            "Searched {} (advanced={}): {} stacks, {} overflowed",
            loot_id,
            output.advanced,
            output.stacks.len(),
            overflow.len()
        );
        Some(LootReport {
            loot_id,
            output,
            overflow,
        })
    }

    /// Try to move the holding area back into party inventories.
    /// Returns what is still left in holding.
    pub fn retrieve_holding(&mut self) -> Option<&[ItemStack]> {
        let expedition = self.state.expedition.as_mut()?;
        let pending = mem::take(&mut expedition.holding);
        let bundle = &self.bundle;
        let fallback = self.options.default_max_stack;
        expedition.holding = distribute(&mut expedition.party, &pending, |id| {
            bundle.max_stack(id, fallback)
        });
        self.state.quests.update_party(&expedition.party);
        Some(expedition.holding.as_slice())
    }

    /// Go one layer deeper. Past the last layer the exploration point is
    /// completed and `None` is returned.
    pub fn descend(&mut self) -> Option<u32> {
        let expedition = self.state.expedition.as_mut()?;
        let current = expedition.layer.as_ref()?.layer_index;
        let point_id = expedition.point_id.clone()?;
        let max_layers = self.bundle.point(&point_id).map_or(1, |p| p.max_layers.max(1));

        if current < max_layers {
            let next = current + 1;
            return self.enter_layer(next).then_some(next);
        }

        self.state.map.set_progress(expedition.position, 100);
        expedition.layer = None;
        expedition.monsters.clear();
        expedition.point_id = None;
        self.state.quests.record_exploration_completed(&point_id);
        log::info!("Exploration of {} completed", point_id);
        None
    }

    /// End the expedition: unload everything into shelter storage and put
    /// the party back in the roster. Returns what was unloaded.
    pub fn return_to_shelter(&mut self) -> Option<Vec<ItemStack>> {
        let expedition = self.state.expedition.take()?;

        let mut unloaded = Vec::new();
        for explorer in &expedition.party {
            merge_stacks(&mut unloaded, &explorer.inventory);
        }
        merge_stacks(&mut unloaded, &expedition.holding);
        for stack in &unloaded {
            let stored = self.state.storage.entry(stack.item_id.clone()).or_default();
            *stored = stored.saturating_add(stack.quantity);
        }

        self.state.roster.return_party(expedition.party);
        self.state.roster.reset_idle();
        self.state.quests.update_party(&[]);
        log::info!(
            "Expedition returned at round {}: {} stacks unloaded",
            self.round(),
            unloaded.len()
        );
        Some(unloaded)
    }

    // ── Quests, chapters, shelter ──────────────────────────────────────

    /// Complete a quest; a chapter-end quest also unlocks the next chapter.
    pub fn complete_quest(&mut self, quest_id: &str) -> CompletionOutcome {
        let outcome = self.state.quests.complete(quest_id);
        if outcome.success {
            log::info!("Quest {} completed", quest_id);
        }
        if outcome.chapter_end {
            match self.state.chapters.unlock_next() {
                Some(chapter) => log::info!("Chapter {} unlocked", chapter.id),
                None => log::info!("Final chapter completed"),
            }
        }
        outcome
    }

    /// Claim a completed quest's reward into shelter storage.
    pub fn claim_quest_reward(&mut self, quest_id: &str) -> Option<QuestReward> {
        let reward = self.state.quests.claim_reward(quest_id)?;
        for stack in reward.stacks() {
            let stored = self.state.storage.entry(stack.item_id.clone()).or_default();
            *stored = stored.saturating_add(stack.quantity);
        }
        log::info!("Reward for {} claimed", quest_id);
        Some(reward)
    }

    pub fn build_facility(&mut self, facility_id: &str) {
        self.state.quests.record_facility_built(facility_id);
        log::info!("Facility {} built", facility_id);
    }

    pub fn set_shelter_level(&mut self, level: u32) {
        self.state.shelter_level = level;
        self.state.quests.update_shelter_level(level);
    }

    /// Equip an idle explorer with an item from the item table.
    pub fn equip(&mut self, explorer_id: &str, slot: usize, item_id: &str) -> bool {
        let Some(item) = self.bundle.items.iter().find(|i| i.id == item_id) else {
            return false;
        };
        self.state
            .roster
            .equip(explorer_id, slot, item_id, &item.item_type)
    }

    // ── Snapshots ──────────────────────────────────────────────────────

    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        save_state(writer, self.options.seed, &self.state)
    }

    /// Restore a session saved with the same config bundle.
    pub fn load<R: Read>(
        bundle: ConfigBundle,
        options: SessionOptions,
        reader: R,
    ) -> Result<Self, SaveError> {
        let SaveData { seed, state, .. } = load_state(reader)?;
        log::info!("Loaded session at round {}", state.clock.round());
        // The generator stream is not saved; continue from a seed derived
        // from the save point.
        let rng = StdRng::seed_from_u64(seed.wrapping_add(u64::from(state.clock.round())));
        Ok(Self {
            bundle,
            options: SessionOptions { seed, ..options },
            registry: ConditionRegistry::with_builtin(),
            rng,
            state,
        })
    }
}

/// Percent shown while on layer `index`; 100 is kept for a finished point.
fn layer_progress(index: u32, max_layers: u32) -> u8 {
    let done = u64::from(index.saturating_sub(1)) * 100 / u64::from(max_layers.max(1));
    done.min(99) as u8
}

/// Add `stacks` into `target`, merging by id.
fn merge_stacks(target: &mut Vec<ItemStack>, stacks: &[ItemStack]) {
    for stack in stacks.iter().filter(|s| s.quantity > 0) {
        match target.iter_mut().find(|t| t.item_id == stack.item_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(stack.quantity),
            None => target.push(stack.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelter_logic::constants::condition_types;
    use shelter_logic::quest::QuestStatus;
    use shelter_logic::tables::{
        ChapterRow, ConditionRow, ExplorationPointRow, ExplorerRow, ItemRow, LootRow,
        MapCellRow, MonsterRow, QuestRow, ResourceRow,
    };

    fn cell(x: i32, y: i32, cell_type: &str, point: Option<&str>) -> MapCellRow {
        MapCellRow {
            x,
            y,
            cell_type: cell_type.into(),
            exploration_point_id: point.map(str::to_string),
        }
    }

    /// Shelter at (0,0), road east, point "depot" at (2,0).
    fn bundle(spawn: &str) -> ConfigBundle {
        ConfigBundle {
            explorers: vec![
                ExplorerRow {
                    id: "anna".into(),
                    max_hp: 20,
                    max_stamina: 10,
                    inventory_capacity: Some(1),
                    identity_tags: "Engineer".into(),
                    equipment_slots: "Weapon".into(),
                    ..Default::default()
                },
                ExplorerRow {
                    id: "bo".into(),
                    max_hp: 20,
                    max_stamina: 10,
                    inventory_capacity: Some(1),
                    ..Default::default()
                },
            ],
            monsters: vec![MonsterRow {
                id: "rat".into(),
                hp: 3,
                attack: 1,
                ..Default::default()
            }],
            map_cells: vec![
                cell(0, 0, "Shelter", None),
                cell(1, 0, "Road", None),
                cell(2, 0, "ExplorationPoint", Some("depot")),
            ],
            exploration_points: vec![ExplorationPointRow {
                id: "depot".into(),
                max_layers: 2,
                spawn_table: spawn.into(),
                ..Default::default()
            }],
            resources: vec![ResourceRow {
                id: "scrap".into(),
                max_stack: 5,
                ..Default::default()
            }],
            items: vec![ItemRow {
                id: "pipe".into(),
                item_type: "Weapon".into(),
                max_stack: 1,
                ..Default::default()
            }],
            loot_objects: vec![LootRow {
                id: "crate".into(),
                base_output: "scrap_7".into(),
                categories: "Machine".into(),
                condition_ids: "eng".into(),
                advanced_output: "scrap_12".into(),
                ..Default::default()
            }],
            loot_conditions: vec![ConditionRow {
                id: "eng".into(),
                categories: "Machine".into(),
                condition_type: condition_types::EXPLORER_TAG_COUNT.into(),
                params: "ExplorerTag=Engineer;MinCount=2".into(),
                ..Default::default()
            }],
            quests: vec![
                QuestRow {
                    id: "first_steps".into(),
                    trigger_type: "RoundReached".into(),
                    trigger_params: "round=1".into(),
                    completion_type: "CompleteExploration".into(),
                    completion_target_id: "depot".into(),
                    completion_target_value: 1,
                    reward_resources: "scrap_4".into(),
                    chapter_end: true,
                    ..Default::default()
                },
                QuestRow {
                    id: "pest_control".into(),
                    trigger_type: "MonsterDefeated".into(),
                    trigger_params: "monsterId=rat".into(),
                    completion_type: "DefeatMonster".into(),
                    completion_target_id: "rat".into(),
                    completion_target_value: 1,
                    ..Default::default()
                },
            ],
            chapters: vec![
                ChapterRow {
                    id: "c1".into(),
                    number: 1,
                    map_ids: "town".into(),
                    ..Default::default()
                },
                ChapterRow {
                    id: "c2".into(),
                    number: 2,
                    map_ids: "city".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn party() -> Vec<String> {
        vec!["anna".to_string(), "bo".to_string()]
    }

    /// Walk the party to the depot; returns the arrival report.
    fn walk_to_depot(session: &mut Session) -> RoundReport {
        assert!(session.start_expedition(&party()));
        assert_eq!(session.request_path(GridPos { x: 2, y: 0 }), Some(2));
        session.advance_round();
        session.advance_round()
    }

    /// Kills every monster; optionally kills one explorer too.
    struct Slaughter {
        victim: Option<String>,
    }

    impl CombatResolver for Slaughter {
        fn resolve(&mut self, mut field: Battlefield) -> Battlefield {
            for monster in &mut field.monsters {
                monster.take_damage(monster.hp);
            }
            for explorer in &mut field.party {
                if Some(&explorer.id) == self.victim.as_ref() {
                    explorer.take_damage(explorer.hp);
                }
            }
            field
        }
    }

    #[test]
    fn test_start_expedition_rejects_bad_parties() {
        let mut session = Session::new(bundle(""), SessionOptions::default());
        assert!(!session.start_expedition(&[]));
        assert!(!session.start_expedition(&["ghost".to_string()]));
        assert!(session.expedition().is_none());

        assert!(session.start_expedition(&party()));
        assert!(!session.start_expedition(&party()));
        assert!(session.roster().get("anna").is_none());
        assert_eq!(session.expedition().unwrap().position, GridPos { x: 0, y: 0 });
    }

    #[test]
    fn test_walk_and_arrive_generates_layer_one() {
        let mut session = Session::new(bundle("Monster_rat_1"), SessionOptions::with_seed(5));
        let report = walk_to_depot(&mut session);

        assert_eq!(report.moved_to, Some(GridPos { x: 2, y: 0 }));
        assert_eq!(report.arrived_at.as_deref(), Some("depot"));
        assert_eq!(report.layer_generated, Some(1));
        assert_eq!(report.tick.round, 2);
        assert_eq!(report.accepted_quests, Vec::<String>::new());

        let expedition = session.expedition().unwrap();
        let layer = expedition.layer.as_ref().unwrap();
        assert!(layer.explorer_cell("anna").is_some());
        assert!(layer.explorer_cell("bo").is_some());
        // Every other cell holds a rat, each registered
        assert_eq!(expedition.monsters.len(), 22);
        assert!(layer.monsters().all(|id| expedition.monsters.contains_key(id)));
        assert_eq!(session.request_path(GridPos { x: 0, y: 0 }), None);
    }

    #[test]
    fn test_first_round_accepts_quest() {
        let mut session = Session::new(bundle(""), SessionOptions::default());
        let report = session.advance_round();
        assert_eq!(report.accepted_quests, vec!["first_steps".to_string()]);
        assert_eq!(
            session.quests().get("first_steps").unwrap().status,
            QuestStatus::Accepted
        );
    }

    #[test]
    fn test_combat_removes_dead_and_records_defeats() {
        let mut session = Session::new(bundle("Monster_rat_1"), SessionOptions::with_seed(9));
        walk_to_depot(&mut session);

        let report = session
            .apply_combat(&mut Slaughter {
                victim: Some("bo".into()),
            })
            .unwrap();
        assert_eq!(report.defeated.len(), 22);
        assert_eq!(report.fallen, vec!["bo".to_string()]);
        assert!(!report.party_wiped);

        let expedition = session.expedition().unwrap();
        let layer = expedition.layer.as_ref().unwrap();
        assert!(expedition.monsters.is_empty());
        assert_eq!(layer.monsters().count(), 0);
        assert!(layer.explorer_cell("bo").is_none());
        assert_eq!(expedition.member_ids(), vec!["anna".to_string()]);
        assert!(session.state().fallen.contains("bo"));

        let pest = session.quests().get("pest_control").unwrap();
        assert_eq!(pest.status, QuestStatus::Accepted);
        assert_eq!(pest.completion.current_value, 22);
    }

    #[test]
    fn test_party_wipe_ends_expedition_and_leaves_drop() {
        struct Massacre;
        impl CombatResolver for Massacre {
            fn resolve(&mut self, mut field: Battlefield) -> Battlefield {
                for explorer in &mut field.party {
                    explorer.inventory.push(ItemStack::new("scrap", 2));
                    explorer.take_damage(explorer.hp);
                }
                field
            }
        }

        let mut session = Session::new(bundle("Monster_rat_1"), SessionOptions::default());
        walk_to_depot(&mut session);
        let report = session.apply_combat(&mut Massacre).unwrap();
        assert!(report.party_wiped);
        assert!(session.expedition().is_none());

        let drop = session
            .map()
            .cell(GridPos { x: 2, y: 0 })
            .unwrap()
            .death_drop
            .as_ref()
            .unwrap();
        assert_eq!(drop.death_round, 2);
    }

    #[test]
    fn test_search_loot_routes_overflow_to_holding() {
        let mut session = Session::new(bundle("Garbage_crate_1"), SessionOptions::with_seed(1));
        walk_to_depot(&mut session);

        let index = {
            let layer = session.expedition().unwrap().layer.as_ref().unwrap();
            layer.cells.iter().find(|c| c.garbage.is_some()).unwrap().index
        };
        let report = session.search_loot(index).unwrap();
        // Only one engineer: base output, 7 scrap into two 1-slot bags of 5
        assert!(!report.output.advanced);
        assert_eq!(report.overflow, Vec::<ItemStack>::new());

        let next = {
            let layer = session.expedition().unwrap().layer.as_ref().unwrap();
            assert!(layer.cell(index).unwrap().garbage.is_none());
            layer.cells.iter().find(|c| c.garbage.is_some()).unwrap().index
        };
        let report = session.search_loot(next).unwrap();
        assert_eq!(report.overflow, vec![ItemStack::new("scrap", 4)]);
        assert_eq!(
            session.expedition().unwrap().holding,
            vec![ItemStack::new("scrap", 4)]
        );
        assert!(session.search_loot(next).is_none());

        // Nothing has room, so holding stays put
        assert_eq!(
            session.retrieve_holding().unwrap(),
            &[ItemStack::new("scrap", 4)]
        );
    }

    #[test]
    fn test_layer_progress_bounds() {
        assert_eq!(layer_progress(1, 2), 0);
        assert_eq!(layer_progress(2, 2), 50);
        assert_eq!(layer_progress(3, 3), 66);
        assert_eq!(layer_progress(u32::MAX, u32::MAX), 99);
        assert_eq!(layer_progress(u32::MAX, 1), 99);
        assert_eq!(layer_progress(0, 0), 0);
    }

    #[test]
    fn test_storage_saturates() {
        let mut stacks = vec![ItemStack::new("scrap", i64::MAX - 1)];
        merge_stacks(&mut stacks, &[ItemStack::new("scrap", 5)]);
        assert_eq!(stacks, vec![ItemStack::new("scrap", i64::MAX)]);
    }

    #[test]
    fn test_descend_then_complete_exploration() {
        let mut session = Session::new(bundle(""), SessionOptions::default());
        session.advance_round(); // accept first_steps
        walk_to_depot(&mut session);

        assert_eq!(session.descend(), Some(2));
        assert_eq!(
            session.expedition().unwrap().layer.as_ref().unwrap().layer_index,
            2
        );
        assert_eq!(session.descend(), None);
        assert!(!session.expedition().unwrap().is_exploring());
        assert_eq!(
            session.map().cell(GridPos { x: 2, y: 0 }).unwrap().progress,
            Some(100)
        );
        assert_eq!(
            session.quests().context().completed_explorations.get("depot"),
            Some(&1)
        );
        assert_eq!(session.descend(), None);
    }

    #[test]
    fn test_return_to_shelter_unloads_and_keeps_equipment() {
        let mut session = Session::new(bundle("Garbage_crate_1"), SessionOptions::default());
        assert!(session.equip("anna", 0, "pipe"));
        assert!(!session.equip("anna", 0, "nothing"));
        walk_to_depot(&mut session);

        let index = {
            let layer = session.expedition().unwrap().layer.as_ref().unwrap();
            layer.cells.iter().find(|c| c.garbage.is_some()).unwrap().index
        };
        session.search_loot(index).unwrap();

        let unloaded = session.return_to_shelter().unwrap();
        assert_eq!(unloaded, vec![ItemStack::new("scrap", 7)]);
        assert_eq!(session.stored("scrap"), 7);
        assert!(session.expedition().is_none());

        let anna = session.roster().get("anna").unwrap();
        assert!(anna.inventory.is_empty());
        assert_eq!(anna.equipment[0].as_deref(), Some("pipe"));
        assert!(session.return_to_shelter().is_none());
    }

    #[test]
    fn test_chapter_end_quest_and_reward() {
        let mut session = Session::new(bundle(""), SessionOptions::default());
        session.advance_round();
        assert!(!session.complete_quest("first_steps").success);

        walk_to_depot(&mut session);
        session.descend();
        session.descend();
        let outcome = session.complete_quest("first_steps");
        assert!(outcome.success);
        assert!(outcome.chapter_end);
        assert_eq!(session.chapters().current().unwrap().id, "c2");

        let reward = session.claim_quest_reward("first_steps").unwrap();
        assert_eq!(reward.resources, vec![ItemStack::new("scrap", 4)]);
        assert_eq!(session.stored("scrap"), 4);
        assert!(session.claim_quest_reward("first_steps").is_none());
        assert_eq!(session.stored("scrap"), 4);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut session = Session::new(bundle("Monster_rat_1"), SessionOptions::with_seed(77));
        walk_to_depot(&mut session);
        session.build_facility("workbench");
        session.set_shelter_level(3);

        let mut buffer = Vec::new();
        session.save(&mut buffer).expect("save failed");

        let loaded = Session::load(bundle("Monster_rat_1"), SessionOptions::default(), &buffer[..])
            .expect("load failed");
        assert_eq!(loaded.round(), 2);
        assert_eq!(loaded.options().seed, 77);
        assert_eq!(loaded.state().shelter_level, 3);
        assert_eq!(loaded.expedition(), session.expedition());
        assert_eq!(loaded.quests(), session.quests());
        assert_eq!(loaded.chapters(), session.chapters());
        assert_eq!(
            loaded.state().monster_ids.issued(),
            session.state().monster_ids.issued()
        );
        assert_eq!(
            loaded.quests().context().built_facilities.get("workbench"),
            Some(&1)
        );
    }

    #[test]
    fn test_merge_stacks() {
        let mut target = vec![ItemStack::new("a", 1)];
        merge_stacks(
            &mut target,
            &[ItemStack::new("a", 2), ItemStack::new("b", 0), ItemStack::new("c", 3)],
        );
        assert_eq!(target, vec![ItemStack::new("a", 3), ItemStack::new("c", 3)]);
    }
}
