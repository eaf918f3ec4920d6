//! Quest state machine.
//!
//! `NotTriggered -> Accepted -> Completed -> RewardClaimed`, never backwards.
//! Acceptance is automatic once the trigger holds; completion and reward
//! claims are explicit. A [`QuestBook`] owns every quest plus the
//! [`QuestContext`] counters they are evaluated against.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_QUEST_PRIORITY;
use crate::inventory::{total_quantity, ItemStack};
use crate::parse::{parse_params, parse_reward_stacks, Params};
use crate::party::Explorer;
use crate::tables::QuestRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestStatus {
    NotTriggered,
    Accepted,
    Completed,
    RewardClaimed,
}

/// When a quest becomes visible and accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    RoundReached { round: u32 },
    QuestCompleted { quest_id: String },
    /// Aggregate over every party inventory.
    ResourceOwned { resource_id: String, quantity: i64 },
    ExplorationCompleted { point_id: String },
    MonsterDefeated { monster_id: String, quantity: u32 },
    ShelterLevelReached { level: u32 },
    /// Unrecognised type or missing parameters; never fires.
    Never { type_tag: String },
}

impl TriggerCondition {
    /// Build from the table's type column and its params, either
    /// `key=value;...` or a JSON object.
    pub fn parse(type_tag: &str, raw_params: &str) -> Self {
        let params = parse_params(raw_params);
        Self::from_params(type_tag, &params).unwrap_or_else(|| TriggerCondition::Never {
            type_tag: type_tag.to_string(),
        })
    }

    fn from_params(type_tag: &str, params: &Params) -> Option<Self> {
        let text = |key: &str| {
            let value = params.text(key);
            (!value.is_empty()).then(|| value.to_string())
        };
        let number = |key: &str| params.int(key).and_then(|n| u32::try_from(n).ok());

        let trigger = match type_tag {
            "RoundReached" => TriggerCondition::RoundReached {
                round: number("round")?,
            },
            "QuestCompleted" => TriggerCondition::QuestCompleted {
                quest_id: text("questId")?,
            },
            "ResourceOwned" => TriggerCondition::ResourceOwned {
                resource_id: text("resourceId")?,
                quantity: params.int("quantity")?,
            },
            "ExplorationCompleted" => TriggerCondition::ExplorationCompleted {
                point_id: text("explorationPointId")?,
            },
            "MonsterDefeated" => TriggerCondition::MonsterDefeated {
                monster_id: text("monsterId")?,
                quantity: params.positive_or("quantity", 1),
            },
            "ShelterLevelReached" => TriggerCondition::ShelterLevelReached {
                level: number("level")?,
            },
            _ => return None,
        };
        Some(trigger)
    }

    pub fn is_met(&self, ctx: &QuestContext) -> bool {
        match self {
            TriggerCondition::RoundReached { round } => ctx.round >= *round,
            TriggerCondition::QuestCompleted { quest_id } => ctx.completed_quests.contains(quest_id),
            TriggerCondition::ResourceOwned {
                resource_id,
                quantity,
            } => total_quantity(&ctx.party, resource_id) >= *quantity,
            TriggerCondition::ExplorationCompleted { point_id } => {
                count(&ctx.completed_explorations, point_id) > 0
            }
            TriggerCondition::MonsterDefeated {
                monster_id,
                quantity,
            } => count(&ctx.defeated_monsters, monster_id) >= *quantity,
            TriggerCondition::ShelterLevelReached { level } => ctx.shelter_level >= *level,
            TriggerCondition::Never { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionKind {
    CollectResource,
    DefeatMonster,
    CompleteExploration,
    BuildFacility,
    ReachRound,
    Unknown(String),
}

impl CompletionKind {
    pub fn from_table(raw: &str) -> Self {
        match raw {
            "CollectResource" => CompletionKind::CollectResource,
            "DefeatMonster" => CompletionKind::DefeatMonster,
            "CompleteExploration" => CompletionKind::CompleteExploration,
            "BuildFacility" => CompletionKind::BuildFacility,
            "ReachRound" => CompletionKind::ReachRound,
            other => CompletionKind::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionCondition {
    pub kind: CompletionKind,
    pub target_id: String,
    pub target_value: i64,
    /// Last recomputed progress.
    pub current_value: i64,
}

impl CompletionCondition {
    pub fn measure(&self, ctx: &QuestContext) -> i64 {
        match self.kind {
            CompletionKind::CollectResource => total_quantity(&ctx.party, &self.target_id),
            CompletionKind::DefeatMonster => count(&ctx.defeated_monsters, &self.target_id) as i64,
            CompletionKind::CompleteExploration => {
                count(&ctx.completed_explorations, &self.target_id) as i64
            }
            CompletionKind::BuildFacility => count(&ctx.built_facilities, &self.target_id) as i64,
            CompletionKind::ReachRound => ctx.round as i64,
            CompletionKind::Unknown(_) => 0,
        }
    }

    pub fn recompute(&mut self, ctx: &QuestContext) {
        self.current_value = self.measure(ctx);
    }

    pub fn is_met(&self) -> bool {
        self.current_value >= self.target_value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestReward {
    pub resources: Vec<ItemStack>,
    pub items: Vec<ItemStack>,
}

impl QuestReward {
    /// Resources then items, as one list.
    pub fn stacks(&self) -> impl Iterator<Item = &ItemStack> {
        self.resources.iter().chain(self.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub name_key: String,
    pub status: QuestStatus,
    pub trigger: TriggerCondition,
    pub completion: CompletionCondition,
    pub reward: QuestReward,
    pub next_quest_id: Option<String>,
    /// Lower sorts first.
    pub priority: u32,
    pub chapter_end: bool,
    /// Row position in the quest table; breaks priority ties.
    pub table_order: usize,
}

impl Quest {
    pub fn from_row(row: &QuestRow) -> Self {
        Self {
            id: row.id.clone(),
            name_key: row.name_key.clone(),
            status: QuestStatus::NotTriggered,
            trigger: TriggerCondition::parse(&row.trigger_type, &row.trigger_params),
            completion: CompletionCondition {
                kind: CompletionKind::from_table(&row.completion_type),
                target_id: row.completion_target_id.clone(),
                target_value: row.completion_target_value,
                current_value: 0,
            },
            reward: QuestReward {
                resources: parse_reward_stacks(&row.reward_resources),
                items: parse_reward_stacks(&row.reward_items),
            },
            next_quest_id: row.next_quest_id.clone().filter(|id| !id.is_empty()),
            priority: row.priority.unwrap_or(DEFAULT_QUEST_PRIORITY),
            chapter_end: row.chapter_end,
            table_order: 0,
        }
    }

    /// Accepted, completed or claimed.
    pub fn is_visible(&self) -> bool {
        self.status != QuestStatus::NotTriggered
    }
}

/// Everything quest conditions are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestContext {
    pub round: u32,
    pub day: u32,
    pub shelter_level: u32,
    /// Live party; empty while everyone is home.
    pub party: Vec<Explorer>,
    pub completed_quests: BTreeSet<String>,
    pub completed_explorations: BTreeMap<String, u32>,
    pub defeated_monsters: BTreeMap<String, u32>,
    pub built_facilities: BTreeMap<String, u32>,
}

impl Default for QuestContext {
    fn default() -> Self {
        Self {
            round: 0,
            day: 1,
            shelter_level: 1,
            party: Vec::new(),
            completed_quests: BTreeSet::new(),
            completed_explorations: BTreeMap::new(),
            defeated_monsters: BTreeMap::new(),
            built_facilities: BTreeMap::new(),
        }
    }
}

fn count(counters: &BTreeMap<String, u32>, id: &str) -> u32 {
    counters.get(id).copied().unwrap_or(0)
}

/// Result of [`QuestBook::complete`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub success: bool,
    /// The completed quest closes its chapter.
    pub chapter_end: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestBook {
    quests: BTreeMap<String, Quest>,
    ctx: QuestContext,
}

impl QuestBook {
    /// Build every quest from its row and run the first acceptance pass.
    pub fn new(rows: &[QuestRow], ctx: QuestContext) -> Self {
        let quests = rows
            .iter()
            .enumerate()
            .map(|(table_order, row)| {
                let quest = Quest {
                    table_order,
                    ..Quest::from_row(row)
                };
                (row.id.clone(), quest)
            })
            .collect();
        let mut book = Self { quests, ctx };
        book.check_and_auto_accept();
        book.refresh_progress();
        book
    }

    pub fn context(&self) -> &QuestContext {
        &self.ctx
    }

    /// Accept every untriggered quest whose trigger holds. Acceptance never
    /// changes the context, so one pass is enough. Returns the newly
    /// accepted ids.
    pub fn check_and_auto_accept(&mut self) -> Vec<String> {
        let mut accepted = Vec::new();
        for quest in self.quests.values_mut() {
            if quest.status == QuestStatus::NotTriggered && quest.trigger.is_met(&self.ctx) {
                quest.status = QuestStatus::Accepted;
                quest.completion.recompute(&self.ctx);
                accepted.push(quest.id.clone());
            }
        }
        accepted
    }

    /// Recompute progress for accepted and completed quests.
    pub fn refresh_progress(&mut self) {
        for quest in self.quests.values_mut() {
            if matches!(quest.status, QuestStatus::Accepted | QuestStatus::Completed) {
                quest.completion.recompute(&self.ctx);
            }
        }
    }

    /// Move an accepted quest to Completed if its target is reached.
    pub fn complete(&mut self, quest_id: &str) -> CompletionOutcome {
        let Some(quest) = self.quests.get_mut(quest_id) else {
            return CompletionOutcome::default();
        };
        if quest.status != QuestStatus::Accepted {
            return CompletionOutcome::default();
        }
        quest.completion.recompute(&self.ctx);
        if !quest.completion.is_met() {
            return CompletionOutcome::default();
        }

        quest.status = QuestStatus::Completed;
        let chapter_end = quest.chapter_end;
        self.ctx.completed_quests.insert(quest_id.to_string());
        self.check_and_auto_accept();
        CompletionOutcome {
            success: true,
            chapter_end,
        }
    }

    /// Hand out a completed quest's reward exactly once.
    pub fn claim_reward(&mut self, quest_id: &str) -> Option<QuestReward> {
        let quest = self.quests.get_mut(quest_id)?;
        if quest.status != QuestStatus::Completed {
            return None;
        }
        quest.status = QuestStatus::RewardClaimed;
        let reward = quest.reward.clone();
        if quest.next_quest_id.is_some() {
            self.check_and_auto_accept();
        }
        Some(reward)
    }

    pub fn get(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.get(quest_id)
    }

    pub fn quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values()
    }

    /// Accepted, completed and claimed quests by priority, then table order.
    pub fn visible_quests(&self) -> Vec<&Quest> {
        let mut visible: Vec<&Quest> = self.quests.values().filter(|q| q.is_visible()).collect();
        visible.sort_by_key(|q| (q.priority, q.table_order));
        visible
    }

    /// Refresh progress, then accept whatever the new context triggers.
    fn changed(&mut self) -> Vec<String> {
        self.refresh_progress();
        self.check_and_auto_accept()
    }

    pub fn record_exploration_completed(&mut self, point_id: &str) -> Vec<String> {
        *self
            .ctx
            .completed_explorations
            .entry(point_id.to_string())
            .or_default() += 1;
        self.changed()
    }

    pub fn record_monster_defeated(&mut self, template_id: &str) -> Vec<String> {
        *self
            .ctx
            .defeated_monsters
            .entry(template_id.to_string())
            .or_default() += 1;
        self.changed()
    }

    pub fn record_facility_built(&mut self, facility_id: &str) -> Vec<String> {
        *self
            .ctx
            .built_facilities
            .entry(facility_id.to_string())
            .or_default() += 1;
        self.changed()
    }

    pub fn update_round(&mut self, round: u32, day: u32) -> Vec<String> {
        self.ctx.round = round;
        self.ctx.day = day;
        self.changed()
    }

    pub fn update_shelter_level(&mut self, level: u32) -> Vec<String> {
        self.ctx.shelter_level = level;
        self.changed()
    }

    pub fn update_party(&mut self, party: &[Explorer]) -> Vec<String> {
        self.ctx.party = party.to_vec();
        self.changed()
    }
}
