//! Loot resolution with advanced-output conditions.
//!
//! A loot object lists the condition ids that can upgrade it. Each condition
//! row names a handler type; handlers live in a [`ConditionRegistry`] keyed by
//! that type tag, so new condition kinds are added by registering another
//! [`LootCondition`] implementation. The first satisfied condition switches
//! the object to its advanced output table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::ExplorationLayer;
use crate::constants::condition_types;
use crate::inventory::ItemStack;
use crate::parse::{parse_params, parse_stacks, split_list};
use crate::party::Explorer;
use crate::tables::{ConditionRow, LootRow};

/// What a condition handler may look at.
#[derive(Debug, Clone, Copy)]
pub struct LootContext<'a> {
    pub party: &'a [Explorer],
    pub board: &'a ExplorationLayer,
    /// Every loot template, for looking up other objects on the board.
    pub loot_catalog: &'a [LootRow],
}

/// Result of evaluating one condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub satisfied: bool,
    /// Party members responsible, for UI highlighting.
    pub related_explorer_ids: Vec<String>,
}

impl ConditionOutcome {
    pub fn unmet() -> Self {
        Self::default()
    }

    pub fn met(related_explorer_ids: Vec<String>) -> Self {
        Self {
            satisfied: true,
            related_explorer_ids,
        }
    }
}

/// One advanced-output condition kind.
pub trait LootCondition {
    fn evaluate(&self, condition: &ConditionRow, ctx: &LootContext<'_>) -> ConditionOutcome;

    /// Whole-board conditions skip the per-object category pre-check and
    /// filter categories themselves.
    fn inspects_whole_board(&self) -> bool {
        false
    }
}

/// `ExplorerTag=<tag>;MinCount=<n>`: at least `n` party members carry `tag`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplorerTagCount;

impl LootCondition for ExplorerTagCount {
    fn evaluate(&self, condition: &ConditionRow, ctx: &LootContext<'_>) -> ConditionOutcome {
        let params = parse_params(&condition.params);
        let tag = params.text("ExplorerTag");
        if tag.is_empty() {
            return ConditionOutcome::unmet();
        }
        let min_count = params.positive_or("MinCount", 1) as usize;

        let matching: Vec<String> = ctx
            .party
            .iter()
            .filter(|e| e.has_tag(tag))
            .map(|e| e.id.clone())
            .collect();

        if matching.len() >= min_count {
            ConditionOutcome::met(matching)
        } else {
            ConditionOutcome::unmet()
        }
    }
}

/// `MinCount=<n>`: some board column holds at least `n` loot objects that
/// list this condition and share a category with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnCluster;

impl LootCondition for ColumnCluster {
    fn evaluate(&self, condition: &ConditionRow, ctx: &LootContext<'_>) -> ConditionOutcome {
        let min_count = parse_params(&condition.params).positive_or("MinCount", 2) as usize;
        let wanted = condition.category_list();
        let catalog: HashMap<&str, &LootRow> = ctx
            .loot_catalog
            .iter()
            .map(|l| (l.id.as_str(), l))
            .collect();

        let mut per_column: BTreeMap<usize, usize> = BTreeMap::new();
        for cell in &ctx.board.cells {
            let Some(row) = cell.garbage.as_deref().and_then(|id| catalog.get(id)) else {
                continue;
            };
            if !row.condition_id_list().contains(&condition.id) {
                continue;
            }
            if !categories_overlap(&wanted, &row.category_list()) {
                continue;
            }
            *per_column.entry(cell.column()).or_default() += 1;
        }

        if per_column.values().any(|&n| n >= min_count) {
            ConditionOutcome::met(Vec::new())
        } else {
            ConditionOutcome::unmet()
        }
    }

    fn inspects_whole_board(&self) -> bool {
        true
    }
}

/// An empty condition category list applies to every category.
fn categories_overlap(condition: &[String], loot: &[String]) -> bool {
    condition.is_empty() || condition.iter().any(|c| loot.contains(c))
}

/// Handlers keyed by condition type tag.
pub struct ConditionRegistry {
    handlers: HashMap<String, Box<dyn LootCondition>>,
}

impl ConditionRegistry {
    /// A registry with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry with the built-in condition kinds.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(condition_types::EXPLORER_TAG_COUNT, ExplorerTagCount);
        registry.register(condition_types::COLUMN_CLUSTER, ColumnCluster);
        registry.register(condition_types::COLUMN_CLUSTER_LEGACY, ColumnCluster);
        registry
    }

    /// Add or replace the handler for `type_tag`.
    pub fn register(&mut self, type_tag: &str, handler: impl LootCondition + 'static) {
        self.handlers.insert(type_tag.to_string(), Box::new(handler));
    }

    pub fn get(&self, type_tag: &str) -> Option<&dyn LootCondition> {
        self.handlers.get(type_tag).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("ConditionRegistry")
            .field("handlers", &tags)
            .finish()
    }
}

/// Final output of searching one loot object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub stacks: Vec<ItemStack>,
    /// Whether the advanced table was used.
    pub advanced: bool,
    pub related_explorer_ids: Vec<String>,
    /// The condition that upgraded the output, if any.
    pub condition_id: Option<String>,
}

impl ResolvedOutput {
    fn base(loot: &LootRow) -> Self {
        Self {
            stacks: parse_stacks(&loot.base_output),
            advanced: false,
            related_explorer_ids: Vec::new(),
            condition_id: None,
        }
    }
}

/// Decide whether `loot` yields its base or advanced table.
///
/// Conditions are evaluated in `all_conditions` order; unknown handler types
/// and category mismatches are skipped. Has no side effects.
pub fn resolve_output(
    loot: &LootRow,
    all_conditions: &[ConditionRow],
    ctx: &LootContext<'_>,
    registry: &ConditionRegistry,
) -> ResolvedOutput {
    let wanted = split_list(&loot.condition_ids);
    let applicable: Vec<&ConditionRow> = all_conditions
        .iter()
        .filter(|c| wanted.contains(&c.id))
        .collect();
    if applicable.is_empty() {
        return ResolvedOutput::base(loot);
    }

    let loot_categories = loot.category_list();
    for condition in applicable {
        let Some(handler) = registry.get(&condition.condition_type) else {
            continue;
        };
        if !handler.inspects_whole_board()
            && !categories_overlap(&condition.category_list(), &loot_categories)
        {
            continue;
        }
        let outcome = handler.evaluate(condition, ctx);
        if !outcome.satisfied {
            continue;
        }

        let advanced = parse_stacks(&loot.advanced_output);
        if advanced.is_empty() {
            return ResolvedOutput::base(loot);
        }
        return ResolvedOutput {
            stacks: advanced,
            advanced: true,
            related_explorer_ids: outcome.related_explorer_ids,
            condition_id: Some(condition.id.clone()),
        };
    }

    ResolvedOutput::base(loot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::ExplorerRow;

    fn explorer(id: &str, tags: &str) -> Explorer {
        Explorer::from_config(&ExplorerRow {
            id: id.into(),
            max_hp: 10,
            identity_tags: tags.into(),
            ..Default::default()
        })
    }

    fn crate_loot(id: &str, categories: &str, conditions: &str) -> LootRow {
        LootRow {
            id: id.into(),
            base_output: "wood_2".into(),
            categories: categories.into(),
            condition_ids: conditions.into(),
            advanced_output: "wood_5|circuit_board_1".into(),
            ..Default::default()
        }
    }

    fn tag_condition(min: u32) -> ConditionRow {
        ConditionRow {
            id: "c_eng".into(),
            categories: "Machine".into(),
            condition_type: condition_types::EXPLORER_TAG_COUNT.into(),
            params: format!("ExplorerTag=Engineer;MinCount={}", min),
            ..Default::default()
        }
    }

    fn cluster_condition(min: u32) -> ConditionRow {
        ConditionRow {
            id: "c_col".into(),
            categories: "Wood".into(),
            condition_type: condition_types::COLUMN_CLUSTER.into(),
            params: format!("MinCount={}", min),
            ..Default::default()
        }
    }

    fn board_with(garbage: &[(usize, &str)]) -> ExplorationLayer {
        let mut layer = ExplorationLayer::empty(1);
        for &(index, id) in garbage {
            layer.cells[index].garbage = Some(id.to_string());
        }
        layer
    }

    #[test]
    fn test_no_conditions_returns_base() {
        let loot = crate_loot("g", "Machine", "");
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &[],
        };
        let out = resolve_output(&loot, &[tag_condition(1)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
        assert_eq!(out.stacks, vec![ItemStack::new("wood", 2)]);
    }

    #[test]
    fn test_tag_count_met_reports_matching_members() {
        let loot = crate_loot("g", "Machine|Metal", "c_eng");
        let party = vec![
            explorer("a", "Engineer"),
            explorer("b", "Medic"),
            explorer("c", "Soldier|Engineer"),
        ];
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &[],
        };
        let out = resolve_output(&loot, &[tag_condition(2)], &ctx, &ConditionRegistry::default());
        assert!(out.advanced);
        assert_eq!(out.related_explorer_ids, vec!["a", "c"]);
        assert_eq!(out.condition_id.as_deref(), Some("c_eng"));
        assert_eq!(out.stacks[1], ItemStack::new("circuit_board", 1));
    }

    #[test]
    fn test_tag_count_not_met() {
        let loot = crate_loot("g", "Machine", "c_eng");
        let party = vec![explorer("a", "Engineer")];
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &[],
        };
        let out = resolve_output(&loot, &[tag_condition(2)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
        assert!(out.related_explorer_ids.is_empty());
    }

    #[test]
    fn test_category_mismatch_skips_handler() {
        let loot = crate_loot("g", "Food", "c_eng");
        let party = vec![explorer("a", "Engineer")];
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &[],
        };
        let out = resolve_output(&loot, &[tag_condition(1)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
    }

    #[test]
    fn test_column_cluster_counts_whole_board() {
        // The searched object is not a Wood category, but the column check
        // looks at the board, not at it.
        let searched = crate_loot("g_box", "Metal", "c_col");
        let plank = crate_loot("g_plank", "Wood", "c_col");
        let catalog = vec![searched.clone(), plank];
        // column 2: indices 2, 8, 14
        let board = board_with(&[(2, "g_plank"), (8, "g_plank"), (15, "g_box")]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &catalog,
        };
        let out = resolve_output(&searched, &[cluster_condition(2)], &ctx, &ConditionRegistry::default());
        assert!(out.advanced);
        assert!(out.related_explorer_ids.is_empty());
    }

    #[test]
    fn test_column_cluster_legacy_tag_dispatches() {
        let plank = crate_loot("g_plank", "Wood", "c_col");
        let catalog = vec![plank.clone()];
        let board = board_with(&[(4, "g_plank"), (10, "g_plank")]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &catalog,
        };
        let mut legacy = cluster_condition(2);
        legacy.condition_type = condition_types::COLUMN_CLUSTER_LEGACY.into();
        let out = resolve_output(&plank, &[legacy], &ctx, &ConditionRegistry::default());
        assert!(out.advanced);
    }

    #[test]
    fn test_column_cluster_needs_same_column() {
        let plank = crate_loot("g_plank", "Wood", "c_col");
        let catalog = vec![plank.clone()];
        let board = board_with(&[(0, "g_plank"), (1, "g_plank"), (2, "g_plank")]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &catalog,
        };
        let out = resolve_output(&plank, &[cluster_condition(2)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
    }

    #[test]
    fn test_column_cluster_ignores_objects_without_condition() {
        let plank = crate_loot("g_plank", "Wood", "c_col");
        let plain = crate_loot("g_plain", "Wood", "");
        let catalog = vec![plank.clone(), plain];
        let board = board_with(&[(3, "g_plank"), (9, "g_plain")]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &catalog,
        };
        let out = resolve_output(&plank, &[cluster_condition(2)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
    }

    #[test]
    fn test_empty_advanced_table_falls_back() {
        let mut loot = crate_loot("g", "Machine", "c_eng");
        loot.advanced_output = String::new();
        let party = vec![explorer("a", "Engineer")];
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &[],
        };
        let out = resolve_output(&loot, &[tag_condition(1)], &ctx, &ConditionRegistry::default());
        assert!(!out.advanced);
        assert!(out.related_explorer_ids.is_empty());
        assert_eq!(out.stacks, vec![ItemStack::new("wood", 2)]);
    }

    #[test]
    fn test_unknown_type_is_skipped_and_custom_handler_registers() {
        struct Always;
        impl LootCondition for Always {
            fn evaluate(&self, _: &ConditionRow, _: &LootContext<'_>) -> ConditionOutcome {
                ConditionOutcome::met(vec!["narrator".into()])
            }
        }

        let loot = crate_loot("g", "Machine", "c_new");
        let condition = ConditionRow {
            id: "c_new".into(),
            condition_type: "Always".into(),
            ..Default::default()
        };
        let board = board_with(&[]);
        let ctx = LootContext {
            party: &[],
            board: &board,
            loot_catalog: &[],
        };

        let mut registry = ConditionRegistry::with_builtin();
        let out = resolve_output(&loot, &[condition.clone()], &ctx, &registry);
        assert!(!out.advanced);

        registry.register("Always", Always);
        assert_eq!(registry.len(), 4);
        let out = resolve_output(&loot, &[condition], &ctx, &registry);
        assert!(out.advanced);
        assert_eq!(out.related_explorer_ids, vec!["narrator"]);
    }

    #[test]
    fn test_first_satisfied_condition_wins() {
        let loot = crate_loot("g", "Machine|Wood", "c_eng|c_col");
        let party = vec![explorer("a", "Engineer")];
        let catalog = vec![loot.clone()];
        let board = board_with(&[(0, "g"), (6, "g")]);
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &catalog,
        };
        let conditions = vec![cluster_condition(2), tag_condition(1)];
        let out = resolve_output(&loot, &conditions, &ctx, &ConditionRegistry::default());
        assert_eq!(out.condition_id.as_deref(), Some("c_col"));
        assert!(out.related_explorer_ids.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let loot = crate_loot("g", "Machine", "c_eng");
        let party = vec![explorer("a", "Engineer")];
        let board = board_with(&[(4, "g")]);
        let catalog = vec![loot.clone()];
        let ctx = LootContext {
            party: &party,
            board: &board,
            loot_catalog: &catalog,
        };
        let registry = ConditionRegistry::default();
        let conditions = vec![tag_condition(1)];
        let first = resolve_output(&loot, &conditions, &ctx, &registry);
        let second = resolve_output(&loot, &conditions, &ctx, &registry);
        assert_eq!(first, second);
    }
}
