//! Inventory distribution: routes loot deltas into party inventories.
//!
//! Positive deltas fill party members in party order: top up existing
//! stacks of the same id, then open new slots while capacity allows.
//! Whatever does not fit comes back as a remainder. Negative deltas
//! deduct from matching stacks in party order and never go below zero;
//! a shortfall is absorbed.

use serde::{Deserialize, Serialize};

use crate::party::Explorer;

/// An item or resource id with a signed quantity.
///
/// Negative quantities only appear as deduction requests in loot deltas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: i64,
}

impl ItemStack {
    pub fn new(item_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Items left on a map cell by an explorer who died there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathDrop {
    pub items: Vec<ItemStack>,
    pub death_round: u32,
    pub owner_id: String,
}

/// Distribute `deltas` across `party`; returns what could not be placed.
///
/// `max_stack` maps an id to its stack limit. Limits below 1 are treated
/// as 1.
pub fn distribute<F>(party: &mut [Explorer], deltas: &[ItemStack], max_stack: F) -> Vec<ItemStack>
where
    F: Fn(&str) -> i64,
{
    let mut remainder = Vec::new();

    for delta in deltas {
        if delta.quantity < 0 {
            let mut outstanding = delta.quantity.saturating_neg();
            for explorer in party.iter_mut() {
                outstanding = remove_from_inventory(explorer, &delta.item_id, outstanding);
                if outstanding == 0 {
                    break;
                }
            }
            continue;
        }

        let limit = max_stack(&delta.item_id);
        let mut pending = delta.clone();
        for explorer in party.iter_mut() {
            if pending.quantity <= 0 {
                break;
            }
            pending = add_to_inventory(explorer, pending, limit);
        }
        if pending.quantity > 0 {
            remainder.push(pending);
        }
    }

    remainder
}

/// Add `stack` to one explorer. Returns the part that did not fit.
pub fn add_to_inventory(explorer: &mut Explorer, mut stack: ItemStack, max_stack: i64) -> ItemStack {
    if stack.quantity <= 0 {
        return stack;
    }
    let max_stack = max_stack.max(1);

    for slot in explorer
        .inventory
        .iter_mut()
        .filter(|s| s.item_id == stack.item_id)
    {
        let room = (max_stack - slot.quantity).max(0);
        let add = room.min(stack.quantity);
        slot.quantity += add;
        stack.quantity -= add;
        if stack.quantity == 0 {
            return stack;
        }
    }

    while stack.quantity > 0 && explorer.inventory.len() < explorer.capacity {
        let add = max_stack.min(stack.quantity);
        explorer
            .inventory
            .push(ItemStack::new(stack.item_id.clone(), add));
        stack.quantity -= add;
    }

    stack
}

/// Remove up to `amount` of `item_id` from one explorer.
/// Returns the amount still outstanding. Emptied stacks are pruned.
pub fn remove_from_inventory(explorer: &mut Explorer, item_id: &str, amount: i64) -> i64 {
    let mut outstanding = amount.max(0);
    for slot in explorer
        .inventory
        .iter_mut()
        .filter(|s| s.item_id == item_id && s.quantity > 0)
    {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(slot.quantity);
        slot.quantity -= take;
        outstanding -= take;
    }
    explorer.inventory.retain(|s| s.quantity > 0);
    outstanding
}

/// Sum of `item_id` across every party inventory.
pub fn total_quantity(party: &[Explorer], item_id: &str) -> i64 {
    party
        .iter()
        .flat_map(|e| e.inventory.iter())
        .filter(|s| s.item_id == item_id)
        .map(|s| s.quantity)
        .sum()
}

/// Build the drop an explorer leaves behind: inventory plus one of each
/// equipped item. `None` when there is nothing to drop.
pub fn create_death_drop(explorer: &Explorer, round: u32) -> Option<DeathDrop> {
    let mut items: Vec<ItemStack> = explorer
        .inventory
        .iter()
        .filter(|s| s.quantity > 0)
        .cloned()
        .collect();
    items.extend(
        explorer
            .equipment
            .iter()
            .flatten()
            .map(|id| ItemStack::new(id.clone(), 1)),
    );
    if items.is_empty() {
        return None;
    }
    Some(DeathDrop {
        items,
        death_round: round,
        owner_id: explorer.id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explorer(id: &str, capacity: usize) -> Explorer {
        Explorer::bare(id, capacity)
    }

    fn sum(stacks: &[ItemStack]) -> i64 {
        stacks.iter().map(|s| s.quantity).sum()
    }

    #[test]
    fn test_overflow_returns_remainder() {
        let mut party = vec![explorer("a", 2)];
        let rest = distribute(&mut party, &[ItemStack::new("wood", 25)], |_| 10);
        assert_eq!(
            party[0].inventory,
            vec![ItemStack::new("wood", 10), ItemStack::new("wood", 10)]
        );
        assert_eq!(rest, vec![ItemStack::new("wood", 5)]);
    }

    #[test]
    fn test_tops_up_existing_stack_first() {
        let mut party = vec![explorer("a", 2)];
        party[0].inventory.push(ItemStack::new("wood", 7));
        let rest = distribute(&mut party, &[ItemStack::new("wood", 5)], |_| 10);
        assert!(rest.is_empty());
        assert_eq!(
            party[0].inventory,
            vec![ItemStack::new("wood", 10), ItemStack::new("wood", 2)]
        );
    }

    #[test]
    fn test_party_order_is_fill_order() {
        let mut party = vec![explorer("a", 1), explorer("b", 1)];
        let rest = distribute(&mut party, &[ItemStack::new("stone", 15)], |_| 10);
        assert!(rest.is_empty());
        assert_eq!(party[0].inventory, vec![ItemStack::new("stone", 10)]);
        assert_eq!(party[1].inventory, vec![ItemStack::new("stone", 5)]);
    }

    #[test]
    fn test_positive_quantities_conserved() {
        let deltas = vec![
            ItemStack::new("wood", 37),
            ItemStack::new("stone", 4),
            ItemStack::new("cloth", 19),
        ];
        let mut party = vec![explorer("a", 2), explorer("b", 1)];
        let rest = distribute(&mut party, &deltas, |id| if id == "wood" { 10 } else { 5 });
        let placed: i64 = party.iter().map(|e| sum(&e.inventory)).sum();
        assert_eq!(placed + sum(&rest), sum(&deltas));
    }

    #[test]
    fn test_negative_delta_spans_members() {
        let mut party = vec![explorer("a", 2), explorer("b", 2)];
        party[0].inventory.push(ItemStack::new("food", 3));
        party[1].inventory.push(ItemStack::new("food", 4));
        let rest = distribute(&mut party, &[ItemStack::new("food", -5)], |_| 10);
        assert!(rest.is_empty());
        assert!(party[0].inventory.is_empty());
        assert_eq!(party[1].inventory, vec![ItemStack::new("food", 2)]);
    }

    #[test]
    fn test_negative_shortfall_absorbed() {
        let mut party = vec![explorer("a", 2)];
        party[0].inventory.push(ItemStack::new("food", 2));
        party[0].inventory.push(ItemStack::new("wood", 1));
        let rest = distribute(&mut party, &[ItemStack::new("food", -9)], |_| 10);
        assert!(rest.is_empty());
        assert_eq!(party[0].inventory, vec![ItemStack::new("wood", 1)]);
        assert!(party[0].inventory.iter().all(|s| s.quantity >= 0));
    }

    #[test]
    fn test_extreme_deltas() {
        let mut party = vec![explorer("a", 1), explorer("b", 1)];
        party[0].inventory.push(ItemStack::new("w", 3));
        let rest = distribute(&mut party, &[ItemStack::new("w", i64::MIN)], |_| 10);
        assert!(rest.is_empty());
        assert!(party[0].inventory.is_empty());

        let rest = distribute(&mut party, &[ItemStack::new("w", i64::MAX)], |_| i64::MAX);
        assert!(rest.is_empty());
        assert_eq!(party[0].inventory, vec![ItemStack::new("w", i64::MAX)]);
        assert!(party[1].inventory.is_empty());
    }

    #[test]
    fn test_zero_max_stack_does_not_stall() {
        let mut party = vec![explorer("a", 2)];
        let rest = distribute(&mut party, &[ItemStack::new("odd", 3)], |_| 0);
        assert_eq!(party[0].inventory.len(), 2);
        assert_eq!(rest, vec![ItemStack::new("odd", 1)]);
    }

    #[test]
    fn test_total_quantity() {
        let mut party = vec![explorer("a", 2), explorer("b", 2)];
        party[0].inventory.push(ItemStack::new("wood", 3));
        party[1].inventory.push(ItemStack::new("wood", 4));
        party[1].inventory.push(ItemStack::new("stone", 1));
        assert_eq!(total_quantity(&party, "wood"), 7);
        assert_eq!(total_quantity(&party, "nails"), 0);
    }

    #[test]
    fn test_death_drop_includes_equipment() {
        let mut e = explorer("a", 2);
        e.inventory.push(ItemStack::new("wood", 3));
        e.equipment[1] = Some("crowbar".into());
        let drop = create_death_drop(&e, 12).unwrap();
        assert_eq!(drop.death_round, 12);
        assert_eq!(drop.owner_id, "a");
        assert_eq!(
            drop.items,
            vec![ItemStack::new("wood", 3), ItemStack::new("crowbar", 1)]
        );
    }

    #[test]
    fn test_death_drop_empty() {
        assert!(create_death_drop(&explorer("a", 2), 3).is_none());
    }
}
