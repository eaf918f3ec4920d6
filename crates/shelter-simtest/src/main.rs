//! Shelter Headless Simulation Harness
//!
//! Validates the rule engines and the bundled data tables without a UI.
//! Runs entirely in-process: load tables, sweep each engine, then play one
//! scripted session end to end.
//!
//! Usage:
//!   cargo run -p shelter-simtest
//!   cargo run -p shelter-simtest -- --verbose
//!   cargo run -p shelter-simtest -- --data path/to/tables
//!   RUST_LOG=debug cargo run -p shelter-simtest

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shelter_core::config::{
    load_config_dir, load_options, SessionOptions, OPTIONAL_TABLES, REQUIRED_TABLES,
};
use shelter_core::session::{Battlefield, CombatResolver, Session};
use shelter_logic::board::{generate_layer, parse_spawn_entries, LayerInput, SpawnKind};
use shelter_logic::constants::BOARD_CELLS;
use shelter_logic::grid::GridMap;
use shelter_logic::inventory::{distribute, ItemStack};
use shelter_logic::loot::{resolve_output, ConditionRegistry, LootContext};
use shelter_logic::party::{Explorer, MonsterIdAllocator};
use shelter_logic::tables::ConfigBundle;

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let data_dir = args
        .iter()
        .position(|a| a == "--data")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    println!("=== Shelter Simulation Harness ===\n");
    println!("Data: {}\n", data_dir.display());

    let bundle = match load_config_dir(&data_dir) {
        Ok(b) => b,
        Err(e) => {
            println!("  ✗ config_load: {}", e);
            std::process::exit(1);
        }
    };
    let options = match load_options(data_dir.join("options.json")) {
        Ok(o) => o,
        Err(e) => {
            log::warn!("Using default session options: {}", e);
            SessionOptions::default()
        }
    };

    let mut results = Vec::new();

    // 1. Table cross-references
    results.extend(validate_tables(&data_dir, &bundle, verbose));

    // 2. Reachability on the data map
    results.extend(validate_pathfinding(&bundle, verbose));

    // 3. Board generation sweep
    results.extend(validate_board_generation(&bundle, verbose));

    // 4. Loot resolution
    results.extend(validate_loot(&bundle, verbose));

    // 5. Inventory distribution
    results.extend(validate_distribution(&bundle, verbose));

    // 6. Scripted session
    results.extend(validate_session(&bundle, &options, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Tables ───────────────────────────────────────────────────────────

fn validate_tables(data_dir: &Path, bundle: &ConfigBundle, verbose: bool) -> Vec<TestResult> {
    println!("--- Config Tables ---");
    let mut results = Vec::new();

    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .chain(OPTIONAL_TABLES.iter())
        .copied()
        .filter(|file| !data_dir.join(file).exists())
        .collect();
    results.push(TestResult {
        name: "tables_files_present".into(),
        passed: missing.is_empty(),
        detail: if missing.is_empty() {
            format!("{} table files", REQUIRED_TABLES.len() + OPTIONAL_TABLES.len())
        } else {
            format!("missing {:?}", missing)
        },
    });

    results.push(TestResult {
        name: "tables_not_empty".into(),
        passed: !bundle.explorers.is_empty()
            && !bundle.map_cells.is_empty()
            && !bundle.exploration_points.is_empty(),
        detail: format!(
            "{} explorers, {} cells, {} points, {} loot, {} quests, {} chapters",
            bundle.explorers.len(),
            bundle.map_cells.len(),
            bundle.exploration_points.len(),
            bundle.loot_objects.len(),
            bundle.quests.len(),
            bundle.chapters.len()
        ),
    });

    // Garbage spawns must name real loot objects. Monster entries may point
    // at nothing on purpose: a miss falls through to the garbage draw.
    let mut unknown_garbage = Vec::new();
    let mut unknown_monsters = Vec::new();
    for point in &bundle.exploration_points {
        for entry in parse_spawn_entries(&point.spawn_table) {
            match entry.kind {
                SpawnKind::Garbage if bundle.loot(&entry.id).is_none() => {
                    unknown_garbage.push(format!("{}:{}", point.id, entry.id))
                }
                SpawnKind::Monster if bundle.monster(&entry.id).is_none() => {
                    unknown_monsters.push(format!("{}:{}", point.id, entry.id))
                }
                _ => {}
            }
        }
    }
    if verbose && !unknown_monsters.is_empty() {
        println!("  Monster fall-through entries: {:?}", unknown_monsters);
    }
    results.push(TestResult {
        name: "tables_spawn_garbage_known".into(),
        passed: unknown_garbage.is_empty(),
        detail: if unknown_garbage.is_empty() {
            "every garbage spawn has a loot row".into()
        } else {
            format!("unknown: {:?}", unknown_garbage)
        },
    });

    let condition_ids: HashSet<&str> = bundle
        .loot_conditions
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    let dangling: Vec<String> = bundle
        .loot_objects
        .iter()
        .flat_map(|l| {
            l.condition_id_list()
                .into_iter()
                .filter(|id| !condition_ids.contains(id.as_str()))
                .map(move |id| format!("{}:{}", l.id, id))
        })
        .collect();
    results.push(TestResult {
        name: "tables_loot_conditions_known".into(),
        passed: dangling.is_empty(),
        detail: format!("{} dangling condition refs", dangling.len()),
    });

    let registry = ConditionRegistry::with_builtin();
    let unhandled: Vec<&str> = bundle
        .loot_conditions
        .iter()
        .filter(|c| registry.get(&c.condition_type).is_none())
        .map(|c| c.id.as_str())
        .collect();
    results.push(TestResult {
        name: "tables_condition_types_registered".into(),
        passed: unhandled.is_empty(),
        detail: format!("{} conditions without handler {:?}", unhandled.len(), unhandled),
    });

    let mut numbers: Vec<u32> = bundle.chapters.iter().map(|c| c.number).collect();
    numbers.sort_unstable();
    let contiguous = numbers.iter().enumerate().all(|(i, &n)| n == i as u32 + 1);
    results.push(TestResult {
        name: "tables_chapters_contiguous".into(),
        passed: contiguous,
        detail: format!("chapter numbers {:?}", numbers),
    });

    results
}

// ── 2. Pathfinding ──────────────────────────────────────────────────────

fn validate_pathfinding(bundle: &ConfigBundle, verbose: bool) -> Vec<TestResult> {
    println!("--- Pathfinding ---");
    let mut results = Vec::new();
    let mut map = GridMap::from_rows(&bundle.map_cells);

    let Some(shelter) = map.shelter() else {
        results.push(TestResult {
            name: "path_shelter_exists".into(),
            passed: false,
            detail: "no shelter cell".into(),
        });
        return results;
    };

    for point in &bundle.exploration_points {
        let name = format!("path_reach_{}", point.id);
        let Some(target) = map.point_position(&point.id) else {
            results.push(TestResult {
                name,
                passed: false,
                detail: "point not on map".into(),
            });
            continue;
        };
        let path = map.find_path(shelter, target);
        if verbose {
            if let Some(p) = &path {
                println!("  {} via {:?}", point.id, p);
            }
        }
        results.push(TestResult {
            name,
            passed: path.as_ref().is_some_and(|p| p.last() == Some(&target)),
            detail: path.map_or(String::from("unreachable"), |p| format!("{} steps", p.len())),
        });
    }

    let cached = map.cache_size();
    let targets: Vec<_> = bundle
        .exploration_points
        .iter()
        .filter_map(|p| map.point_position(&p.id))
        .collect();
    let again = targets
        .into_iter()
        .all(|t| map.find_path(shelter, t).is_some());
    results.push(TestResult {
        name: "path_cache_consistent".into(),
        passed: again && map.cache_size() == cached,
        detail: format!("{} cached routes", cached),
    });

    results
}

// ── 3. Board generation ─────────────────────────────────────────────────

fn validate_board_generation(bundle: &ConfigBundle, verbose: bool) -> Vec<TestResult> {
    println!("--- Board Generation ---");
    let mut results = Vec::new();
    let party: Vec<String> = bundle.explorers.iter().take(3).map(|e| e.id.clone()).collect();
    let mut ids = MonsterIdAllocator::new();
    let mut seen = HashSet::new();

    let mut layers = 0;
    let mut violations = Vec::new();
    for point in &bundle.exploration_points {
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let generated = generate_layer(
                &LayerInput {
                    point,
                    explorers: &party,
                    monsters: &bundle.monsters,
                    loot: &bundle.loot_objects,
                    layer_index: 1,
                },
                &mut ids,
                &mut rng,
            );
            layers += 1;
            let layer = &generated.layer;

            if layer.cells.len() != BOARD_CELLS || layer.occupant_count() > BOARD_CELLS {
                violations.push(format!("{} seed {}: bad size", point.id, seed));
            }
            for cell in &layer.cells {
                let kinds = [
                    cell.explorer.is_some(),
                    cell.monster.is_some(),
                    cell.garbage.is_some(),
                ];
                if kinds.iter().filter(|k| **k).count() > 1 {
                    violations.push(format!("{} seed {}: cell {} doubled", point.id, seed, cell.index));
                }
            }
            if party.iter().any(|id| layer.explorer_cell(id).is_none()) {
                violations.push(format!("{} seed {}: explorer missing", point.id, seed));
            }
            for monster in &generated.monsters {
                if !seen.insert(monster.id.clone()) {
                    violations.push(format!("duplicate monster id {}", monster.id));
                }
            }
        }
    }

    if verbose {
        println!(
            "  {} layers generated, {} monsters issued",
            layers,
            ids.issued()
        );
    }
    results.push(TestResult {
        name: "board_invariants".into(),
        passed: violations.is_empty(),
        detail: if violations.is_empty() {
            format!("{} layers clean", layers)
        } else {
            format!("{} violations, first: {}", violations.len(), violations[0])
        },
    });

    results
}

// ── 4. Loot ─────────────────────────────────────────────────────────────

fn validate_loot(bundle: &ConfigBundle, verbose: bool) -> Vec<TestResult> {
    println!("--- Loot Resolution ---");
    let mut results = Vec::new();
    let registry = ConditionRegistry::with_builtin();
    let everyone: Vec<Explorer> = bundle.explorers.iter().map(Explorer::from_config).collect();
    let board = shelter_logic::board::ExplorationLayer::empty(1);

    let mut upgraded = 0;
    let mut stable = true;
    for loot in &bundle.loot_objects {
        let ctx = LootContext {
            party: &everyone,
            board: &board,
            loot_catalog: &bundle.loot_objects,
        };
        let first = resolve_output(loot, &bundle.loot_conditions, &ctx, &registry);
        let second = resolve_output(loot, &bundle.loot_conditions, &ctx, &registry);
        stable &= first == second;
        if first.advanced {
            upgraded += 1;
        }
        if verbose {
            println!(
                "  {:18} advanced={} related={:?}",
                loot.id, first.advanced, first.related_explorer_ids
            );
        }
    }
    results.push(TestResult {
        name: "loot_idempotent".into(),
        passed: stable,
        detail: "repeated resolution gives the same output".into(),
    });
    results.push(TestResult {
        name: "loot_full_roster_upgrades".into(),
        passed: upgraded > 0,
        detail: format!("{} loot objects upgraded with the whole roster", upgraded),
    });

    let nobody = resolve_all_base(bundle, &registry, &board);
    results.push(TestResult {
        name: "loot_empty_party_base_only".into(),
        passed: nobody,
        detail: "no tag conditions fire without a party".into(),
    });

    results
}

fn resolve_all_base(
    bundle: &ConfigBundle,
    registry: &ConditionRegistry,
    board: &shelter_logic::board::ExplorationLayer,
) -> bool {
    let ctx = LootContext {
        party: &[],
        board,
        loot_catalog: &bundle.loot_objects,
    };
    bundle
        .loot_objects
        .iter()
        .all(|loot| !resolve_output(loot, &bundle.loot_conditions, &ctx, registry).advanced)
}

// ── 5. Distribution ─────────────────────────────────────────────────────

fn validate_distribution(bundle: &ConfigBundle, _verbose: bool) -> Vec<TestResult> {
    println!("--- Inventory Distribution ---");
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(99);
    let ids: Vec<&str> = bundle.resources.iter().map(|r| r.id.as_str()).collect();
    if ids.is_empty() {
        return results;
    }

    let mut conserved = true;
    let mut non_negative = true;
    for _ in 0..200 {
        let mut party: Vec<Explorer> = bundle.explorers.iter().map(Explorer::from_config).collect();
        let deltas: Vec<ItemStack> = (0..rng.gen_range(1..6))
            .map(|_| ItemStack::new(ids[rng.gen_range(0..ids.len())], rng.gen_range(1..60)))
            .collect();
        let requested: i64 = deltas.iter().map(|d| d.quantity).sum();
        let rest = distribute(&mut party, &deltas, |id| bundle.max_stack_or_default(id));
        let placed: i64 = party
            .iter()
            .flat_map(|e| e.inventory.iter())
            .map(|s| s.quantity)
            .sum();
        let remainder: i64 = rest.iter().map(|s| s.quantity).sum();
        conserved &= placed + remainder == requested;

        let take = ItemStack::new(ids[0], -rng.gen_range(1..100));
        distribute(&mut party, &[take], |id| bundle.max_stack_or_default(id));
        non_negative &= party
            .iter()
            .flat_map(|e| e.inventory.iter())
            .all(|s| s.quantity > 0);
    }

    results.push(TestResult {
        name: "distribute_conserves".into(),
        passed: conserved,
        detail: "placed + remainder == requested over 200 random loads".into(),
    });
    results.push(TestResult {
        name: "distribute_never_negative".into(),
        passed: non_negative,
        detail: "deductions prune instead of going negative".into(),
    });

    results
}

// ── 6. Scripted session ─────────────────────────────────────────────────

/// Explorers strike the weakest monster, monsters strike the first explorer.
struct SkirmishCombat {
    exchanges: u32,
}

impl CombatResolver for SkirmishCombat {
    fn resolve(&mut self, mut field: Battlefield) -> Battlefield {
        for _ in 0..self.exchanges {
            for explorer in field.party.iter().filter(|e| e.is_alive()) {
                if let Some(target) = field
                    .monsters
                    .iter_mut()
                    .filter(|m| m.is_alive())
                    .min_by_key(|m| m.hp)
                {
                    target.take_damage(explorer.attack.max(1));
                }
            }
            let incoming: u32 = field
                .monsters
                .iter()
                .filter(|m| m.is_alive())
                .map(|m| m.attack)
                .sum();
            if let Some(front) = field.party.iter_mut().find(|e| e.is_alive()) {
                front.take_damage(incoming);
            }
        }
        field
    }
}

fn validate_session(
    bundle: &ConfigBundle,
    options: &SessionOptions,
    verbose: bool,
) -> Vec<TestResult> {
    println!("--- Scripted Session ---");
    let mut results = Vec::new();
    let mut session = Session::new(bundle.clone(), options.clone());
    let party: Vec<String> = bundle.explorers.iter().take(3).map(|e| e.id.clone()).collect();

    results.push(TestResult {
        name: "session_start".into(),
        passed: session.start_expedition(&party),
        detail: format!("party {:?}", party),
    });

    let Some(target) = session.map().point_position("old_mall") else {
        results.push(TestResult {
            name: "session_target".into(),
            passed: false,
            detail: "old_mall not on map".into(),
        });
        return results;
    };
    let steps = session.request_path(target);

    let mut arrived = false;
    for _ in 0..steps.unwrap_or(0) {
        arrived |= session.advance_round().layer_generated.is_some();
    }
    results.push(TestResult {
        name: "session_arrival".into(),
        passed: arrived,
        detail: format!("{:?} steps, round {}", steps, session.round()),
    });

    let mut searched = 0;
    let mut layers = 0;
    let mut combat = SkirmishCombat { exchanges: 6 };
    while layers < 16 && session.expedition().is_some_and(|e| e.is_exploring()) {
        layers += 1;
        if let Some(report) = session.apply_combat(&mut combat) {
            if verbose {
                println!(
                    "  layer {}: {} defeated, fallen {:?}",
                    layers,
                    report.defeated.len(),
                    report.fallen
                );
            }
            if report.party_wiped {
                break;
            }
        }
        let loot_cells: Vec<usize> = session
            .expedition()
            .and_then(|e| e.layer.as_ref())
            .map(|l| {
                l.cells
                    .iter()
                    .filter(|c| c.garbage.is_some())
                    .map(|c| c.index)
                    .collect()
            })
            .unwrap_or_default();
        for index in loot_cells {
            if session.search_loot(index).is_some() {
                searched += 1;
            }
        }
        session.retrieve_holding();
        session.descend();
        session.advance_round();
    }
    results.push(TestResult {
        name: "session_explore".into(),
        passed: layers > 0,
        detail: format!("{} layers, {} loot objects searched", layers, searched),
    });

    let unloaded = session.return_to_shelter().unwrap_or_default();
    if verbose {
        println!("  unloaded {:?}", unloaded);
        for quest in session.quests().visible_quests() {
            println!(
                "  quest {:16} {:?} {}/{}",
                quest.id,
                quest.status,
                quest.completion.current_value,
                quest.completion.target_value
            );
        }
    }
    results.push(TestResult {
        name: "session_return".into(),
        passed: session.expedition().is_none(),
        detail: format!("{} stacks into storage", unloaded.len()),
    });

    let mall_done = session
        .quests()
        .context()
        .completed_explorations
        .contains_key("old_mall");
    let completion = session.complete_quest("q_clear_mall");
    results.push(TestResult {
        name: "session_chain_gated".into(),
        passed: !completion.success,
        detail: format!("mall explored={}, chain quest still waits on q_scavenge", mall_done),
    });

    session.set_shelter_level(2);
    session.build_facility("workbench");
    let workbench = session.complete_quest("q_workbench").success
        && session.claim_quest_reward("q_workbench").is_some()
        && session.claim_quest_reward("q_workbench").is_none();
    results.push(TestResult {
        name: "session_facility_quest".into(),
        passed: workbench,
        detail: format!("circuit boards in storage: {}", session.stored("circuit_board")),
    });

    let mut buffer = Vec::new();
    let snapshot = session
        .save(&mut buffer)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            Session::load(bundle.clone(), options.clone(), &buffer[..]).map_err(|e| e.to_string())
        });
    results.push(match snapshot {
        Ok(loaded) => TestResult {
            name: "session_snapshot".into(),
            passed: loaded.round() == session.round() && loaded.storage() == session.storage(),
            detail: format!("{} bytes", buffer.len()),
        },
        Err(e) => TestResult {
            name: "session_snapshot".into(),
            passed: false,
            detail: e,
        },
    });

    results
}
