use postflop_cfr::cards::{mask_of, parse_board};
use postflop_cfr::cfr_engine::{CfrConfig, CfrEngine};
use postflop_cfr::game_tree::BettingConfig;
use postflop_cfr::ranges::{combos_from_range, Combo};
use postflop_cfr::SolverError;

fn serial_config() -> CfrConfig {
    CfrConfig {
        base_sample_size: 32,
        use_parallel: false,
        ..CfrConfig::default()
    }
}

fn betting(pot: f32, stack: f32, bets: Vec<f32>, raises: Vec<f32>) -> BettingConfig {
    BettingConfig {
        initial_pot: pot,
        oop_stack: stack,
        ip_stack: stack,
        flop_bet_sizes: bets.clone(),
        turn_bet_sizes: bets.clone(),
        river_bet_sizes: bets,
        flop_raise_sizes: raises.clone(),
        turn_raise_sizes: raises.clone(),
        river_raise_sizes: raises,
        max_raises: 3,
    }
}

fn river_engine(config: CfrConfig) -> CfrEngine {
    let board = parse_board("Ks7h2dQc9s").unwrap();
    let mask = mask_of(&board);
    let mut engine = CfrEngine::new(config);
    engine
        .build_tree(&betting(100.0, 100.0, vec![1.0], vec![1.0]), &board)
        .unwrap();
    engine.set_board(&board).unwrap();
    engine
        .set_oop_range(combos_from_range("JJ+,AKs,AQs", 1.0, mask).unwrap())
        .unwrap();
    engine
        .set_ip_range(combos_from_range("88-TT,KQs,AKo", 1.0, mask).unwrap())
        .unwrap();
    engine
}

#[test]
fn test_history_tracks_completed_iterations() {
    let mut engine = river_engine(serial_config());
    engine.solve(25).unwrap();
    assert_eq!(engine.get_regret_history().len(), 25);
}

#[test]
fn test_node_count_is_positive_after_build() {
    let engine = river_engine(serial_config());
    assert!(engine.get_node_count() > 1);
}

#[test]
fn test_solve_requires_setup() {
    let mut engine = CfrEngine::new(serial_config());
    assert!(matches!(engine.solve(1), Err(SolverError::TreeNotBuilt)));
}

#[test]
fn test_root_strategies_cover_range_labels() {
    let mut engine = river_engine(serial_config());
    engine.solve(40).unwrap();

    let strategies = engine.get_node_hand_strategies(0);
    assert!(!strategies.is_empty());
    // Sampling visits every OOP label over 40 iterations with high
    // probability; all labels come from the configured range.
    for hand in strategies.keys() {
        assert!(
            ["JJ", "QQ", "KK", "AA", "AKs", "AQs"].contains(&hand.as_str()),
            "unexpected label {}",
            hand
        );
    }
    let root = engine.get_node_data(0).unwrap();
    for freqs in strategies.values() {
        assert_eq!(freqs.len(), root.actions.len());
    }
}

#[test]
fn test_node_data_round_trip() {
    let engine = river_engine(serial_config());
    let root = engine.get_node_data(0).unwrap();
    assert_eq!(root.id, 0);
    assert_eq!(root.node_type, "player");
    assert_eq!(root.street, "river");
    assert_eq!(root.pot, 100.0);
    assert_eq!(root.stacks, [100.0, 100.0]);
    assert!(!root.actions.is_empty());
    assert_eq!(root.actions.len(), root.child_ids.len());

    // Children resolve to valid records.
    for &child in &root.child_ids {
        assert!(engine.get_node_data(child).is_some());
    }
    assert!(engine.get_node_data(engine.get_node_count() as u32).is_none());
}

#[test]
fn test_progress_callback_cadence() {
    let mut engine = river_engine(serial_config());
    let mut calls = Vec::new();
    engine
        .solve_with_progress(23, |done, total| calls.push((done, total)))
        .unwrap();
    assert_eq!(calls, vec![(10, 23), (20, 23), (23, 23)]);
}

#[test]
fn test_stop_from_progress_callback() {
    let mut engine = river_engine(serial_config());
    let handle = engine.stop_handle();
    engine
        .solve_with_progress(500, move |_, _| handle.stop())
        .unwrap();
    let done = engine.get_regret_history().len();
    assert!(done >= 10 && done <= 11, "stopped after {} iterations", done);
}

#[test]
fn test_parallel_solve_matches_serial_shape() {
    let mut engine = river_engine(CfrConfig {
        base_sample_size: 32,
        use_parallel: true,
        num_threads: 2,
        ..CfrConfig::default()
    });
    engine.solve(10).unwrap();
    assert_eq!(engine.get_regret_history().len(), 10);
    assert!(engine.get_average_regret().is_finite());
}

#[test]
fn test_ranges_replaceable_between_solves() {
    let mut engine = river_engine(serial_config());
    engine.solve(5).unwrap();

    let mask = mask_of(&parse_board("Ks7h2dQc9s").unwrap());
    engine
        .set_oop_range(combos_from_range("AA", 1.0, mask).unwrap())
        .unwrap();
    engine.solve(5).unwrap();
    assert_eq!(engine.get_regret_history().len(), 5);
}

#[test]
fn test_single_combo_showdown_lock() {
    // Straight flush vs aces on a locked board: a degenerate but legal solve.
    let board = parse_board("AsKsQsJsTs").unwrap();
    let mut engine = CfrEngine::new(serial_config());
    engine
        .build_tree(&betting(100.0, 0.0, vec![], vec![]), &board)
        .unwrap();
    engine.set_board(&board).unwrap();
    engine
        .set_oop_range(vec![Combo::new(
            [
                parse_board("9s").unwrap()[0],
                parse_board("8s").unwrap()[0],
            ],
            1.0,
        )])
        .unwrap();
    engine
        .set_ip_range(vec![Combo::new(
            [
                parse_board("Ad").unwrap()[0],
                parse_board("Ac").unwrap()[0],
            ],
            1.0,
        )])
        .unwrap();

    engine.solve(10).unwrap();
    assert_eq!(engine.get_regret_history().len(), 10);
    // One checked-down line: the root strategy is the forced check.
    let strategies = engine.get_node_hand_strategies(0);
    for freqs in strategies.values() {
        assert_eq!(freqs.len(), 1);
    }
    // With a single action everywhere there is nothing to regret.
    assert!(engine.get_average_regret().abs() < 1e-6);
}

// On any well-formed solve the time-averaged convergence metric trends down.
#[test]
fn test_convergence_trend() {
    let mut engine = river_engine(serial_config());
    engine.solve(200).unwrap();

    let history = engine.get_regret_history();
    assert_eq!(history.len(), 200);
    let head: f32 = history[..20].iter().sum::<f32>() / 20.0;
    let tail: f32 = history[180..].iter().sum::<f32>() / 20.0;
    assert!(
        tail < head,
        "expected decay: first 10% avg {} vs last 10% avg {}",
        head,
        tail
    );
}

#[test]
fn test_river_rank_cache_exposed() {
    let mut engine = river_engine(serial_config());
    assert!(engine.river_ranks(0).is_empty());
    engine.solve(1).unwrap();
    assert_eq!(engine.river_ranks(0).len(), engine.oop_combo_count());
    assert_eq!(engine.river_ranks(1).len(), engine.ip_combo_count());
}
