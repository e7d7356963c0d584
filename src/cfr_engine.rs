//! External-sampling Monte-Carlo CFR with discounted reweighting.
//!
//! Each iteration runs a batch of independent traversals per traverser. The
//! traverser explores all of its own actions; opponent and chance moves are
//! sampled. Regrets and cumulative strategy live in per-node tables keyed by
//! opaque combo index, created lazily on first visit, and guarded by a fixed
//! pool of shard mutexes (`node_id % 2048`) so lock memory stays O(1) in the
//! node count.
//!
//! Every two iterations a discount pass rescales the tables: negative regret
//! is halved, positive regret is scaled by `t^α / (t^α + 1)` and cumulative
//! strategy by `t^γ / (t^γ + 1)` — CFR+ style damping of losses combined
//! with DCFR attenuation of wins.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;

use crate::cards::{card_to_string, mask_has_card, validate_board, Card, CardMask, DECK_SIZE};
use crate::equity::calculate_equity;
use crate::error::{SolverError, SolverResult};
use crate::game_tree::{BettingConfig, GameTreeBuilder, Node, NodeKind, TreeDataPool};
use crate::hand_evaluator::{evaluate, HandRank};
use crate::ranges::Combo;

/// Fixed shard-lock pool size.
const NUM_SHARDS: usize = 2048;

/// Monte-Carlo trials at pre-river all-in terminals. Deep leaves are visited
/// constantly, so precision is traded for speed here.
const PRE_RIVER_EQUITY_TRIALS: usize = 50;

/// Pots below this are fold terminals.
const POT_EPSILON: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct CfrConfig {
    /// Positive-regret discount exponent.
    pub alpha: f32,
    /// Reserved; the discount schedule does not consult it.
    pub beta: f32,
    /// Cumulative-strategy discount exponent.
    pub gamma: f32,
    /// Independent traversals per (iteration, traverser) pair.
    pub base_sample_size: usize,
    pub use_parallel: bool,
    /// 0 = use the global rayon pool.
    pub num_threads: usize,
}

impl Default for CfrConfig {
    fn default() -> CfrConfig {
        CfrConfig {
            alpha: 1.5,
            beta: 0.0,
            gamma: 2.0,
            base_sample_size: 64,
            use_parallel: true,
            num_threads: 0,
        }
    }
}

/// Lazily populated regret and strategy accumulators for one node, keyed by
/// the acting player's combo index.
#[derive(Default)]
pub struct NodeRegrets {
    pub regrets: HashMap<usize, Vec<f32>>,
    pub cumulative_strategy: HashMap<usize, Vec<f32>>,
}

/// Regret slots parallel to the node pool, guarded by `NUM_SHARDS` mutexes.
///
/// Slots are only touched while holding the shard lock for their node id, or
/// through `&mut self`; that invariant is what makes the `Sync` impl sound.
struct RegretTable {
    slots: Vec<UnsafeCell<NodeRegrets>>,
    locks: Vec<Mutex<()>>,
}

unsafe impl Sync for RegretTable {}

impl RegretTable {
    fn new(num_nodes: usize) -> RegretTable {
        RegretTable {
            slots: (0..num_nodes)
                .map(|_| UnsafeCell::new(NodeRegrets::default()))
                .collect(),
            locks: (0..NUM_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn lock(&self, node_id: u32) -> MutexGuard<'_, ()> {
        self.locks[node_id as usize % NUM_SHARDS]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Safety: the caller must hold the shard lock for `node_id`.
    unsafe fn slot_ref(&self, node_id: u32) -> &NodeRegrets {
        &*self.slots[node_id as usize].get()
    }

    /// Safety: the caller must hold the shard lock for `node_id`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot(&self, node_id: u32) -> &mut NodeRegrets {
        &mut *self.slots[node_id as usize].get()
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut NodeRegrets> {
        self.slots.iter_mut().map(UnsafeCell::get_mut)
    }
}

/// Cancellation handle; clone it out of the engine to request a stop from
/// another thread while `solve` is running.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Flat read-back record of one node, for inspection and JSON dumps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeData {
    pub id: u32,
    pub node_type: &'static str,
    pub player: i8,
    pub street: &'static str,
    pub pot: f32,
    pub stacks: [f32; 2],
    pub to_call: f32,
    pub actions: Vec<String>,
    pub child_ids: Vec<u32>,
    pub board: Vec<String>,
    pub chance_cards: Vec<String>,
    pub chance_child_ids: Vec<u32>,
}

pub struct CfrEngine {
    config: CfrConfig,
    pool: TreeDataPool,
    root_id: u32,
    oop_combos: Vec<Combo>,
    ip_combos: Vec<Combo>,
    initial_board: Vec<Card>,
    initial_board_mask: CardMask,
    regrets: RegretTable,
    iteration_regrets: Vec<f32>,
    should_stop: Arc<AtomicBool>,
    thread_pool: Option<rayon::ThreadPool>,
    oop_river_ranks: Vec<HandRank>,
    ip_river_ranks: Vec<HandRank>,
    river_ranks_ready: bool,
}

impl CfrEngine {
    pub fn new(config: CfrConfig) -> CfrEngine {
        let thread_pool = if config.num_threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .build()
                .ok()
        } else {
            None
        };
        CfrEngine {
            config,
            pool: TreeDataPool::default(),
            root_id: 0,
            oop_combos: Vec::new(),
            ip_combos: Vec::new(),
            initial_board: Vec::new(),
            initial_board_mask: 0,
            regrets: RegretTable::new(0),
            iteration_regrets: Vec::new(),
            should_stop: Arc::new(AtomicBool::new(false)),
            thread_pool,
            oop_river_ranks: Vec::new(),
            ip_river_ranks: Vec::new(),
            river_ranks_ready: false,
        }
    }

    /// Build the betting tree for `board` and reset the regret tables to
    /// match the new node count.
    pub fn build_tree(&mut self, betting: &BettingConfig, board: &[Card]) -> SolverResult<()> {
        let pool = GameTreeBuilder::new(betting.clone()).build_tree(board)?;
        self.regrets = RegretTable::new(pool.nodes.len());
        self.pool = pool;
        self.root_id = 0;
        self.iteration_regrets.clear();
        Ok(())
    }

    pub fn set_oop_range(&mut self, combos: Vec<Combo>) -> SolverResult<()> {
        Self::validate_combos(&combos, "OOP")?;
        self.oop_combos = combos;
        self.river_ranks_ready = false;
        Ok(())
    }

    pub fn set_ip_range(&mut self, combos: Vec<Combo>) -> SolverResult<()> {
        Self::validate_combos(&combos, "IP")?;
        self.ip_combos = combos;
        self.river_ranks_ready = false;
        Ok(())
    }

    /// Set the initial public board; recomputes the dead-card mask and
    /// invalidates the river-rank cache.
    pub fn set_board(&mut self, board: &[Card]) -> SolverResult<()> {
        self.initial_board_mask = validate_board(board)?;
        self.initial_board = board.to_vec();
        self.river_ranks_ready = false;
        Ok(())
    }

    fn validate_combos(combos: &[Combo], side: &'static str) -> SolverResult<()> {
        if combos.is_empty() {
            return Err(SolverError::EmptyRange(side));
        }
        for combo in combos {
            for &c in &combo.cards {
                if c >= DECK_SIZE {
                    return Err(SolverError::InvalidCard(c));
                }
            }
            if combo.cards[0] == combo.cards[1] {
                return Err(SolverError::DuplicateCard(card_to_string(combo.cards[0])));
            }
        }
        Ok(())
    }

    /// Run `iterations` outer iterations without progress reporting.
    pub fn solve(&mut self, iterations: usize) -> SolverResult<()> {
        self.solve_with_progress(iterations, |_, _| {})
    }

    /// Run `iterations` outer iterations, invoking `progress(done, total)`
    /// every ten iterations and at the end. Cancellation via [`StopHandle`]
    /// is polled between iterations; partial results remain valid.
    pub fn solve_with_progress<F>(&mut self, iterations: usize, mut progress: F) -> SolverResult<()>
    where
        F: FnMut(usize, usize),
    {
        if self.pool.nodes.is_empty() {
            return Err(SolverError::TreeNotBuilt);
        }
        if self.oop_combos.is_empty() {
            return Err(SolverError::EmptyRange("OOP"));
        }
        if self.ip_combos.is_empty() {
            return Err(SolverError::EmptyRange("IP"));
        }

        self.iteration_regrets.clear();
        self.iteration_regrets.reserve(iterations);
        self.should_stop.store(false, Ordering::SeqCst);
        self.precompute_river_ranks();

        for t in 1..=iterations {
            if self.should_stop.load(Ordering::SeqCst) {
                break;
            }
            self.run_iteration(t);
            if t % 2 == 0 {
                self.apply_discount(t);
            }
            if t % 10 == 0 || t == iterations {
                progress(t, iterations);
            }
        }
        Ok(())
    }

    /// Request cancellation; the current iteration finishes first.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.should_stop))
    }

    /// Exact river ranks per combo, filled at solve start when the board is
    /// complete. The terminal path re-evaluates instead of consulting this
    /// cache; it is exposed for inspection.
    pub fn river_ranks(&self, player: usize) -> &[HandRank] {
        if player == 0 {
            &self.oop_river_ranks
        } else {
            &self.ip_river_ranks
        }
    }

    fn precompute_river_ranks(&mut self) {
        if self.initial_board.len() != 5 || self.river_ranks_ready {
            return;
        }
        let rank_all = |combos: &[Combo], board: &[Card], parallel: bool| -> Vec<HandRank> {
            if parallel {
                combos
                    .par_iter()
                    .map(|c| evaluate(c.cards, board, 5))
                    .collect()
            } else {
                combos.iter().map(|c| evaluate(c.cards, board, 5)).collect()
            }
        };
        self.oop_river_ranks = rank_all(&self.oop_combos, &self.initial_board, self.config.use_parallel);
        self.ip_river_ranks = rank_all(&self.ip_combos, &self.initial_board, self.config.use_parallel);
        self.river_ranks_ready = true;
    }

    fn run_iteration(&mut self, iteration: usize) {
        let this: &CfrEngine = self;
        for player in 0..2i8 {
            if this.config.use_parallel {
                let work = || {
                    (0..this.config.base_sample_size)
                        .into_par_iter()
                        .for_each(|_| this.sample_once(player, iteration));
                };
                match &this.thread_pool {
                    Some(pool) => pool.install(work),
                    None => work(),
                }
            } else {
                for _ in 0..this.config.base_sample_size {
                    this.sample_once(player, iteration);
                }
            }
        }

        let metric = this.root_metric(iteration);
        self.iteration_regrets.push(metric);
    }

    /// One external sample: pick a combo for each player, reject card
    /// conflicts silently, traverse.
    fn sample_once(&self, player: i8, iteration: usize) {
        let (my_combos, opp_combos) = if player == 0 {
            (&self.oop_combos, &self.ip_combos)
        } else {
            (&self.ip_combos, &self.oop_combos)
        };
        let mut rng = rand::thread_rng();
        let my_idx = rng.gen_range(0..my_combos.len());
        let opp_idx = rng.gen_range(0..opp_combos.len());
        let my = &my_combos[my_idx];
        let opp = &opp_combos[opp_idx];

        if combos_conflict(my.cards, opp.cards)
            || hole_on_board(my.cards, self.initial_board_mask)
            || hole_on_board(opp.cards, self.initial_board_mask)
        {
            return;
        }
        self.cfr_traverse(self.root_id, player, my_idx, opp_idx, 1.0, iteration);
    }

    /// Mean positive root regret per visited combo, divided by the cumulative
    /// sample count — a time-averaged convergence signal.
    fn root_metric(&self, iteration: usize) -> f32 {
        let samples_so_far = (iteration * self.config.base_sample_size) as f32;
        let _guard = self.regrets.lock(self.root_id);
        let nr = unsafe { self.regrets.slot_ref(self.root_id) };
        if nr.regrets.is_empty() {
            return 0.0;
        }
        let mut total_max_regret = 0.0f32;
        let mut hands = 0usize;
        for regrets in nr.regrets.values() {
            let mut max_r = 0.0f32;
            for &v in regrets {
                if v > max_r {
                    max_r = v;
                }
            }
            total_max_regret += max_r;
            hands += 1;
        }
        (total_max_regret / hands as f32) / samples_so_far
    }

    fn cfr_traverse(
        &self,
        node_id: u32,
        player: i8,
        my_idx: usize,
        opp_idx: usize,
        reach: f32,
        iteration: usize,
    ) -> f32 {
        let node = self.pool.nodes[node_id as usize];
        match node.kind {
            NodeKind::Terminal => self.terminal_ev(&node, player, my_idx, opp_idx),
            NodeKind::Chance => {
                self.chance_node_cfr(&node, player, my_idx, opp_idx, reach, iteration)
            }
            NodeKind::Player => {
                if node.player == player {
                    self.player_node_cfr(&node, player, my_idx, opp_idx, reach, iteration)
                } else {
                    self.opponent_node_cfr(&node, player, my_idx, opp_idx, reach, iteration)
                }
            }
        }
    }

    /// Traverser node: explore every action, regret-update under the shard
    /// lock. The lock is not held across recursion.
    fn player_node_cfr(
        &self,
        node: &Node,
        player: i8,
        my_idx: usize,
        opp_idx: usize,
        reach: f32,
        iteration: usize,
    ) -> f32 {
        let count = node.action_count as usize;
        let strategy = self.get_current_strategy(node.id, my_idx);
        let children = self.pool.node_children(node);

        let mut action_utils = vec![0.0f32; count];
        let mut node_util = 0.0f32;
        for (a, &child) in children.iter().enumerate() {
            let util = self.cfr_traverse(child, player, my_idx, opp_idx, reach, iteration);
            action_utils[a] = util;
            node_util += strategy[a] * util;
        }

        {
            let _guard = self.regrets.lock(node.id);
            let nr = unsafe { self.regrets.slot(node.id) };
            let regrets = nr
                .regrets
                .entry(my_idx)
                .or_insert_with(|| vec![0.0; count]);
            for a in 0..count {
                regrets[a] += action_utils[a] - node_util;
            }
            let cum = nr
                .cumulative_strategy
                .entry(my_idx)
                .or_insert_with(|| vec![0.0; count]);
            for a in 0..count {
                // External sampling: the average strategy accumulates the
                // current sampled strategy directly.
                cum[a] += strategy[a];
            }
        }
        node_util
    }

    /// Opponent node: sample a single action from the opponent's current
    /// strategy and descend.
    fn opponent_node_cfr(
        &self,
        node: &Node,
        player: i8,
        my_idx: usize,
        opp_idx: usize,
        reach: f32,
        iteration: usize,
    ) -> f32 {
        let strategy = self.get_current_strategy(node.id, opp_idx);
        let mut rng = rand::thread_rng();
        let action = match WeightedIndex::new(&strategy) {
            Ok(dist) => dist.sample(&mut rng),
            Err(_) => rng.gen_range(0..strategy.len()),
        };
        let child = self.pool.node_children(node)[action];
        self.cfr_traverse(child, player, my_idx, opp_idx, reach, iteration)
    }

    /// Chance node: sample uniformly among the cards that conflict with
    /// neither combo. An empty filter contributes nothing.
    fn chance_node_cfr(
        &self,
        node: &Node,
        player: i8,
        my_idx: usize,
        opp_idx: usize,
        reach: f32,
        iteration: usize,
    ) -> f32 {
        let (my, opp) = self.sampled_combos(player, my_idx, opp_idx);
        let cards = self.pool.node_chance_cards(node);
        let children = self.pool.node_chance_children(node);

        let valid: Vec<usize> = (0..cards.len())
            .filter(|&i| !card_in_hole(cards[i], my.cards) && !card_in_hole(cards[i], opp.cards))
            .collect();
        if valid.is_empty() {
            return 0.0;
        }
        let mut rng = rand::thread_rng();
        let pick = valid[rng.gen_range(0..valid.len())];
        self.cfr_traverse(children[pick], player, my_idx, opp_idx, reach, iteration)
    }

    /// Payoff for the traverser at a terminal, relative to its root stack.
    fn terminal_ev(&self, node: &Node, player: i8, my_idx: usize, opp_idx: usize) -> f32 {
        let p = player as usize;
        let initial_stack = self.pool.nodes[self.root_id as usize].stacks[p];

        // Fold terminal: the pot was zeroed by the builder; the stack delta
        // is the whole story.
        if node.pot < POT_EPSILON {
            return node.stacks[p] - initial_stack;
        }

        let (my, opp) = self.sampled_combos(player, my_idx, opp_idx);
        let board = &node.board[..node.board_len as usize];

        let equity = if node.board_len == 5 {
            let my_rank = evaluate(my.cards, board, 5);
            let opp_rank = evaluate(opp.cards, board, 5);
            if my_rank > opp_rank {
                1.0
            } else if my_rank < opp_rank {
                0.0
            } else {
                0.5
            }
        } else {
            calculate_equity(
                my.cards,
                opp.cards,
                board,
                node.board_len as usize,
                PRE_RIVER_EQUITY_TRIALS,
            ) as f32
        };

        equity * node.pot - (initial_stack - node.stacks[p])
    }

    fn sampled_combos(&self, player: i8, my_idx: usize, opp_idx: usize) -> (&Combo, &Combo) {
        if player == 0 {
            (&self.oop_combos[my_idx], &self.ip_combos[opp_idx])
        } else {
            (&self.ip_combos[my_idx], &self.oop_combos[opp_idx])
        }
    }

    /// Regret-matching strategy for one combo at one node: positive parts
    /// renormalized, uniform when no positive regret exists yet.
    pub fn get_current_strategy(&self, node_id: u32, combo_idx: usize) -> Vec<f32> {
        let node = &self.pool.nodes[node_id as usize];
        let count = node.action_count as usize;
        let mut strategy = vec![0.0f32; count];
        let mut sum = 0.0f32;

        {
            let _guard = self.regrets.lock(node_id);
            let nr = unsafe { self.regrets.slot_ref(node_id) };
            if let Some(regrets) = nr.regrets.get(&combo_idx) {
                for a in 0..count {
                    strategy[a] = regrets[a].max(0.0);
                    sum += strategy[a];
                }
            }
        }

        if sum > 0.0 {
            for s in &mut strategy {
                *s /= sum;
            }
        } else {
            strategy.fill(1.0 / count as f32);
        }
        strategy
    }

    /// Discount pass over every table. Requires exclusive access: the outer
    /// iteration loop guarantees no traversal is in flight.
    fn apply_discount(&mut self, iteration: usize) {
        let t = iteration as f32;
        let d = t.powf(self.config.alpha) / (t.powf(self.config.alpha) + 1.0);
        let dc = t.powf(self.config.gamma) / (t.powf(self.config.gamma) + 1.0);

        for nr in self.regrets.slots_mut() {
            for regrets in nr.regrets.values_mut() {
                for v in regrets {
                    if *v < 0.0 {
                        *v *= 0.5;
                    } else {
                        *v *= d;
                    }
                }
            }
            for cum in nr.cumulative_strategy.values_mut() {
                for v in cum {
                    *v *= dc;
                }
            }
        }
    }

    /// Most recent convergence metric, 0.0 before any iteration ran.
    pub fn get_average_regret(&self) -> f32 {
        self.iteration_regrets.last().copied().unwrap_or(0.0)
    }

    pub fn get_regret_history(&self) -> &[f32] {
        &self.iteration_regrets
    }

    pub fn get_node_count(&self) -> usize {
        self.pool.nodes.len()
    }

    pub fn oop_combo_count(&self) -> usize {
        self.oop_combos.len()
    }

    pub fn ip_combo_count(&self) -> usize {
        self.ip_combos.len()
    }

    /// Cumulative strategies at a node, summed across combos that share a
    /// hand label. Unnormalized; out-of-range ids yield an empty map.
    pub fn get_node_hand_strategies(&self, node_id: u32) -> HashMap<String, Vec<f32>> {
        let mut result: HashMap<String, Vec<f32>> = HashMap::new();
        if node_id as usize >= self.pool.nodes.len() || node_id as usize >= self.regrets.len() {
            return result;
        }
        let node = &self.pool.nodes[node_id as usize];
        let combos = if node.player == 0 {
            &self.oop_combos
        } else {
            &self.ip_combos
        };

        let _guard = self.regrets.lock(node_id);
        let nr = unsafe { self.regrets.slot_ref(node_id) };
        for (&idx, cum) in &nr.cumulative_strategy {
            if idx >= combos.len() {
                continue;
            }
            match result.entry(combos[idx].hand.clone()) {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    for (acc, &v) in e.get_mut().iter_mut().zip(cum) {
                        *acc += v;
                    }
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(cum.clone());
                }
            }
        }
        result
    }

    /// Structural record of one node, or `None` when the id is out of range.
    pub fn get_node_data(&self, node_id: u32) -> Option<NodeData> {
        let node = self.pool.nodes.get(node_id as usize)?;

        let node_type = match node.kind {
            NodeKind::Player => "player",
            NodeKind::Chance => "chance",
            NodeKind::Terminal => "terminal",
        };

        let mut data = NodeData {
            id: node.id,
            node_type,
            player: node.player,
            street: node.street.name(),
            pot: node.pot,
            stacks: node.stacks,
            to_call: node.to_call,
            board: node.board[..node.board_len as usize]
                .iter()
                .map(|&c| card_to_string(c))
                .collect(),
            ..NodeData::default()
        };

        if node.is_player() {
            data.actions = self
                .pool
                .node_actions(node)
                .iter()
                .map(|a| a.label())
                .collect();
            data.child_ids = self.pool.node_children(node).to_vec();
        }
        if node.is_chance() {
            data.chance_cards = self
                .pool
                .node_chance_cards(node)
                .iter()
                .map(|&c| card_to_string(c))
                .collect();
            data.chance_child_ids = self.pool.node_chance_children(node).to_vec();
        }
        Some(data)
    }
}

#[inline]
fn combos_conflict(a: [Card; 2], b: [Card; 2]) -> bool {
    a[0] == b[0] || a[0] == b[1] || a[1] == b[0] || a[1] == b[1]
}

#[inline]
fn card_in_hole(card: Card, hole: [Card; 2]) -> bool {
    card == hole[0] || card == hole[1]
}

#[inline]
fn hole_on_board(hole: [Card; 2], board_mask: CardMask) -> bool {
    mask_has_card(board_mask, hole[0]) || mask_has_card(board_mask, hole[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{mask_of, parse_board};
    use crate::ranges::combos_from_range;

    fn serial_config() -> CfrConfig {
        CfrConfig {
            base_sample_size: 16,
            use_parallel: false,
            ..CfrConfig::default()
        }
    }

    fn betting(pot: f32, stack: f32, bet_sizes: Vec<f32>) -> BettingConfig {
        BettingConfig {
            initial_pot: pot,
            oop_stack: stack,
            ip_stack: stack,
            flop_bet_sizes: bet_sizes.clone(),
            turn_bet_sizes: bet_sizes.clone(),
            river_bet_sizes: bet_sizes,
            max_raises: 3,
            ..BettingConfig::default()
        }
    }

    fn engine_on(board_str: &str, pot: f32, stack: f32, bet_sizes: Vec<f32>) -> CfrEngine {
        let board = parse_board(board_str).unwrap();
        let board_mask = mask_of(&board);
        let mut engine = CfrEngine::new(serial_config());
        engine.build_tree(&betting(pot, stack, bet_sizes), &board).unwrap();
        engine.set_board(&board).unwrap();
        engine
            .set_oop_range(combos_from_range("QQ+,AKs", 1.0, board_mask).unwrap())
            .unwrap();
        engine
            .set_ip_range(combos_from_range("99-JJ,KQs", 1.0, board_mask).unwrap())
            .unwrap();
        engine
    }

    #[test]
    fn regret_tables_sized_to_pool() {
        let engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        assert_eq!(engine.regrets.len(), engine.get_node_count());
    }

    #[test]
    fn solve_without_tree_fails() {
        let mut engine = CfrEngine::new(serial_config());
        assert!(matches!(engine.solve(1), Err(SolverError::TreeNotBuilt)));
    }

    #[test]
    fn solve_without_ranges_fails() {
        let board = parse_board("Ks7h2d").unwrap();
        let mut engine = CfrEngine::new(serial_config());
        engine
            .build_tree(&betting(100.0, 100.0, vec![1.0]), &board)
            .unwrap();
        engine.set_board(&board).unwrap();
        assert!(matches!(engine.solve(1), Err(SolverError::EmptyRange(_))));
    }

    #[test]
    fn empty_range_rejected_at_set() {
        let mut engine = CfrEngine::new(serial_config());
        assert!(engine.set_oop_range(Vec::new()).is_err());
        assert!(engine
            .set_ip_range(vec![Combo::new([0, 0], 1.0)])
            .is_err());
        assert!(engine
            .set_ip_range(vec![Combo {
                cards: [60, 1],
                weight: 1.0,
                hand: "??".to_string()
            }])
            .is_err());
    }

    #[test]
    fn strategy_is_simplex() {
        let mut engine = engine_on("Ks7h2d", 100.0, 100.0, vec![0.5, 1.0]);
        engine.solve(6).unwrap();
        let root = engine.pool.nodes[0];
        for combo_idx in 0..engine.oop_combos.len() {
            let strategy = engine.get_current_strategy(0, combo_idx);
            assert_eq!(strategy.len(), root.action_count as usize);
            let sum: f32 = strategy.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "strategy sums to {}", sum);
            assert!(strategy.iter().all(|&s| s >= 0.0));
        }
    }

    #[test]
    fn regret_update_is_zero_sum_at_node() {
        let engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        let node = engine.pool.nodes[0];
        let count = node.action_count as usize;

        // Hand-roll one update the way player_node_cfr does.
        let strategy = engine.get_current_strategy(0, 0);
        let action_utils = vec![3.0f32, -1.0, 0.5][..count.min(3)].to_vec();
        let action_utils: Vec<f32> = (0..count)
            .map(|a| action_utils.get(a).copied().unwrap_or(0.25))
            .collect();
        let node_util: f32 = (0..count).map(|a| strategy[a] * action_utils[a]).sum();

        {
            let _guard = engine.regrets.lock(0);
            let nr = unsafe { engine.regrets.slot(0) };
            let regrets = nr.regrets.entry(0).or_insert_with(|| vec![0.0; count]);
            for a in 0..count {
                regrets[a] += action_utils[a] - node_util;
            }
        }

        let _guard = engine.regrets.lock(0);
        let nr = unsafe { engine.regrets.slot_ref(0) };
        let sum: f32 = nr.regrets[&0].iter().sum();
        let expected: f32 = action_utils.iter().sum::<f32>() - count as f32 * node_util;
        assert!((sum - expected).abs() < 1e-4);
    }

    #[test]
    fn discount_halves_negatives_and_shrinks_positives() {
        let mut engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        {
            let _guard = engine.regrets.lock(0);
            let nr = unsafe { engine.regrets.slot(0) };
            nr.regrets.insert(0, vec![10.0, -4.0]);
            nr.cumulative_strategy.insert(0, vec![8.0, 2.0]);
        }
        engine.apply_discount(4);

        let t = 4.0f32;
        let d = t.powf(1.5) / (t.powf(1.5) + 1.0);
        let dc = t.powf(2.0) / (t.powf(2.0) + 1.0);

        let _guard = engine.regrets.lock(0);
        let nr = unsafe { engine.regrets.slot_ref(0) };
        let regrets = &nr.regrets[&0];
        assert!((regrets[0] - 10.0 * d).abs() < 1e-5);
        assert!((regrets[1] - (-2.0)).abs() < 1e-5, "negative regret halves exactly");
        let cum = &nr.cumulative_strategy[&0];
        assert!((cum[0] - 8.0 * dc).abs() < 1e-5);
        assert!((cum[1] - 2.0 * dc).abs() < 1e-5);
    }

    #[test]
    fn metric_history_length_matches_iterations() {
        let mut engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        engine.solve(7).unwrap();
        assert_eq!(engine.get_regret_history().len(), 7);
        assert_eq!(
            engine.get_average_regret(),
            *engine.get_regret_history().last().unwrap()
        );
    }

    #[test]
    fn stop_handle_cancels() {
        let mut engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        let handle = engine.stop_handle();
        handle.stop();
        engine.solve(5).unwrap();
        // The flag is reset at solve start, so a stale stop request does not
        // leak into the next solve.
        assert_eq!(engine.get_regret_history().len(), 5);

        let handle = engine.stop_handle();
        let mut seen = 0;
        engine
            .solve_with_progress(1000, |done, _| {
                seen = done;
                handle.stop();
            })
            .unwrap();
        assert!(engine.get_regret_history().len() <= 20);
        assert!(seen >= 10);
    }

    #[test]
    fn river_ranks_filled_on_complete_board() {
        let mut engine = engine_on("Ks7h2dQc9s", 100.0, 100.0, vec![1.0]);
        engine.solve(2).unwrap();
        assert_eq!(engine.river_ranks(0).len(), engine.oop_combo_count());
        assert_eq!(engine.river_ranks(1).len(), engine.ip_combo_count());
        assert!(engine.river_ranks(0).iter().all(|&r| r > 0));
    }

    #[test]
    fn node_data_out_of_range_is_none() {
        let engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        assert!(engine.get_node_data(u32::MAX).is_none());
        assert!(engine
            .get_node_hand_strategies(u32::MAX)
            .is_empty());
    }

    #[test]
    fn node_data_mirrors_node() {
        let engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        let data = engine.get_node_data(0).unwrap();
        assert_eq!(data.node_type, "player");
        assert_eq!(data.player, 0);
        assert_eq!(data.street, "flop");
        assert_eq!(data.board, vec!["Ks", "7h", "2d"]);
        assert_eq!(data.actions.len(), data.child_ids.len());
        assert!(data.actions.iter().any(|a| a == "check"));
    }

    #[test]
    fn river_showdown_payoffs_are_exact() {
        // Straight flush vs a pair of aces on a locked board, no stacks
        // behind: winner takes the whole pot, loser breaks even on chips.
        let board = parse_board("AsKsQsJsTs").unwrap();
        let mut engine = CfrEngine::new(serial_config());
        engine
            .build_tree(&betting(100.0, 0.0, vec![]), &board)
            .unwrap();
        engine.set_board(&board).unwrap();
        let card = |s: &str| parse_board(s).unwrap()[0];
        engine
            .set_oop_range(vec![Combo::new([card("9s"), card("8s")], 1.0)])
            .unwrap();
        engine
            .set_ip_range(vec![Combo::new([card("Ad"), card("Ac")], 1.0)])
            .unwrap();

        let showdown = *engine
            .pool
            .nodes
            .iter()
            .skip(1)
            .find(|n| n.is_terminal() && n.pot > 0.0)
            .unwrap();
        assert_eq!(showdown.pot, 100.0);

        assert_eq!(engine.terminal_ev(&showdown, 0, 0, 0), 100.0);
        assert_eq!(engine.terminal_ev(&showdown, 1, 0, 0), 0.0);
    }

    #[test]
    fn fold_terminal_payoff_reads_stacks() {
        // OOP pot-bets its stack, IP folds. The fold node zeroes the pot and
        // keeps the folder's pre-call stack; payoffs are pure stack deltas
        // against the root stacks.
        let engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        let fold = *engine
            .pool
            .nodes
            .iter()
            .skip(1)
            .find(|n| n.is_terminal() && n.pot < POT_EPSILON && n.stacks == [0.0, 100.0])
            .unwrap();

        // Folder (IP) invested nothing on this street.
        assert_eq!(engine.terminal_ev(&fold, 1, 0, 0), 0.0);
        // The bettor's stack already reflects the bet the fold orphaned.
        assert_eq!(engine.terminal_ev(&fold, 0, 0, 0), -100.0);
    }

    #[test]
    fn hand_strategies_aggregate_by_label() {
        let mut engine = engine_on("Ks7h2d", 100.0, 100.0, vec![1.0]);
        engine.solve(20).unwrap();
        let strategies = engine.get_node_hand_strategies(0);
        assert!(!strategies.is_empty());
        let root_actions = engine.pool.nodes[0].action_count as usize;
        for (hand, freqs) in &strategies {
            assert_eq!(freqs.len(), root_actions, "bad vector for {}", hand);
            assert!(freqs.iter().all(|&f| f >= 0.0));
        }
        // Labels are suit classes, not specific combos.
        assert!(strategies.keys().all(|h| h.len() <= 3));
    }
}
