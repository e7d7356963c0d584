//! Betting-tree construction over a flat, offset-indexed data pool.
//!
//! Every structural edge in the tree is an integer offset into one of four
//! append-only arrays (nodes, actions, child ids, chance cards), so traversal
//! never chases pointers and the whole tree is trivially shareable across
//! threads. Children are always emitted before their parent: a parent grabs
//! its slice offsets at the moment of its own append, which guarantees the
//! slices are contiguous.
//!
//! States are deduplicated through a transposition table keyed by a canonical
//! two-decimal state string, turning the tree into a DAG where betting lines
//! transpose. Chance nodes enumerate one representative card (lowest unseen
//! suit) per remaining rank, collapsing suit isomorphism on turn and river
//! transitions.

use std::collections::HashMap;

use crate::cards::{
    card_rank, make_card, mask_has_card, mask_of, validate_board, Card, CARD_NONE, NUM_RANKS,
    NUM_SUITS,
};
use crate::error::{SolverError, SolverResult};

/// Chip tolerance for to-call comparisons.
pub const TREE_EPSILON: f32 = 0.01;

/// Pool capacity ceilings. The arrays grow on demand; the ceilings only bound
/// runaway configurations and surface as `SolverError::PoolOverflow`.
const MAX_NODES: usize = 50_000_000;
const MAX_ACTIONS: usize = 100_000_000;
const MAX_CHILD_IDS: usize = 100_000_000;
const MAX_CHANCE_CARDS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Street {
    Flop = 0,
    Turn = 1,
    River = 2,
}

impl Street {
    pub fn from_board_len(len: usize) -> Street {
        match len {
            3 => Street::Flop,
            4 => Street::Turn,
            _ => Street::River,
        }
    }

    pub fn next(self) -> Option<Street> {
        match self {
            Street::Flop => Some(Street::Turn),
            Street::Turn => Some(Street::River),
            Street::River => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

/// One legal move: a kind plus the chips it represents. For fold/check the
/// size is unused; for call it is the amount added; for bet/raise/all-in it
/// is the actor's total investment in the action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub size: f32,
}

impl Action {
    pub fn label(&self) -> String {
        match self.kind {
            ActionKind::Fold => "fold".to_string(),
            ActionKind::Check => "check".to_string(),
            ActionKind::Call => format!("call ({})", self.size as i64),
            ActionKind::Bet => format!("bet {}", self.size as i64),
            ActionKind::Raise => format!("raise {}", self.size as i64),
            ActionKind::AllIn => format!("allin ({})", self.size as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Player,
    Chance,
    Terminal,
}

/// A fixed-size tree node. Plain data: every reference to related records is
/// an offset into the pool arrays.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub id: u32,
    pub kind: NodeKind,
    /// 0 = OOP, 1 = IP, -1 = chance/terminal.
    pub player: i8,
    pub street: Street,
    pub pot: f32,
    pub stacks: [f32; 2],
    pub to_call: f32,
    pub action_start: u32,
    pub action_count: u8,
    pub child_start: u32,
    pub chance_card_start: u32,
    pub chance_count: u16,
    pub chance_child_start: u32,
    pub board: [Card; 5],
    pub board_len: u8,
}

impl Default for Node {
    fn default() -> Node {
        Node {
            id: 0,
            kind: NodeKind::Terminal,
            player: -1,
            street: Street::Flop,
            pot: 0.0,
            stacks: [0.0, 0.0],
            to_call: 0.0,
            action_start: 0,
            action_count: 0,
            child_start: 0,
            chance_card_start: 0,
            chance_count: 0,
            chance_child_start: 0,
            board: [CARD_NONE; 5],
            board_len: 0,
        }
    }
}

impl Node {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.kind == NodeKind::Terminal
    }

    #[inline]
    pub fn is_chance(&self) -> bool {
        self.kind == NodeKind::Chance
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.kind == NodeKind::Player
    }
}

/// Four parallel append-only arrays holding the whole tree. Appends are
/// monotonic and indices stay stable for the lifetime of the pool.
#[derive(Default)]
pub struct TreeDataPool {
    pub nodes: Vec<Node>,
    pub actions: Vec<Action>,
    pub child_ids: Vec<u32>,
    pub chance_cards: Vec<Card>,
}

impl TreeDataPool {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.actions.clear();
        self.child_ids.clear();
        self.chance_cards.clear();
    }

    fn push_node(&mut self, node: Node) -> SolverResult<()> {
        if self.nodes.len() >= MAX_NODES {
            return Err(SolverError::PoolOverflow {
                array: "nodes",
                limit: MAX_NODES,
            });
        }
        self.nodes.push(node);
        Ok(())
    }

    fn push_action(&mut self, action: Action) -> SolverResult<()> {
        if self.actions.len() >= MAX_ACTIONS {
            return Err(SolverError::PoolOverflow {
                array: "actions",
                limit: MAX_ACTIONS,
            });
        }
        self.actions.push(action);
        Ok(())
    }

    fn push_child_id(&mut self, id: u32) -> SolverResult<()> {
        if self.child_ids.len() >= MAX_CHILD_IDS {
            return Err(SolverError::PoolOverflow {
                array: "child_ids",
                limit: MAX_CHILD_IDS,
            });
        }
        self.child_ids.push(id);
        Ok(())
    }

    fn push_chance_card(&mut self, card: Card) -> SolverResult<()> {
        if self.chance_cards.len() >= MAX_CHANCE_CARDS {
            return Err(SolverError::PoolOverflow {
                array: "chance_cards",
                limit: MAX_CHANCE_CARDS,
            });
        }
        self.chance_cards.push(card);
        Ok(())
    }

    /// Actions slice of a player node.
    pub fn node_actions(&self, node: &Node) -> &[Action] {
        let start = node.action_start as usize;
        &self.actions[start..start + node.action_count as usize]
    }

    /// Child ids slice of a player node, parallel to its actions.
    pub fn node_children(&self, node: &Node) -> &[u32] {
        let start = node.child_start as usize;
        &self.child_ids[start..start + node.action_count as usize]
    }

    /// Chance cards of a chance node.
    pub fn node_chance_cards(&self, node: &Node) -> &[Card] {
        let start = node.chance_card_start as usize;
        &self.chance_cards[start..start + node.chance_count as usize]
    }

    /// Chance children of a chance node, parallel to its chance cards.
    pub fn node_chance_children(&self, node: &Node) -> &[u32] {
        let start = node.chance_child_start as usize;
        &self.child_ids[start..start + node.chance_count as usize]
    }
}

/// Bet-sizing policy for one tree build. Bet sizes are pot fractions; raise
/// sizes are fractions of (pot + to_call).
#[derive(Debug, Clone)]
pub struct BettingConfig {
    pub initial_pot: f32,
    pub oop_stack: f32,
    pub ip_stack: f32,
    pub flop_bet_sizes: Vec<f32>,
    pub turn_bet_sizes: Vec<f32>,
    pub river_bet_sizes: Vec<f32>,
    pub flop_raise_sizes: Vec<f32>,
    pub turn_raise_sizes: Vec<f32>,
    pub river_raise_sizes: Vec<f32>,
    pub max_raises: u8,
}

impl Default for BettingConfig {
    fn default() -> BettingConfig {
        BettingConfig {
            initial_pot: 0.0,
            oop_stack: 0.0,
            ip_stack: 0.0,
            flop_bet_sizes: Vec::new(),
            turn_bet_sizes: Vec::new(),
            river_bet_sizes: Vec::new(),
            flop_raise_sizes: Vec::new(),
            turn_raise_sizes: Vec::new(),
            river_raise_sizes: Vec::new(),
            max_raises: 3,
        }
    }
}

impl BettingConfig {
    fn sizes(&self, street: Street, is_bet: bool) -> &[f32] {
        match (street, is_bet) {
            (Street::Flop, true) => &self.flop_bet_sizes,
            (Street::Turn, true) => &self.turn_bet_sizes,
            (Street::River, true) => &self.river_bet_sizes,
            (Street::Flop, false) => &self.flop_raise_sizes,
            (Street::Turn, false) => &self.turn_raise_sizes,
            (Street::River, false) => &self.river_raise_sizes,
        }
    }
}

/// Recursive enumerator of the betting state space.
pub struct GameTreeBuilder {
    config: BettingConfig,
    pool: TreeDataPool,
    transposition: HashMap<String, u32>,
}

impl GameTreeBuilder {
    pub fn new(config: BettingConfig) -> GameTreeBuilder {
        GameTreeBuilder {
            config,
            pool: TreeDataPool::default(),
            transposition: HashMap::new(),
        }
    }

    /// Build the full tree for a 3/4/5-card board. Index 0 of the returned
    /// pool holds a copy of the root so callers can always start there.
    pub fn build_tree(mut self, board: &[Card]) -> SolverResult<TreeDataPool> {
        if self.config.initial_pot < 0.0
            || self.config.oop_stack < 0.0
            || self.config.ip_stack < 0.0
        {
            return Err(SolverError::InvalidStacks);
        }
        validate_board(board)?;

        self.pool.clear();
        self.transposition.clear();

        // Slot 0 is reserved; the real root is copied into it afterwards.
        self.pool.push_node(Node::default())?;

        let street = Street::from_board_len(board.len());
        let root_id = self.build_recursive(
            self.config.oop_stack,
            self.config.ip_stack,
            self.config.initial_pot,
            0,
            street,
            board,
            0,
            0.0,
            0.0,
            false,
        )?;

        if root_id != 0 {
            let mut root = self.pool.nodes[root_id as usize];
            root.id = 0;
            self.pool.nodes[0] = root;
        }

        Ok(self.pool)
    }

    /// Canonical transposition key: every game dimension at two decimals,
    /// then the exact board cards.
    fn state_key(
        oop_stack: f32,
        ip_stack: f32,
        pot: f32,
        player: i8,
        street: Street,
        board: &[Card],
        to_call: f32,
        raise_count: u8,
        is_all_in: bool,
    ) -> String {
        let mut key = format!(
            "{:.2}|{:.2}|{:.2}|{}|{}|{:.2}|{}|{}",
            oop_stack,
            ip_stack,
            pot,
            player,
            street as u8,
            to_call,
            raise_count,
            is_all_in as u8,
        );
        for &c in board {
            key.push(',');
            key.push_str(&c.to_string());
        }
        key
    }

    #[allow(clippy::too_many_arguments)]
    fn build_recursive(
        &mut self,
        oop_stack: f32,
        ip_stack: f32,
        pot: f32,
        player: i8,
        street: Street,
        board: &[Card],
        raise_count: u8,
        current_bet: f32,
        actor_invested: f32,
        is_all_in: bool,
    ) -> SolverResult<u32> {
        let to_call = current_bet - actor_invested;
        let key = Self::state_key(
            oop_stack, ip_stack, pot, player, street, board, to_call, raise_count, is_all_in,
        );
        if let Some(&id) = self.transposition.get(&key) {
            return Ok(id);
        }

        // Stacks are in and the call is matched: either showdown (river) or
        // an automatic runout. The pre-river case keeps the player-node shape
        // by emitting a single zero-size call whose child is the chance node.
        if is_all_in && to_call < TREE_EPSILON {
            if street == Street::River {
                return self.write_node(
                    key, player, street, pot, oop_stack, ip_stack, to_call, &[], &[], board,
                );
            }
            let next = match street.next() {
                Some(next) => next,
                None => unreachable!("river handled above"),
            };
            let chance_id = self.add_chance_node(oop_stack, ip_stack, pot, next, board)?;
            return self.write_node(
                key,
                player,
                street,
                pot,
                oop_stack,
                ip_stack,
                to_call,
                &[Action {
                    kind: ActionKind::Call,
                    size: 0.0,
                }],
                &[chance_id],
                board,
            );
        }

        let actor_stack = if player == 0 { oop_stack } else { ip_stack };
        let mut actions: Vec<Action> = Vec::new();
        let mut children: Vec<u32> = Vec::new();

        // Fold, legal only when facing chips. The terminal zeroes the pot;
        // payoff resolution reads the stacks.
        if to_call > TREE_EPSILON {
            actions.push(Action {
                kind: ActionKind::Fold,
                size: 0.0,
            });
            let fold_key = format!("fold#{}", self.pool.nodes.len());
            let fold_id = self.write_node(
                fold_key, player, street, 0.0, oop_stack, ip_stack, 0.0, &[], &[], board,
            )?;
            children.push(fold_id);
        }

        if to_call < TREE_EPSILON {
            // Check. IP checking behind closes the street.
            actions.push(Action {
                kind: ActionKind::Check,
                size: 0.0,
            });
            if player == 1 {
                if street == Street::River {
                    let sd_key = format!("showdown#{}", self.pool.nodes.len());
                    let sd_id = self.write_node(
                        sd_key, player, street, pot, oop_stack, ip_stack, 0.0, &[], &[], board,
                    )?;
                    children.push(sd_id);
                } else {
                    let next = match street.next() {
                        Some(next) => next,
                        None => unreachable!("river handled above"),
                    };
                    let chance_id =
                        self.add_chance_node(oop_stack, ip_stack, pot, next, board)?;
                    children.push(chance_id);
                }
            } else {
                let child = self.build_recursive(
                    oop_stack, ip_stack, pot, 1, street, board, 0, 0.0, 0.0, false,
                )?;
                children.push(child);
            }
        } else {
            // Call. Closes the street: showdown on the river, runout below.
            let call_amt = actor_stack.min(to_call);
            actions.push(Action {
                kind: ActionKind::Call,
                size: call_amt,
            });
            let next_oop = if player == 0 {
                oop_stack - call_amt
            } else {
                oop_stack
            };
            let next_ip = if player == 1 {
                ip_stack - call_amt
            } else {
                ip_stack
            };
            let next_pot = pot + call_amt;

            if street == Street::River {
                let sd_key = format!("showdown#{}", self.pool.nodes.len());
                let sd_id = self.write_node(
                    sd_key, player, street, next_pot, next_oop, next_ip, 0.0, &[], &[], board,
                )?;
                children.push(sd_id);
            } else {
                let next = match street.next() {
                    Some(next) => next,
                    None => unreachable!("river handled above"),
                };
                let chance_id =
                    self.add_chance_node(next_oop, next_ip, next_pot, next, board)?;
                children.push(chance_id);
            }
        }

        // Bets and raises, capped by the per-street raise count.
        if raise_count < self.config.max_raises && actor_stack > to_call + TREE_EPSILON {
            let is_bet = to_call < TREE_EPSILON;
            let sizes = self.config.sizes(street, is_bet).to_vec();

            for s in sizes {
                let chips = if is_bet {
                    (pot * s).floor()
                } else {
                    ((pot + to_call) * s).floor()
                };
                let chips = chips.max(1.0);
                let invest = actor_stack.min(to_call + chips);
                if invest <= to_call + TREE_EPSILON {
                    continue;
                }

                actions.push(Action {
                    kind: if is_bet {
                        ActionKind::Bet
                    } else {
                        ActionKind::Raise
                    },
                    size: invest,
                });
                let n_oop = if player == 0 {
                    oop_stack - invest
                } else {
                    oop_stack
                };
                let n_ip = if player == 1 { ip_stack - invest } else { ip_stack };
                let child = self.build_recursive(
                    n_oop,
                    n_ip,
                    pot + invest,
                    1 - player,
                    street,
                    board,
                    raise_count + 1,
                    invest,
                    current_bet,
                    invest >= actor_stack - TREE_EPSILON,
                )?;
                children.push(child);
            }

            // Explicit shove on top of the configured sizes.
            if actor_stack > to_call + 1.0 {
                actions.push(Action {
                    kind: ActionKind::AllIn,
                    size: actor_stack,
                });
                let n_oop = if player == 0 { 0.0 } else { oop_stack };
                let n_ip = if player == 1 { 0.0 } else { ip_stack };
                let child = self.build_recursive(
                    n_oop,
                    n_ip,
                    pot + actor_stack,
                    1 - player,
                    street,
                    board,
                    raise_count + 1,
                    actor_stack,
                    current_bet,
                    true,
                )?;
                children.push(child);
            }
        }

        self.write_node(
            key, player, street, pot, oop_stack, ip_stack, to_call, &actions, &children, board,
        )
    }

    /// Append action/child records, then the node itself. Offsets are taken
    /// at the moment of each append so the slices stay contiguous.
    #[allow(clippy::too_many_arguments)]
    fn write_node(
        &mut self,
        key: String,
        player: i8,
        street: Street,
        pot: f32,
        oop_stack: f32,
        ip_stack: f32,
        to_call: f32,
        actions: &[Action],
        children: &[u32],
        board: &[Card],
    ) -> SolverResult<u32> {
        let id = self.pool.nodes.len() as u32;

        let mut node = Node {
            id,
            kind: if actions.is_empty() {
                NodeKind::Terminal
            } else {
                NodeKind::Player
            },
            player,
            street,
            pot,
            stacks: [oop_stack, ip_stack],
            to_call: to_call.max(0.0),
            ..Node::default()
        };

        node.action_start = self.pool.actions.len() as u32;
        node.action_count = actions.len() as u8;
        for &a in actions {
            self.pool.push_action(a)?;
        }

        node.child_start = self.pool.child_ids.len() as u32;
        for &c in children {
            self.pool.push_child_id(c)?;
        }

        node.board_len = board.len() as u8;
        node.board[..board.len()].copy_from_slice(board);

        self.pool.push_node(node)?;
        self.transposition.insert(key, id);
        Ok(id)
    }

    /// Deal one representative card per unseen rank and descend. The chance
    /// node is written after all of its subtrees so its card and child
    /// slices are freshly appended and contiguous.
    fn add_chance_node(
        &mut self,
        oop_stack: f32,
        ip_stack: f32,
        pot: f32,
        next_street: Street,
        board: &[Card],
    ) -> SolverResult<u32> {
        let mask = mask_of(board);
        let board_ranks: u16 = board.iter().fold(0, |m, &c| m | 1 << card_rank(c));
        let mut chance_cards: Vec<Card> = Vec::new();
        let mut chance_children: Vec<u32> = Vec::new();

        // One representative per rank still unseen on the board; suits below
        // the river are collapsed into the lowest available one.
        for rank in 0..NUM_RANKS {
            if board_ranks & (1 << rank) != 0 {
                continue;
            }
            let representative = (0..NUM_SUITS)
                .map(|s| make_card(rank, s))
                .find(|&c| !mask_has_card(mask, c));
            if let Some(card) = representative {
                chance_cards.push(card);
                let mut next_board = board.to_vec();
                next_board.push(card);
                let child = self.build_recursive(
                    oop_stack,
                    ip_stack,
                    pot,
                    0,
                    next_street,
                    &next_board,
                    0,
                    0.0,
                    0.0,
                    oop_stack < TREE_EPSILON || ip_stack < TREE_EPSILON,
                )?;
                chance_children.push(child);
            }
        }

        let id = self.pool.nodes.len() as u32;
        let mut node = Node {
            id,
            kind: NodeKind::Chance,
            player: -1,
            street: next_street,
            pot,
            stacks: [oop_stack, ip_stack],
            ..Node::default()
        };

        node.chance_card_start = self.pool.chance_cards.len() as u32;
        node.chance_count = chance_cards.len() as u16;
        for &c in &chance_cards {
            self.pool.push_chance_card(c)?;
        }

        node.chance_child_start = self.pool.child_ids.len() as u32;
        for &c in &chance_children {
            self.pool.push_child_id(c)?;
        }

        node.board_len = board.len() as u8;
        node.board[..board.len()].copy_from_slice(board);

        self.pool.push_node(node)?;
        Ok(id)
    }
}
