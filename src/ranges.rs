//! Weighted combo construction from range notation.
//!
//! The engine itself only sees opaque combo indices; everything here exists
//! to turn notation like "TT+, AQs+, KQo" into concrete weighted two-card
//! holdings with canonical labels for read-back aggregation.

use std::collections::HashSet;

use crate::cards::{
    card_rank, card_suit, make_card, mask_has_card, parse_card, CardMask, Card, NUM_SUITS,
    RANKS_STR,
};
use crate::error::{SolverError, SolverResult};

/// A private two-card holding with a weight and a suit-class label.
#[derive(Debug, Clone)]
pub struct Combo {
    pub cards: [Card; 2],
    pub weight: f32,
    pub hand: String,
}

impl Combo {
    pub fn new(cards: [Card; 2], weight: f32) -> Combo {
        let hand = simplify_hand(cards);
        Combo {
            cards,
            weight,
            hand,
        }
    }

    /// Build a combo from a raw (rank, suit, rank, suit, weight, label)
    /// record, the shape host bindings hand over.
    pub fn from_parts(rank1: u8, suit1: u8, rank2: u8, suit2: u8, weight: f32, hand: String) -> Combo {
        Combo {
            cards: [make_card(rank1, suit1), make_card(rank2, suit2)],
            weight,
            hand,
        }
    }
}

/// Canonical label for a combo: "AA", "AKs" or "AKo".
pub fn simplify_hand(cards: [Card; 2]) -> String {
    let (hi, lo) = if card_rank(cards[0]) >= card_rank(cards[1]) {
        (cards[0], cards[1])
    } else {
        (cards[1], cards[0])
    };
    let ranks = RANKS_STR.as_bytes();
    let r1 = ranks[card_rank(hi) as usize] as char;
    let r2 = ranks[card_rank(lo) as usize] as char;

    if card_rank(hi) == card_rank(lo) {
        return format!("{}{}", r1, r2);
    }
    let suffix = if card_suit(hi) == card_suit(lo) { "s" } else { "o" };
    format!("{}{}{}", r1, r2, suffix)
}

/// Expand one hand notation into its concrete combos.
///
/// Accepts pair ("77"), suited ("AKs"), offsuit ("AKo") and exact
/// ("AsKh") notation.
pub fn hand_combos(notation: &str) -> SolverResult<Vec<[Card; 2]>> {
    let notation = notation.trim();
    let chars: Vec<char> = notation.chars().collect();

    if chars.len() == 2 && chars[0] == chars[1] {
        let rank = rank_index(chars[0])
            .ok_or_else(|| SolverError::InvalidHandNotation(notation.to_string()))?;
        let mut combos = Vec::with_capacity(6);
        for s1 in 0..NUM_SUITS {
            for s2 in (s1 + 1)..NUM_SUITS {
                combos.push([make_card(rank, s1), make_card(rank, s2)]);
            }
        }
        return Ok(combos);
    }

    if chars.len() == 3 {
        let r1 = rank_index(chars[0])
            .ok_or_else(|| SolverError::InvalidHandNotation(notation.to_string()))?;
        let r2 = rank_index(chars[1])
            .ok_or_else(|| SolverError::InvalidHandNotation(notation.to_string()))?;
        if r1 == r2 {
            return Err(SolverError::InvalidHandNotation(notation.to_string()));
        }
        match chars[2] {
            's' => {
                return Ok((0..NUM_SUITS)
                    .map(|s| [make_card(r1, s), make_card(r2, s)])
                    .collect());
            }
            'o' => {
                let mut combos = Vec::with_capacity(12);
                for s1 in 0..NUM_SUITS {
                    for s2 in 0..NUM_SUITS {
                        if s1 != s2 {
                            combos.push([make_card(r1, s1), make_card(r2, s2)]);
                        }
                    }
                }
                return Ok(combos);
            }
            _ => return Err(SolverError::InvalidHandNotation(notation.to_string())),
        }
    }

    if chars.len() == 4 {
        let c1 = parse_card(&notation[..2])?;
        let c2 = parse_card(&notation[2..])?;
        if c1 == c2 {
            return Err(SolverError::InvalidHandNotation(notation.to_string()));
        }
        return Ok(vec![[c1, c2]]);
    }

    Err(SolverError::InvalidHandNotation(notation.to_string()))
}

/// Expand a comma-separated range string into hand notations.
///
/// Supports "TT+" and "AQs+" plus-expansion and "77-TT" dash ranges.
pub fn parse_range(range_str: &str) -> Vec<String> {
    let mut hands = HashSet::new();
    for part in range_str.replace(' ', "").split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some(base) = part.strip_suffix('+') {
            for h in expand_plus(base) {
                hands.insert(h);
            }
        } else if part.contains('-') && part.len() > 3 {
            for h in expand_dash(part) {
                hands.insert(h);
            }
        } else {
            hands.insert(part.to_string());
        }
    }
    let mut result: Vec<String> = hands.into_iter().collect();
    result.sort();
    result
}

fn expand_plus(base: &str) -> Vec<String> {
    let chars: Vec<char> = base.chars().collect();
    let ranks: Vec<char> = RANKS_STR.chars().collect();

    // Pair: "TT+" climbs to AA.
    if chars.len() == 2 && chars[0] == chars[1] {
        if let Some(idx) = RANKS_STR.find(chars[0]) {
            return (idx..ranks.len())
                .map(|i| format!("{}{}", ranks[i], ranks[i]))
                .collect();
        }
    }

    // Suited/offsuit: "ATs+" climbs the second rank toward the first.
    if chars.len() == 3 {
        if let (Some(low), Some(high)) = (RANKS_STR.find(chars[1]), RANKS_STR.find(chars[0])) {
            return (low..high)
                .map(|i| format!("{}{}{}", chars[0], ranks[i], chars[2]))
                .collect();
        }
    }

    vec![base.to_string()]
}

fn expand_dash(range_str: &str) -> Vec<String> {
    let parts: Vec<&str> = range_str.split('-').collect();
    if parts.len() != 2 {
        return vec![range_str.to_string()];
    }
    let (start, end) = (parts[0], parts[1]);
    let s: Vec<char> = start.chars().collect();
    let e: Vec<char> = end.chars().collect();
    let ranks: Vec<char> = RANKS_STR.chars().collect();

    // Pair range: "77-TT".
    if s.len() == 2 && e.len() == 2 && s[0] == s[1] && e[0] == e[1] {
        if let (Some(si), Some(ei)) = (RANKS_STR.find(s[0]), RANKS_STR.find(e[0])) {
            let (lo, hi) = (si.min(ei), si.max(ei));
            return (lo..=hi)
                .map(|i| format!("{}{}", ranks[i], ranks[i]))
                .collect();
        }
    }

    // Suited/offsuit range with a shared high card: "KTs-KQs".
    if s.len() == 3 && e.len() == 3 && s[0] == e[0] && s[2] == e[2] {
        if let (Some(si), Some(ei)) = (RANKS_STR.find(s[1]), RANKS_STR.find(e[1])) {
            let (lo, hi) = (si.min(ei), si.max(ei));
            return (lo..=hi)
                .map(|i| format!("{}{}{}", s[0], ranks[i], s[2]))
                .collect();
        }
    }

    vec![range_str.to_string()]
}

/// Materialize a range string into weighted combos, dropping any combo that
/// collides with `dead` (normally the board mask).
pub fn combos_from_range(
    range_str: &str,
    weight: f32,
    dead: CardMask,
) -> SolverResult<Vec<Combo>> {
    let mut combos = Vec::new();
    for notation in parse_range(range_str) {
        for cards in hand_combos(&notation)? {
            if mask_has_card(dead, cards[0]) || mask_has_card(dead, cards[1]) {
                continue;
            }
            combos.push(Combo::new(cards, weight));
        }
    }
    Ok(combos)
}

fn rank_index(c: char) -> Option<u8> {
    RANKS_STR.find(c).map(|i| i as u8)
}
