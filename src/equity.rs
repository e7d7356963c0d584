//! Monte-Carlo equity between two known hands on a partial board.

use rand::Rng;

use crate::cards::{add_to_mask, remaining_deck, Card, CardMask};
use crate::hand_evaluator::evaluate;

/// Win probability plus half the tie probability for `hero` vs `villain`.
///
/// With a complete board the comparison is exact (1.0 / 0.5 / 0.0). With an
/// incomplete board the runout is sampled `num_simulations` times with a
/// partial Fisher-Yates shuffle of the live deck. Any duplicated card among
/// the holes and board yields the defensive fallback of 0.5.
pub fn calculate_equity(
    hero: [Card; 2],
    villain: [Card; 2],
    board: &[Card],
    board_size: usize,
    num_simulations: usize,
) -> f64 {
    let board_size = board_size.min(board.len()).min(5);

    let mut dead: CardMask = 0;
    dead = add_to_mask(dead, hero[0]);
    dead = add_to_mask(dead, hero[1]);
    dead = add_to_mask(dead, villain[0]);
    dead = add_to_mask(dead, villain[1]);
    for &c in &board[..board_size] {
        dead = add_to_mask(dead, c);
    }
    if dead.count_ones() as usize != 4 + board_size {
        return 0.5;
    }

    let cards_needed = 5 - board_size;
    if cards_needed == 0 {
        let hero_rank = evaluate(hero, board, 5);
        let villain_rank = evaluate(villain, board, 5);
        return if hero_rank > villain_rank {
            1.0
        } else if hero_rank < villain_rank {
            0.0
        } else {
            0.5
        };
    }

    let mut deck = remaining_deck(dead);
    let deck_size = deck.len();
    let mut rng = rand::thread_rng();

    let mut wins = 0u32;
    let mut ties = 0u32;
    let mut full_board = [0 as Card; 5];
    full_board[..board_size].copy_from_slice(&board[..board_size]);

    for _ in 0..num_simulations {
        for i in 0..cards_needed {
            let j = rng.gen_range(i..deck_size);
            deck.swap(i, j);
        }
        full_board[board_size..].copy_from_slice(&deck[..cards_needed]);

        let hero_rank = evaluate(hero, &full_board, 5);
        let villain_rank = evaluate(villain, &full_board, 5);
        if hero_rank > villain_rank {
            wins += 1;
        } else if hero_rank == villain_rank {
            ties += 1;
        }
    }

    (wins as f64 + ties as f64 * 0.5) / num_simulations as f64
}
