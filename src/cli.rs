use std::io::{self, Write};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;

use crate::cards::{mask_of, parse_board};
use crate::cfr_engine::{CfrConfig, CfrEngine};
use crate::display::{board_display, print_error, strategy_table};
use crate::equity::calculate_equity;
use crate::error::{SolverError, SolverResult};
use crate::game_tree::BettingConfig;
use crate::ranges::combos_from_range;

#[derive(Parser)]
#[command(
    name = "postflop-cfr",
    version,
    about = "Heads-up postflop CFR solver — flat-array trees, external-sampling MCCFR."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a postflop spot and print the root strategy per hand
    Solve {
        /// Board cards, e.g. Ks7h2d
        #[arg(long)]
        board: String,
        /// OOP range, e.g. "TT+,AQs+,AKo"
        #[arg(long)]
        oop: String,
        /// IP range
        #[arg(long)]
        ip: String,
        /// Starting pot in chips
        #[arg(long, default_value_t = 100.0)]
        pot: f32,
        /// OOP stack behind
        #[arg(long, default_value_t = 100.0)]
        oop_stack: f32,
        /// IP stack behind
        #[arg(long, default_value_t = 100.0)]
        ip_stack: f32,
        /// CFR iterations
        #[arg(short = 'n', long, default_value_t = 300)]
        iterations: usize,
        /// Bet sizes as pot fractions, every street
        #[arg(long, default_value = "0.5,1.0")]
        bet_sizes: String,
        /// Raise sizes as (pot + to-call) fractions, every street
        #[arg(long, default_value = "1.0")]
        raise_sizes: String,
        /// Raise cap per street
        #[arg(long, default_value_t = 3)]
        max_raises: u8,
        /// Worker threads (0 = rayon default)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Emit the root strategies as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Monte-Carlo equity of one hand vs another
    Equity {
        /// Hero hole cards, e.g. AsKs
        hero: String,
        /// Villain hole cards, e.g. QdQh
        villain: String,
        /// Partial board (0, 3 or 4 cards)
        #[arg(long, default_value = "")]
        board: String,
        /// Simulation count
        #[arg(long, default_value_t = 10000)]
        sims: usize,
    },
}

#[derive(Serialize)]
struct SolveSummary {
    board: String,
    pot: f32,
    oop_stack: f32,
    ip_stack: f32,
    iterations: usize,
    node_count: usize,
    average_regret: f32,
    actions: Vec<String>,
    strategies: Vec<HandStrategy>,
}

#[derive(Serialize)]
struct HandStrategy {
    hand: String,
    frequencies: Vec<f32>,
}

pub fn run() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Solve {
            board,
            oop,
            ip,
            pot,
            oop_stack,
            ip_stack,
            iterations,
            bet_sizes,
            raise_sizes,
            max_raises,
            threads,
            json,
        } => run_solve(
            &board, &oop, &ip, pot, oop_stack, ip_stack, iterations, &bet_sizes, &raise_sizes,
            max_raises, threads, json,
        ),
        Commands::Equity {
            hero,
            villain,
            board,
            sims,
        } => run_equity(&hero, &villain, &board, sims),
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn parse_size_list(list: &str) -> SolverResult<Vec<f32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>()
                .map_err(|_| SolverError::InvalidBoardNotation(format!("bad size: {}", s)))
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn run_solve(
    board_str: &str,
    oop_range: &str,
    ip_range: &str,
    pot: f32,
    oop_stack: f32,
    ip_stack: f32,
    iterations: usize,
    bet_sizes: &str,
    raise_sizes: &str,
    max_raises: u8,
    threads: usize,
    json: bool,
) -> SolverResult<()> {
    let board = parse_board(board_str)?;
    let bets = parse_size_list(bet_sizes)?;
    let raises = parse_size_list(raise_sizes)?;

    let betting = BettingConfig {
        initial_pot: pot,
        oop_stack,
        ip_stack,
        flop_bet_sizes: bets.clone(),
        turn_bet_sizes: bets.clone(),
        river_bet_sizes: bets,
        flop_raise_sizes: raises.clone(),
        turn_raise_sizes: raises.clone(),
        river_raise_sizes: raises,
        max_raises,
    };

    let mut engine = CfrEngine::new(CfrConfig {
        num_threads: threads,
        ..CfrConfig::default()
    });
    engine.build_tree(&betting, &board)?;
    engine.set_board(&board)?;

    let board_mask = mask_of(&board);
    engine.set_oop_range(combos_from_range(oop_range, 1.0, board_mask)?)?;
    engine.set_ip_range(combos_from_range(ip_range, 1.0, board_mask)?)?;

    if !json {
        eprintln!(
            "  board {}  |  pot {:.0}  |  stacks {:.0}/{:.0}  |  {} nodes",
            board_display(&board),
            pot,
            oop_stack,
            ip_stack,
            engine.get_node_count(),
        );
    }

    engine.solve_with_progress(iterations, |done, total| {
        if !json {
            eprint!("\riteration: {} / {} ", done, total);
            io::stderr().flush().ok();
        }
    })?;
    if !json {
        eprintln!();
    }

    let root = engine
        .get_node_data(0)
        .ok_or(SolverError::TreeNotBuilt)?;
    let mut rows: Vec<(String, Vec<f32>)> = engine
        .get_node_hand_strategies(0)
        .into_iter()
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    if json {
        let summary = SolveSummary {
            board: board_display(&board),
            pot,
            oop_stack,
            ip_stack,
            iterations,
            node_count: engine.get_node_count(),
            average_regret: engine.get_average_regret(),
            actions: root.actions.clone(),
            strategies: rows
                .into_iter()
                .map(|(hand, weights)| {
                    let total: f32 = weights.iter().sum();
                    let frequencies = weights
                        .iter()
                        .map(|&w| if total > 0.0 { w / total } else { 0.0 })
                        .collect();
                    HandStrategy { hand, frequencies }
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} root strategy (OOP)  |  avg regret {:.4}",
        "GTO".bold(),
        engine.get_average_regret(),
    );
    println!("{}", strategy_table(&root.actions, &rows));
    Ok(())
}

fn run_equity(hero_str: &str, villain_str: &str, board_str: &str, sims: usize) -> SolverResult<()> {
    let hero_cards = parse_board(hero_str)?;
    let villain_cards = parse_board(villain_str)?;
    if hero_cards.len() != 2 || villain_cards.len() != 2 {
        return Err(SolverError::InvalidHandNotation(format!(
            "{} vs {}",
            hero_str, villain_str
        )));
    }
    let board = if board_str.is_empty() {
        Vec::new()
    } else {
        parse_board(board_str)?
    };

    let hero = [hero_cards[0], hero_cards[1]];
    let villain = [villain_cards[0], villain_cards[1]];
    let equity = calculate_equity(hero, villain, &board, board.len(), sims);

    println!(
        "  {} vs {}{}  |  equity {:.1}%  ({} sims)",
        hero_str.bold(),
        villain_str,
        if board.is_empty() {
            String::new()
        } else {
            format!("  on {}", board_display(&board))
        },
        equity * 100.0,
        sims,
    );
    Ok(())
}
