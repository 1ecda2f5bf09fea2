//! Batch self-play runner.
//!
//! Usage: flagfall-selfplay [--games N] [--seed S] [--max-rounds R] [--json]

use std::process::exit;

use flagfall_core::{run_batch_selfplay, Rules, SelfPlayConfig};

struct Args {
    games: u32,
    config: SelfPlayConfig,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        games: 10,
        config: SelfPlayConfig::default(),
        json: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--games" => args.games = parse_value(&flag, iter.next())?,
            "--seed" => args.config.seed = parse_value(&flag, iter.next())?,
            "--max-rounds" => args.config.max_rounds = parse_value(&flag, iter.next())?,
            "--json" => args.json = true,
            "--help" | "-h" => {
                println!("flagfall-selfplay [--games N] [--seed S] [--max-rounds R] [--json]");
                exit(0);
            }
            other => return Err(format!("unknown flag: {other}")),
        }
    }
    Ok(args)
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    value
        .ok_or_else(|| format!("{flag} needs a value"))?
        .parse()
        .map_err(|_| format!("{flag}: not a number"))
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            exit(2);
        }
    };

    let batch = run_batch_selfplay(Rules::standard(), &args.config, args.games);

    if args.json {
        match serde_json::to_string_pretty(&batch) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("serialization failed: {err}");
                exit(1);
            }
        }
        return;
    }

    let agg = &batch.aggregate;
    println!("games:            {}", batch.games_played);
    println!(
        "game length:      {:.1} rounds (std {:.1})",
        agg.avg_game_length, agg.std_game_length
    );
    println!(
        "win rates:        p1 {:.0}% / p2 {:.0}% (draws {:.0}%)",
        agg.win_rates.first().copied().unwrap_or(0.0) * 100.0,
        agg.win_rates.get(1).copied().unwrap_or(0.0) * 100.0,
        agg.draw_rate * 100.0
    );
    println!("balance:          {:.2}", agg.win_rate_balance);
    println!("kills per game:   {:.1}", agg.avg_kills);
    println!("mine triggers:    {:.1}", agg.avg_mine_triggers);
    for result in &batch.results {
        println!(
            "  seed {:>6}: {:?} in {} rounds ({} ms)",
            result.seed, result.victory, result.metrics.rounds_played, result.duration_ms
        );
    }
}
