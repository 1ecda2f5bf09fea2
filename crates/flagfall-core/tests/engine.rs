//! Integration tests for the public engine surface.
//!
//! Everything here goes through the command interface and the wire types,
//! the way a server or client embedding the engine would.

use flagfall_core::{run_selfplay, GameEngine, Rules, SelfPlayConfig, VictoryCondition};
use flagfall_protocol::{
    deserialize_replay, serialize_replay, snapshot_hash, Command, Phase, PlayerId,
};

fn into_action_phase(engine: &mut GameEngine) {
    engine
        .apply(Command::ConfirmPlacement {
            player: PlayerId::ONE,
        })
        .unwrap();
    engine
        .apply(Command::ConfirmPlacement {
            player: PlayerId::TWO,
        })
        .unwrap();
    engine
        .apply(Command::Ready {
            player: PlayerId::ONE,
        })
        .unwrap();
    assert_eq!(engine.state().phase, Phase::Action);
}

#[test]
fn replay_round_trips_through_the_wire() {
    let mut engine = GameEngine::new(Rules::standard(), 9);
    into_action_phase(&mut engine);

    // One real move so the replay carries more than phase bookkeeping.
    let (unit, to) = {
        let state = engine.state();
        state
            .units
            .iter()
            .filter(|u| u.owner == PlayerId::ONE)
            .find_map(|u| {
                [u.pos.offset(0, 1), u.pos.offset(1, 0), u.pos.offset(-1, 0)]
                    .into_iter()
                    .find(|&c| state.is_free_for_unit(c))
                    .map(|c| (u.id, c))
            })
            .expect("some opening move exists")
    };
    engine.apply(Command::Move { unit, to }).unwrap();
    engine.apply(Command::EndUnitTurn { unit }).unwrap();

    let bytes = serialize_replay(&engine.replay()).unwrap();
    let decoded = deserialize_replay(&bytes).unwrap();
    let rebuilt = GameEngine::from_replay(Rules::standard(), &decoded);

    assert_eq!(
        snapshot_hash(&engine.snapshot()).unwrap(),
        snapshot_hash(&rebuilt.snapshot()).unwrap()
    );
}

#[test]
fn yaml_overrides_reach_the_board() {
    let rules = Rules::load_yaml("initial_energy: 80\ngrid_rows: 9\n").unwrap();
    let engine = GameEngine::new(rules, 3);
    let state = engine.state();
    assert_eq!(state.player(PlayerId::ONE).energy, 80);
    assert_eq!(state.board.rows(), 9);
}

#[test]
fn timeouts_alone_run_a_full_round() {
    let mut engine = GameEngine::new(Rules::standard(), 21);
    for _ in 0..2000 {
        engine.tick();
        if engine.state().round >= 2 {
            break;
        }
    }
    assert_eq!(engine.state().round, 2);
    assert_eq!(engine.state().phase, Phase::Thinking);
}

#[test]
fn selfplay_reaches_a_verdict() {
    let config = SelfPlayConfig {
        seed: 5,
        max_rounds: 50,
        ..SelfPlayConfig::default()
    };
    let result = run_selfplay(Rules::standard(), &config);
    assert_eq!(result.metrics.player_stats.len(), 2);
    assert!(result.metrics.commands_accepted > 0);
    if result.victory != VictoryCondition::RoundLimit {
        assert!(result.metrics.rounds_played <= config.max_rounds + 1);
    }
}
