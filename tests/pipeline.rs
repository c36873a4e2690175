use std::fs;

use fleet_experiment::{dump::dump_path, prelude::*};

mod common;

/// Program under test wins every game it plays.
struct AlwaysWins;

impl SessionRunner for AlwaysWins {
    fn run_session(&mut self, session: &Session<'_>) -> anyhow::Result<SessionScore> {
        Ok(match session.color {
            Color::Black => SessionScore {
                black: session.games,
                white: 0,
            },
            Color::White => SessionScore {
                black: 0,
                white: session.games,
            },
        })
    }
}

#[test]
fn missing_dump_is_reported_and_counts_for_nothing() {
    common::init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = common::fleet_config(dir.path());
    fs::write(
        dump_path(dir.path(), "m1"),
        "5 games * 2 colors * 1 conditions = 10 total games per machine\n\
         CONDITION: c=0.5\n\
         Tested program black\n\
         Black 5, White 0\n\
         Tested program white\n\
         Black 0, White 5\n\
         DONE\n",
    )
    .unwrap();

    let collation = collate(&config, &[]);
    let report = collation.to_string();
    let lines = report.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "m1 finished, wins: 1.000 = 10/10");
    assert!(lines[1].starts_with("m2 could not be opened"), "{report}");
    assert_eq!(lines[2], "c=0.5: 1.000 = 10/10");
    assert_eq!(lines[3], "overall: 1.000 = 10/10");
}

#[test]
fn excluded_machine_is_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fleet_config(dir.path());
    fs::write(
        dump_path(dir.path(), "m1"),
        "CONDITION: c=0.5\nBlack 4, White 1\nBlack 2, White 3\nDONE\n",
    )
    .unwrap();
    fs::write(
        dump_path(dir.path(), "m2"),
        "CONDITION: c=0.5\nBlack 0, White 5\n",
    )
    .unwrap();

    let all = collate(&config, &[]);
    assert_eq!(all.condition("c=0.5"), Tally { wins: 7, runs: 15 });
    assert_eq!(
        all.machine("m2").map(|m| m.status.clone()),
        Some(MachineStatus::NotFinished)
    );

    let without_m2 = collate(&config, &["m2".to_string(), "elsewhere".to_string()]);
    assert!(without_m2.machine("m2").is_none());
    assert_eq!(without_m2.condition("c=0.5"), Tally { wins: 7, runs: 10 });
    assert_eq!(without_m2.overall(), without_m2.condition("c=0.5"));
}

#[test]
fn worker_dumps_are_collated() {
    common::init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::fleet_config(dir.path());
    config.conditions = vec!["c=0.5".to_string(), "c=0.2".to_string()];

    for machine in ["m1", "m2"] {
        WorkerLoop::new(machine, &config, AlwaysWins)
            .unwrap()
            .run_to_results_dir(dir.path())
            .unwrap();
    }

    let collation = collate(&config, &[]);
    for report in collation.machines() {
        assert_eq!(report.status, MachineStatus::Finished);
        assert_eq!(report.tally, Tally { wins: 20, runs: 20 });
    }
    assert_eq!(
        collation.conditions().collect::<Vec<_>>(),
        vec![
            ("c=0.5", Tally { wins: 20, runs: 20 }),
            ("c=0.2", Tally { wins: 20, runs: 20 }),
        ]
    );
    assert_eq!(collation.overall().runs, config.total_games().unwrap());
}
