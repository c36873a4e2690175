use std::{cell::RefCell, fs, path::PathBuf};

use anyhow::bail;
use fleet_experiment::{
    dispatcher::{batch_path, CONFIG_SNAPSHOT},
    dump::dump_path,
    prelude::*,
};

mod common;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Reset(String),
    Launch(String),
}

/// Records calls instead of reaching machines. Launching writes a fresh dump the way a worker
/// would, after checking that nothing of the previous run is left.
struct FakeFleet {
    results_dir: PathBuf,
    unreachable: Vec<String>,
    calls: RefCell<Vec<Call>>,
}

impl FakeFleet {
    fn new(results_dir: PathBuf) -> Self {
        Self {
            results_dir,
            unreachable: vec![],
            calls: RefCell::new(vec![]),
        }
    }
}

impl RemoteExecutor for &FakeFleet {
    fn execute(
        &self,
        machine: &str,
        user: &str,
        command: &str,
        blocking: bool,
    ) -> anyhow::Result<Option<String>> {
        assert_eq!(user, "drake");
        if self.unreachable.iter().any(|m| m == machine) {
            bail!("ssh: connect to host {machine} port 22: No route to host");
        }
        let dump = dump_path(&self.results_dir, machine);
        if blocking {
            assert_eq!(command, "pkill -KILL -u drake");
            self.calls.borrow_mut().push(Call::Reset(machine.to_string()));
            Ok(Some(String::new()))
        } else {
            assert!(!dump.exists(), "stale dump of {machine} still there at launch");
            assert!(command.ends_with(&format!(
                "> {} 2>&1",
                batch_path(&self.results_dir, machine).display()
            )));
            fs::write(&dump, format!("CONDITION: c=0.5\n# {machine}\n")).unwrap();
            self.calls.borrow_mut().push(Call::Launch(machine.to_string()));
            Ok(None)
        }
    }
}

#[test]
fn resets_then_cleans_then_launches() {
    common::init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = common::fleet_config(dir.path());
    for machine in ["m1", "m2"] {
        fs::write(dump_path(dir.path(), machine), "DONE\n").unwrap();
        fs::write(batch_path(dir.path(), machine), "old output\n").unwrap();
    }

    let fleet = FakeFleet::new(dir.path().to_path_buf());
    let settings = Configuration::new().with_verbose(false);
    let summary = Dispatcher::new(&config, &fleet, settings).dispatch().unwrap();

    assert_eq!(
        *fleet.calls.borrow(),
        vec![
            Call::Reset("m2".to_string()),
            Call::Reset("m1".to_string()),
            Call::Launch("m1".to_string()),
            Call::Launch("m2".to_string()),
        ]
    );
    assert_eq!(
        summary,
        DispatchSummary {
            reset: vec!["m2".to_string(), "m1".to_string()],
            reset_failed: vec![],
            removed: 4,
            launched: vec!["m1".to_string(), "m2".to_string()],
            launch_failed: vec![],
        }
    );
    let snapshot = fs::read_to_string(dir.path().join(CONFIG_SNAPSHOT)).unwrap();
    assert_eq!(FleetConfig::parse(&snapshot).unwrap(), config);
}

#[test]
fn unreachable_machine_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fleet_config(dir.path());
    let mut fleet = FakeFleet::new(dir.path().to_path_buf());
    fleet.unreachable.push("m2".to_string());

    let summary = Dispatcher::new(&config, &fleet, Configuration::new().with_verbose(false))
        .dispatch()
        .unwrap();

    assert_eq!(summary.reset, vec!["m1"]);
    assert_eq!(summary.reset_failed, vec!["m2"]);
    assert_eq!(summary.launched, vec!["m1"]);
    assert_eq!(summary.launch_failed, vec!["m2"]);
    assert!(dump_path(dir.path(), "m1").exists());
}

#[test]
fn dispatching_twice_keeps_only_the_latest_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fleet_config(dir.path());
    let settings = Configuration::new().with_verbose(false);

    let first = FakeFleet::new(dir.path().to_path_buf());
    Dispatcher::new(&config, &first, settings).dispatch().unwrap();
    let second = FakeFleet::new(dir.path().to_path_buf());
    let summary = Dispatcher::new(&config, &second, settings).dispatch().unwrap();

    // the two dumps of the first run
    assert_eq!(summary.removed, 2);
    assert_eq!(second.calls.borrow().len(), 4);
    let collation = collate(&config, &[]);
    assert!(collation
        .machines()
        .iter()
        .all(|m| m.status == MachineStatus::NotFinished));
}

#[test]
fn cleanup_failure_launches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    // a file where the results directory should be
    let blocker = dir.path().join("results");
    fs::write(&blocker, "").unwrap();
    let config = common::fleet_config(&blocker);

    let fleet = FakeFleet::new(blocker.clone());
    let result = Dispatcher::new(&config, &fleet, Configuration::new().with_verbose(false)).dispatch();

    assert!(result.is_err());
    assert!(fleet
        .calls
        .borrow()
        .iter()
        .all(|call| matches!(call, Call::Reset(_))));
}
