//! Behavioural tests for the startup sequence.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::chooser::NodeChoice;
use crate::error::FailureKind;
use crate::peers::PeerAddress;
use crate::sequence::StartupOutcome;

use super::support::{self, TestWorld, assert_monotonic};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("no daemon answers on the API address")]
fn given_no_daemon(world: &RefCell<TestWorld>) {
    world
        .borrow()
        .node
        .update(|state| state.existing_version = None);
}

#[given("a daemon answers with version {version}")]
fn given_existing_daemon(world: &RefCell<TestWorld>, version: String) {
    world
        .borrow()
        .node
        .update(|state| state.existing_version = Some(version));
}

#[given("the user adopts existing daemons")]
fn given_user_adopts(world: &RefCell<TestWorld>) {
    world.borrow_mut().choose(NodeChoice::Adopt);
}

#[given("the user declines existing daemons")]
fn given_user_declines(world: &RefCell<TestWorld>) {
    world.borrow_mut().choose(NodeChoice::Reject);
}

#[given("the directory lists {count} peers")]
fn given_directory_peers(world: &RefCell<TestWorld>, count: String) -> StepResult {
    let count: usize = count
        .parse()
        .map_err(|error| format!("invalid peer count '{count}': {error}"))?;
    let peers: Vec<String> = (1..=count)
        .map(|index| format!("/ip4/203.0.113.{index}/tcp/4001/ipfs/QmPeer{index}"))
        .collect();
    let borrowed: Vec<&str> = peers.iter().map(String::as_str).collect();
    world.borrow().directory.serve(&borrowed);
    Ok(())
}

#[given("the directory is unreachable")]
fn given_directory_offline(world: &RefCell<TestWorld>) {
    world.borrow().directory.go_offline();
}

#[given("the daemon API never becomes ready")]
fn given_api_never_ready(world: &RefCell<TestWorld>) {
    world
        .borrow()
        .node
        .update(|state| state.api_never_ready = true);
}

#[given("every peer refuses connections")]
fn given_peers_refuse(world: &RefCell<TestWorld>) {
    let current = world.borrow();
    let peers: Vec<PeerAddress> = (1..=16)
        .map(|index| PeerAddress::new(format!("/ip4/203.0.113.{index}/tcp/4001/ipfs/QmPeer{index}")))
        .collect();
    current.node.update(|state| {
        state.failing_connects = peers.iter().cloned().collect();
        state.failing_persists = peers.into_iter().collect();
    });
}

#[when("the startup sequence runs")]
fn when_sequence_runs(world: &RefCell<TestWorld>) {
    world.borrow_mut().run();
}

#[when("the application shuts down")]
fn when_application_shuts_down(world: &RefCell<TestWorld>) {
    world.borrow_mut().shut_down();
}

#[then("the sequence reaches ready")]
fn then_sequence_ready(world: &RefCell<TestWorld>) {
    let current = world.borrow();
    assert!(
        current.listener.failures().is_empty(),
        "unexpected failure: {:?}",
        current.listener.failures()
    );
    assert_eq!(current.listener.ready_count(), 1);
    assert_monotonic(&current.listener.stages());
}

#[then("the sequence fails with a timeout")]
fn then_sequence_times_out(world: &RefCell<TestWorld>) {
    let current = world.borrow();
    let failed = current
        .outcome()
        .and_then(StartupOutcome::failure)
        .expect("failed outcome");
    assert_eq!(failed.kind, FailureKind::Timeout);
    assert_eq!(current.listener.failures().len(), 1);
    assert_eq!(current.listener.ready_count(), 0);
}

#[then("the daemon was spawned once with API address {address}")]
fn then_spawned_with(world: &RefCell<TestWorld>, address: String) -> StepResult {
    let spawns = world.borrow().supervisor.spawns();
    match spawns.as_slice() {
        [only] if only.api().to_string() == address => Ok(()),
        other => Err(format!("expected one spawn on {address}, got {other:?}")),
    }
}

#[then("no daemon was spawned")]
fn then_nothing_spawned(world: &RefCell<TestWorld>) {
    assert!(world.borrow().supervisor.spawns().is_empty());
}

#[then("no daemon was terminated")]
fn then_nothing_terminated(world: &RefCell<TestWorld>) {
    assert!(world.borrow().supervisor.terminations().is_empty());
}

#[then("the peer directory was never contacted")]
fn then_directory_untouched(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().directory.fetches(), 0);
}

#[then("progress ended at {percentage} percent")]
fn then_progress_ended(world: &RefCell<TestWorld>, percentage: String) -> StepResult {
    let expected: u8 = percentage
        .parse()
        .map_err(|error| format!("invalid percentage '{percentage}': {error}"))?;
    let percentages = world.borrow().listener.percentages();
    if percentages.last() == Some(&expected) {
        Ok(())
    } else {
        Err(format!("progress ended at {:?}", percentages.last()))
    }
}

#[scenario(path = "tests/features/startup_sequence.feature")]
fn startup_sequence(world: RefCell<TestWorld>) {
    let _ = world;
}
