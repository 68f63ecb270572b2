//! Fakes and harness shared by the sequence suites.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::runtime::{Builder, Runtime};

use orion_config::{
    EndpointConfig, Multiaddr, default_api_address, default_gateway_address, swarm_addresses,
};

use crate::api::{ApiConnector, ApiError, NodeApi};
use crate::chooser::{FixedChooser, NodeChoice, NodeChooser};
use crate::error::StartupFailure;
use crate::peers::{DirectoryError, PeerAddress, PeerDirectory};
use crate::process::{DaemonHandle, OwnedDaemon, SpawnError, Supervisor};
use crate::progress::{ProgressEvent, ProgressListener};
use crate::readiness::ReadinessPolicy;
use crate::repo::{Repository, RepositoryError};
use crate::sequence::{Collaborators, Sequencer, SequencerSettings, StartupOutcome, shutdown};
use crate::stage::Stage;

pub const EXPECTED_VERSION: &str = "0.4.19";
pub const SPAWNED_PID: u32 = 4242;

pub fn default_endpoints() -> EndpointConfig {
    EndpointConfig::new(
        default_api_address(),
        default_gateway_address(),
        swarm_addresses(4001),
        Utf8PathBuf::from("/tmp/orion-tests/ipfs-repo"),
        Utf8PathBuf::from("ipfs"),
    )
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("test state mutex poisoned")
}

/// Shared behaviour and call log for every fake API client.
#[derive(Default)]
pub struct NodeState {
    /// Version reported on the default API address, if a daemon runs there.
    pub existing_version: Option<String>,
    /// Whether identity checks succeed.
    pub api_never_ready: bool,
    pub failing_connects: BTreeSet<PeerAddress>,
    pub failing_persists: BTreeSet<PeerAddress>,
    pub probed: Vec<String>,
    pub identity_checks: usize,
    pub connects: Vec<PeerAddress>,
    pub persists: Vec<PeerAddress>,
}

/// [`ApiConnector`] handing out clients that share one [`NodeState`].
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<NodeState>>,
}

impl FakeConnector {
    pub fn update(&self, change: impl FnOnce(&mut NodeState)) {
        change(&mut lock(&self.state));
    }

    pub fn read<R>(&self, view: impl FnOnce(&NodeState) -> R) -> R {
        view(&lock(&self.state))
    }
}

impl ApiConnector for FakeConnector {
    fn connect(&self, address: &Multiaddr) -> Result<Arc<dyn NodeApi>, ApiError> {
        Ok(Arc::new(FakeNode {
            address: address.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeNode {
    address: Multiaddr,
    state: Arc<Mutex<NodeState>>,
}

impl FakeNode {
    fn silent(&self) -> ApiError {
        ApiError::TimedOut {
            address: self.address.to_string(),
        }
    }

    fn rejected(&self, message: &str) -> ApiError {
        ApiError::Rejected {
            address: self.address.to_string(),
            status: 500,
            message: message.to_owned(),
        }
    }
}

#[async_trait]
impl NodeApi for FakeNode {
    async fn version(&self) -> Result<String, ApiError> {
        let mut state = lock(&self.state);
        state.probed.push(self.address.to_string());
        match &state.existing_version {
            Some(version) if self.address == default_api_address() => Ok(version.clone()),
            _ => Err(self.silent()),
        }
    }

    async fn identity(&self) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.identity_checks += 1;
        if state.api_never_ready {
            Err(self.silent())
        } else {
            Ok(())
        }
    }

    async fn swarm_connect(&self, peer: &PeerAddress) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.connects.push(peer.clone());
        if state.failing_connects.contains(peer) {
            return Err(self.rejected("dial backoff"));
        }
        Ok(())
    }

    async fn bootstrap_add(&self, peer: &PeerAddress) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.persists.push(peer.clone());
        if state.failing_persists.contains(peer) {
            return Err(self.rejected("invalid bootstrap address"));
        }
        Ok(())
    }
}

/// Repository call observed by [`RecordingRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Initialized(Utf8PathBuf),
    Configured { repo: Utf8PathBuf, api: String },
}

#[derive(Default)]
pub struct RecordingRepository {
    calls: Mutex<Vec<RepoCall>>,
    fail_configure: Mutex<bool>,
}

impl RecordingRepository {
    pub fn calls(&self) -> Vec<RepoCall> {
        lock(&self.calls).clone()
    }

    pub fn fail_configure(&self) {
        *lock(&self.fail_configure) = true;
    }
}

#[async_trait]
impl Repository for RecordingRepository {
    async fn ensure_initialized(&self, repo_path: &Utf8Path) -> Result<(), RepositoryError> {
        lock(&self.calls).push(RepoCall::Initialized(repo_path.to_path_buf()));
        Ok(())
    }

    async fn ensure_configured(
        &self,
        repo_path: &Utf8Path,
        endpoints: &EndpointConfig,
    ) -> Result<(), RepositoryError> {
        lock(&self.calls).push(RepoCall::Configured {
            repo: repo_path.to_path_buf(),
            api: endpoints.api().to_string(),
        });
        if *lock(&self.fail_configure) {
            return Err(RepositoryError::WriteConfig {
                path: repo_path.join("config"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSupervisor {
    spawns: Mutex<Vec<EndpointConfig>>,
    terminations: Mutex<Vec<Option<u32>>>,
    missing_binary: Mutex<bool>,
}

impl RecordingSupervisor {
    pub fn spawns(&self) -> Vec<EndpointConfig> {
        lock(&self.spawns).clone()
    }

    pub fn terminations(&self) -> Vec<Option<u32>> {
        lock(&self.terminations).clone()
    }

    pub fn missing_binary(&self) {
        *lock(&self.missing_binary) = true;
    }
}

#[async_trait]
impl Supervisor for RecordingSupervisor {
    async fn spawn(&self, endpoints: &EndpointConfig) -> Result<DaemonHandle, SpawnError> {
        lock(&self.spawns).push(endpoints.clone());
        if *lock(&self.missing_binary) {
            return Err(SpawnError::BinaryNotFound {
                binary: endpoints.binary_path().to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        Ok(DaemonHandle::Owned(OwnedDaemon::detached(SPAWNED_PID)))
    }

    async fn terminate(&self, daemon: &mut DaemonHandle) {
        lock(&self.terminations).push(daemon.pid());
    }
}

/// Directory returning a fixed list or a fixed failure.
pub struct FakeDirectory {
    peers: Mutex<Option<Vec<String>>>,
    fetches: Mutex<usize>,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self {
            peers: Mutex::new(Some(Vec::new())),
            fetches: Mutex::new(0),
        }
    }
}

impl FakeDirectory {
    pub fn serve(&self, peers: &[&str]) {
        *lock(&self.peers) = Some(peers.iter().map(|peer| (*peer).to_owned()).collect());
    }

    pub fn go_offline(&self) {
        *lock(&self.peers) = None;
    }

    pub fn fetches(&self) -> usize {
        *lock(&self.fetches)
    }
}

#[async_trait]
impl PeerDirectory for FakeDirectory {
    async fn fetch_peers(&self) -> Result<BTreeSet<PeerAddress>, DirectoryError> {
        *lock(&self.fetches) += 1;
        lock(&self.peers)
            .as_ref()
            .map(|peers| peers.iter().map(PeerAddress::new).collect())
            .ok_or_else(|| DirectoryError::Status {
                url: String::from("https://directory.invalid/peers.txt"),
                status: 503,
            })
    }
}

/// Listener notification captured for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Stage(Stage),
    Progress(ProgressEvent),
    Ready(String),
    Failed(StartupFailure),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ListenerEvent> {
        lock(&self.events).clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ListenerEvent::Stage(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ListenerEvent::Progress(progress) => Some(progress.percentage),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<StartupFailure> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ListenerEvent::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ListenerEvent::Ready(_)))
            .count()
    }

    fn record(&self, event: ListenerEvent) {
        lock(&self.events).push(event);
    }
}

impl ProgressListener for RecordingListener {
    fn stage_entered(&self, stage: Stage) {
        self.record(ListenerEvent::Stage(stage));
    }

    fn progress(&self, event: &ProgressEvent) {
        self.record(ListenerEvent::Progress(event.clone()));
    }

    fn ready(&self, endpoints: &EndpointConfig) {
        self.record(ListenerEvent::Ready(endpoints.api().to_string()));
    }

    fn failed(&self, failure: &StartupFailure) {
        self.record(ListenerEvent::Failed(failure.clone()));
    }
}

/// Asserts `stages` follows the canonical order without revisiting any stage,
/// with `Failed` allowed only as the final entry.
pub fn assert_monotonic(stages: &[Stage]) {
    let mut last = None;
    for (index, stage) in stages.iter().enumerate() {
        if *stage == Stage::Failed {
            assert_eq!(index + 1, stages.len(), "Failed must be terminal: {stages:?}");
            continue;
        }
        let position = stage.position();
        assert!(position > last, "stage order regressed: {stages:?}");
        last = position;
    }
}

/// One startup run wired to recording fakes.
pub struct TestWorld {
    pub node: FakeConnector,
    pub repository: Arc<RecordingRepository>,
    pub supervisor: Arc<RecordingSupervisor>,
    pub directory: Arc<FakeDirectory>,
    pub listener: Arc<RecordingListener>,
    chooser: Arc<dyn NodeChooser>,
    readiness: ReadinessPolicy,
    outcome: Option<StartupOutcome>,
    runtime: Runtime,
}

impl TestWorld {
    pub fn new() -> Self {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("test runtime");
        Self {
            node: FakeConnector::default(),
            repository: Arc::new(RecordingRepository::default()),
            supervisor: Arc::new(RecordingSupervisor::default()),
            directory: Arc::new(FakeDirectory::default()),
            listener: Arc::new(RecordingListener::default()),
            chooser: Arc::new(FixedChooser::new(NodeChoice::Reject)),
            readiness: ReadinessPolicy {
                timeout: Duration::from_secs(30),
                interval: Duration::from_millis(500),
            },
            outcome: None,
            runtime,
        }
    }

    pub fn use_chooser(&mut self, chooser: Arc<dyn NodeChooser>) {
        self.chooser = chooser;
    }

    pub fn choose(&mut self, choice: NodeChoice) {
        self.use_chooser(Arc::new(FixedChooser::new(choice)));
    }

    pub fn sequencer(&self) -> Sequencer {
        let collaborators = Collaborators {
            api: Arc::new(self.node.clone()),
            repository: self.repository.clone(),
            supervisor: self.supervisor.clone(),
            directory: self.directory.clone(),
            chooser: Arc::clone(&self.chooser),
            listener: self.listener.clone(),
        };
        let settings = SequencerSettings {
            expected_version: EXPECTED_VERSION.to_owned(),
            readiness: self.readiness,
        };
        Sequencer::new(collaborators, settings, default_endpoints())
    }

    pub fn run(&mut self) {
        let sequencer = self.sequencer();
        self.outcome = Some(self.runtime.block_on(sequencer.run()));
    }

    pub fn shut_down(&mut self) {
        let daemon = self.outcome.take().and_then(StartupOutcome::into_daemon);
        let supervisor = Arc::clone(&self.supervisor);
        self.runtime
            .block_on(async move { shutdown(supervisor.as_ref(), daemon).await });
    }

    pub fn outcome(&self) -> Option<&StartupOutcome> {
        self.outcome.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
