//! Repository initialisation and listen-address configuration.

use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use serde_json::{Map, Value};
use tempfile::Builder;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::{debug, info};

use orion_config::EndpointConfig;

const REPO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::repo");

/// Name of the daemon's configuration file inside the repository.
pub const REPO_CONFIG_FILE: &str = "config";

/// Creates and configures the daemon's on-disk repository.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Creates the repository unless it already exists.
    async fn ensure_initialized(&self, repo_path: &Utf8Path) -> Result<(), RepositoryError>;

    /// Writes the listen addresses from `endpoints` into the repository
    /// configuration. Repeated calls with the same endpoints leave the same
    /// file behind.
    async fn ensure_configured(
        &self,
        repo_path: &Utf8Path,
        endpoints: &EndpointConfig,
    ) -> Result<(), RepositoryError>;
}

/// Errors raised while preparing the repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The repository directory could not be created.
    #[error("failed to create repository directory '{path}': {source}")]
    CreateDirectory {
        /// Repository path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The initialiser could not be started.
    #[error("failed to run '{binary} init': {source}")]
    InitLaunch {
        /// Daemon executable.
        binary: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The initialiser reported failure.
    #[error("'{binary} init' failed ({status}): {stderr}")]
    InitFailed {
        /// Daemon executable.
        binary: Utf8PathBuf,
        /// Exit status.
        status: ExitStatus,
        /// Captured diagnostics.
        stderr: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read repository configuration '{path}': {source}")]
    ReadConfig {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid JSON.
    #[error("repository configuration '{path}' is corrupt: {source}")]
    CorruptConfig {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The configuration file could not be replaced.
    #[error("failed to write repository configuration '{path}': {source}")]
    WriteConfig {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The blocking configuration task did not complete.
    #[error("repository configuration task failed: {source}")]
    Task {
        /// Join error from the blocking pool.
        #[source]
        source: JoinError,
    },
}

/// [`Repository`] backed by the daemon executable and its JSON config file.
#[derive(Debug, Clone)]
pub struct IpfsRepository {
    binary: Utf8PathBuf,
}

impl IpfsRepository {
    /// Uses `binary` for first-run initialisation.
    #[must_use]
    pub const fn new(binary: Utf8PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl Repository for IpfsRepository {
    async fn ensure_initialized(&self, repo_path: &Utf8Path) -> Result<(), RepositoryError> {
        let config_path = repo_path.join(REPO_CONFIG_FILE);
        let exists = tokio::fs::try_exists(&config_path)
            .await
            .map_err(|source| RepositoryError::ReadConfig {
                path: config_path.clone(),
                source,
            })?;
        if exists {
            debug!(target: REPO_TARGET, repo = %repo_path, "repository already initialised");
            return Ok(());
        }

        tokio::fs::create_dir_all(repo_path)
            .await
            .map_err(|source| RepositoryError::CreateDirectory {
                path: repo_path.to_path_buf(),
                source,
            })?;
        info!(target: REPO_TARGET, repo = %repo_path, "initialising repository");
        let output = Command::new(self.binary.as_std_path())
            .arg("init")
            .env("IPFS_PATH", repo_path.as_std_path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RepositoryError::InitLaunch {
                binary: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RepositoryError::InitFailed {
                binary: self.binary.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    async fn ensure_configured(
        &self,
        repo_path: &Utf8Path,
        endpoints: &EndpointConfig,
    ) -> Result<(), RepositoryError> {
        let repo = repo_path.to_path_buf();
        let addresses = ListenAddresses::from(endpoints);
        tokio::task::spawn_blocking(move || write_addresses(&repo, &addresses))
            .await
            .map_err(|source| RepositoryError::Task { source })?
    }
}

/// Address values written under the `Addresses` key.
#[derive(Debug, Clone)]
struct ListenAddresses {
    api: String,
    gateway: String,
    swarm: Vec<String>,
}

impl From<&EndpointConfig> for ListenAddresses {
    fn from(endpoints: &EndpointConfig) -> Self {
        Self {
            api: endpoints.api().to_string(),
            gateway: endpoints.gateway().to_string(),
            swarm: endpoints.swarm().iter().map(ToString::to_string).collect(),
        }
    }
}

fn write_addresses(repo: &Utf8Path, addresses: &ListenAddresses) -> Result<(), RepositoryError> {
    let config_path = repo.join(REPO_CONFIG_FILE);
    let read_error = |source| RepositoryError::ReadConfig {
        path: config_path.clone(),
        source,
    };
    let dir = Dir::open_ambient_dir(repo, ambient_authority()).map_err(read_error)?;
    let raw = dir.read_to_string(REPO_CONFIG_FILE).map_err(read_error)?;
    let mut document: Value =
        serde_json::from_str(&raw).map_err(|source| RepositoryError::CorruptConfig {
            path: config_path.clone(),
            source,
        })?;

    apply_addresses(&mut document, addresses);

    let mut rendered =
        serde_json::to_vec_pretty(&document).map_err(|source| RepositoryError::CorruptConfig {
            path: config_path.clone(),
            source,
        })?;
    rendered.push(b'\n');
    if rendered == raw.as_bytes() {
        debug!(target: REPO_TARGET, file = %config_path, "listen addresses unchanged");
        return Ok(());
    }
    atomic_write(repo, &rendered).map_err(|source| RepositoryError::WriteConfig {
        path: config_path.clone(),
        source,
    })?;
    info!(
        target: REPO_TARGET,
        file = %config_path,
        api = %addresses.api,
        gateway = %addresses.gateway,
        "listen addresses written"
    );
    Ok(())
}

/// Sets `Addresses.API`, `Addresses.Gateway` and `Addresses.Swarm`, leaving
/// every other key untouched.
fn apply_addresses(document: &mut Value, addresses: &ListenAddresses) {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    let Value::Object(root) = document else {
        return;
    };
    let section = root
        .entry("Addresses")
        .or_insert_with(|| Value::Object(Map::new()));
    if !section.is_object() {
        *section = Value::Object(Map::new());
    }
    if let Value::Object(fields) = section {
        fields.insert("API".to_owned(), Value::from(addresses.api.clone()));
        fields.insert("Gateway".to_owned(), Value::from(addresses.gateway.clone()));
        fields.insert("Swarm".to_owned(), Value::from(addresses.swarm.clone()));
    }
}

fn atomic_write(repo: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let mut builder = Builder::new();
    builder.prefix(".config");
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o600));
    }
    let mut file = builder.tempfile_in(repo)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(repo.join(REPO_CONFIG_FILE))
        .map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_config::{default_api_address, default_gateway_address, swarm_addresses};
    use rstest::{fixture, rstest};
    use std::fs;
    use tempfile::TempDir;

    struct RepoFixture {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn repo() -> RepoFixture {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        fs::write(
            path.join(REPO_CONFIG_FILE),
            r#"{"Identity":{"PeerID":"QmSelf"},"Addresses":{"API":"/ip4/127.0.0.1/tcp/5001","Announce":[]}}"#,
        )
        .expect("seed config");
        RepoFixture { _dir: dir, path }
    }

    fn alternate_endpoints(repo: &Utf8Path) -> EndpointConfig {
        EndpointConfig::new(
            default_api_address(),
            default_gateway_address(),
            swarm_addresses(4001),
            repo.to_path_buf(),
            Utf8PathBuf::from("/nonexistent/ipfs"),
        )
        .alternate()
        .expect("alternate endpoints")
    }

    fn read_config(repo: &Utf8Path) -> Value {
        let raw = fs::read_to_string(repo.join(REPO_CONFIG_FILE)).expect("read config");
        serde_json::from_str(&raw).expect("parse config")
    }

    #[rstest]
    #[tokio::test]
    async fn configure_sets_addresses_and_keeps_other_keys(repo: RepoFixture) {
        let endpoints = alternate_endpoints(&repo.path);
        IpfsRepository::new(Utf8PathBuf::from("/nonexistent/ipfs"))
            .ensure_configured(&repo.path, &endpoints)
            .await
            .expect("configure");
        let config = read_config(&repo.path);
        assert_eq!(config["Addresses"]["API"], "/ip4/127.0.0.1/tcp/5101");
        assert_eq!(config["Addresses"]["Gateway"], "/ip4/127.0.0.1/tcp/8180");
        assert_eq!(
            config["Addresses"]["Swarm"],
            serde_json::json!(["/ip4/0.0.0.0/tcp/4101", "/ip6/::/tcp/4101"])
        );
        assert_eq!(config["Addresses"]["Announce"], serde_json::json!([]));
        assert_eq!(config["Identity"]["PeerID"], "QmSelf");
    }

    #[rstest]
    #[tokio::test]
    async fn configure_twice_matches_configure_once(repo: RepoFixture) {
        let endpoints = alternate_endpoints(&repo.path);
        let repository = IpfsRepository::new(Utf8PathBuf::from("/nonexistent/ipfs"));
        repository
            .ensure_configured(&repo.path, &endpoints)
            .await
            .expect("first configure");
        let once = fs::read(repo.path.join(REPO_CONFIG_FILE)).expect("read once");
        repository
            .ensure_configured(&repo.path, &endpoints)
            .await
            .expect("second configure");
        let twice = fs::read(repo.path.join(REPO_CONFIG_FILE)).expect("read twice");
        assert_eq!(once, twice);
    }

    #[rstest]
    #[tokio::test]
    async fn initialise_skips_existing_repository(repo: RepoFixture) {
        // The binary does not exist, so reaching `init` would fail.
        IpfsRepository::new(Utf8PathBuf::from("/nonexistent/ipfs"))
            .ensure_initialized(&repo.path)
            .await
            .expect("existing repository is left alone");
    }

    #[tokio::test]
    async fn initialise_reports_missing_binary() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("fresh")).expect("utf8 path");
        let error = IpfsRepository::new(Utf8PathBuf::from("/nonexistent/ipfs"))
            .ensure_initialized(&path)
            .await
            .expect_err("init must fail");
        assert!(matches!(error, RepositoryError::InitLaunch { .. }));
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn corrupt_configuration_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        fs::write(path.join(REPO_CONFIG_FILE), "not json").expect("seed");
        let error = IpfsRepository::new(Utf8PathBuf::from("ipfs"))
            .ensure_configured(&path, &alternate_endpoints(&path))
            .await
            .expect_err("corrupt config");
        assert!(matches!(error, RepositoryError::CorruptConfig { .. }));
    }
}
