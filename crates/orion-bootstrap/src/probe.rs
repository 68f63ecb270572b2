//! Detection of a daemon already answering on the API address.

use tracing::{debug, info, warn};

use crate::api::NodeApi;

const PROBE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::probe");

/// Asks the API for its version, returning `None` when nothing usable
/// answers.
///
/// Connection refusal and timeouts are the normal case on a clean machine.
/// Other failures (error statuses, malformed bodies) are treated the same way
/// so a misbehaving third-party service cannot block startup.
pub async fn probe_running_api(api: &dyn NodeApi) -> Option<String> {
    match api.version().await {
        Ok(version) => {
            info!(target: PROBE_TARGET, %version, "existing daemon detected");
            Some(version)
        }
        Err(error) if error.is_unreachable() => {
            debug!(target: PROBE_TARGET, error = %error, "no daemon listening");
            None
        }
        Err(error) => {
            warn!(
                target: PROBE_TARGET,
                error = %error,
                "API address answered unexpectedly; treating as not running"
            );
            None
        }
    }
}
