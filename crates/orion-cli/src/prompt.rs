//! Terminal prompt for an already-running daemon.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

use orion_bootstrap::{ExistingNode, NodeChoice, NodeChooser};
use orion_config::ExistingNodePolicy;

/// [`NodeChooser`] honouring the configured [`ExistingNodePolicy`].
///
/// `ask` prompts on the terminal; the other policies answer without asking.
#[derive(Debug, Clone, Copy)]
pub struct PolicyChooser {
    policy: ExistingNodePolicy,
}

impl PolicyChooser {
    /// Builds a chooser for `policy`.
    #[must_use]
    pub const fn new(policy: ExistingNodePolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl NodeChooser for PolicyChooser {
    async fn choose(&self, node: &ExistingNode) -> NodeChoice {
        match self.policy {
            ExistingNodePolicy::Adopt => NodeChoice::Adopt,
            ExistingNodePolicy::Reject => NodeChoice::Reject,
            ExistingNodePolicy::Ask => {
                let question = render_question(node);
                let answered = tokio::task::spawn_blocking(move || {
                    let stdin = io::stdin();
                    ask(&question, &mut stdin.lock(), &mut io::stderr())
                })
                .await;
                answered.unwrap_or_else(|error| {
                    warn!(error = %error, "prompt task failed; running a private daemon");
                    NodeChoice::Reject
                })
            }
        }
    }
}

/// Question shown when a daemon is already running.
#[must_use]
pub fn render_question(node: &ExistingNode) -> String {
    let mut question = String::from(
        "An IPFS instance is already up!\n\n\
         Would you like Orion to connect to the available node, instead of using its own?",
    );
    if let Some(advisory) = node.advisory() {
        question.push_str("\n\n");
        question.push_str(&advisory);
    }
    question
}

/// Writes `question` to `output` and reads one answer from `input`.
///
/// An empty answer means yes; end of input or a read error means no.
pub fn ask<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> NodeChoice {
    if write!(output, "{question} [Y/n] ").and_then(|()| output.flush()).is_err() {
        return NodeChoice::Reject;
    }
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => NodeChoice::Reject,
        Ok(_) => parse_answer(&line),
    }
}

/// Interprets a typed answer. Anything other than an explicit no adopts.
#[must_use]
pub fn parse_answer(answer: &str) -> NodeChoice {
    match answer.trim().to_ascii_lowercase().as_str() {
        "n" | "no" => NodeChoice::Reject,
        _ => NodeChoice::Adopt,
    }
}
