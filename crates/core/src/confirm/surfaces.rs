use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::confirm::{ConfirmationSurface, Decision};
use crate::domain::preview::Preview;

/// Plays back a fixed list of decisions. Rejects once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedConfirmation {
    decisions: Arc<Mutex<VecDeque<Decision>>>,
    presented: Arc<Mutex<Vec<Preview>>>,
}

impl ScriptedConfirmation {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: Arc::new(Mutex::new(decisions.into_iter().collect())),
            presented: Arc::default(),
        }
    }

    pub fn presented(&self) -> Vec<Preview> {
        match self.presented.lock() {
            Ok(presented) => presented.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ConfirmationSurface for ScriptedConfirmation {
    async fn present(&self, _run_id: &str, preview: &Preview) {
        match self.presented.lock() {
            Ok(mut presented) => presented.push(preview.clone()),
            Err(poisoned) => poisoned.into_inner().push(preview.clone()),
        }
    }

    async fn decide(&self, run_id: &str) -> Decision {
        let next = match self.decisions.lock() {
            Ok(mut decisions) => decisions.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| {
            warn!(run_id, "decision script exhausted, rejecting");
            Decision::Reject
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationSurface for AutoApprove {
    async fn present(&self, _run_id: &str, _preview: &Preview) {}

    async fn decide(&self, _run_id: &str) -> Decision {
        Decision::Approve
    }
}

#[derive(Clone, Debug)]
pub struct PreviewPrompt {
    pub run_id: String,
    pub rendered: String,
    pub preview: Preview,
}

/// A decision addressed to one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedDecision {
    pub run_id: String,
    pub decision: Decision,
}

/// Host side of a [`ChannelConfirmation`].
pub struct ConfirmationHandle {
    pub prompts: mpsc::UnboundedReceiver<PreviewPrompt>,
    decisions: mpsc::Sender<RoutedDecision>,
}

impl ConfirmationHandle {
    /// Answers the prompt of `run_id`. Fails only once the surface is gone.
    pub async fn decide(
        &self,
        run_id: impl Into<String>,
        decision: Decision,
    ) -> Result<(), mpsc::error::SendError<RoutedDecision>> {
        self.decisions.send(RoutedDecision { run_id: run_id.into(), decision }).await
    }

    /// Another sender for hosts that answer from more than one task.
    pub fn decisions(&self) -> mpsc::Sender<RoutedDecision> {
        self.decisions.clone()
    }
}

type Inbox = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Decision>>>;

struct PendingRun {
    deliver: mpsc::UnboundedSender<Decision>,
    inbox: Inbox,
}

impl PendingRun {
    fn new() -> Self {
        let (deliver, inbox) = mpsc::unbounded_channel();
        Self { deliver, inbox: Arc::new(tokio::sync::Mutex::new(inbox)) }
    }
}

/// Confirmation driven by an external decision channel rather than a terminal.
///
/// One instance can serve many concurrent runs. Each decision names its run; whichever waiting
/// run reads a decision meant for another run forwards it to that run's inbox. Once every
/// [`ConfirmationHandle`] sender is dropped, waiting runs are rejected.
pub struct ChannelConfirmation {
    prompts: mpsc::UnboundedSender<PreviewPrompt>,
    incoming: tokio::sync::Mutex<mpsc::Receiver<RoutedDecision>>,
    pending: Mutex<HashMap<String, PendingRun>>,
}

impl ChannelConfirmation {
    pub fn new(buffer: usize) -> (Self, ConfirmationHandle) {
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        let (decision_tx, decision_rx) = mpsc::channel(buffer.max(1));
        let surface = Self {
            prompts: prompt_tx,
            incoming: tokio::sync::Mutex::new(decision_rx),
            pending: Mutex::default(),
        };
        (surface, ConfirmationHandle { prompts: prompt_rx, decisions: decision_tx })
    }

    /// Run ids still waiting on a decision.
    pub fn pending_runs(&self) -> Vec<String> {
        let mut runs: Vec<String> = self.pending().keys().cloned().collect();
        runs.sort();
        runs
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingRun>> {
        match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn inbox(&self, run_id: &str) -> Inbox {
        self.pending().entry(run_id.to_string()).or_insert_with(PendingRun::new).inbox.clone()
    }

    fn forward(&self, routed: RoutedDecision) {
        let pending = self.pending();
        let delivered = pending
            .get(&routed.run_id)
            .map(|run| run.deliver.send(routed.decision).is_ok())
            .unwrap_or(false);
        if !delivered {
            warn!(
                event_name = "workflow.confirmation.unrouted",
                run_id = %routed.run_id,
                "decision for a run that is not awaiting confirmation; dropped"
            );
        }
    }

    async fn next_incoming(&self) -> Option<RoutedDecision> {
        self.incoming.lock().await.recv().await
    }
}

#[async_trait]
impl ConfirmationSurface for ChannelConfirmation {
    async fn present(&self, run_id: &str, preview: &Preview) {
        self.inbox(run_id);
        let prompt = PreviewPrompt {
            run_id: run_id.to_string(),
            rendered: preview.render(),
            preview: preview.clone(),
        };
        if self.prompts.send(prompt).is_err() {
            warn!(run_id, "preview receiver dropped; nobody is watching this run");
        }
    }

    async fn decide(&self, run_id: &str) -> Decision {
        let slot = self.inbox(run_id);
        let mut inbox = slot.lock().await;

        let decision = loop {
            tokio::select! {
                Some(decision) = inbox.recv() => break decision,
                incoming = self.next_incoming() => match incoming {
                    Some(routed) if routed.run_id == run_id => break routed.decision,
                    Some(routed) => self.forward(routed),
                    None => {
                        warn!(run_id, "decision channel closed, treating as reject");
                        break Decision::Reject;
                    }
                },
            }
        };
        drop(inbox);

        if !matches!(decision, Decision::Edit { .. }) {
            self.pending().remove(run_id);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelConfirmation;
    use crate::confirm::{ConfirmationLoop, Decision};
    use crate::domain::intent::{FieldMap, Intent};
    use crate::domain::preview::Preview;
    use crate::preview::PreviewBuilder;

    fn contact(email: &str) -> Preview {
        let fields: FieldMap = [("email", email)].into_iter().collect();
        PreviewBuilder::default().build(Intent::CreateContact, &fields, "add contact")
    }

    #[tokio::test]
    async fn channel_surface_round_trips_prompts_and_decisions() {
        let (surface, mut handle) = ChannelConfirmation::new(4);
        let fields: FieldMap = [("deal_name", "Acme Deal"), ("amount", "5000")].into_iter().collect();
        let preview = PreviewBuilder::default().build(Intent::CreateDeal, &fields, "deal");

        let host = tokio::spawn(async move {
            let first = handle.prompts.recv().await.expect("initial prompt");
            assert!(first.rendered.contains("$5,000.00"));
            handle.decide(&first.run_id, Decision::edit("amount", "7500")).await.expect("send edit");

            let second = handle.prompts.recv().await.expect("prompt after edit");
            assert_eq!(second.preview.number("amount"), Some(7500.0));
            handle.decide(&second.run_id, Decision::Approve).await.expect("send approve");
        });

        let outcome = ConfirmationLoop::default().run(&surface, "run-9", preview).await;
        host.await.expect("host task");

        assert!(outcome.is_approved());
        assert_eq!(outcome.edits(), 1);
        assert!(surface.pending_runs().is_empty());
    }

    #[tokio::test]
    async fn closed_decision_channel_rejects() {
        let (surface, handle) = ChannelConfirmation::new(1);
        drop(handle);

        let outcome = ConfirmationLoop::default().run(&surface, "run-10", contact("a@x.com")).await;

        assert!(!outcome.is_approved());
    }

    #[tokio::test]
    async fn concurrent_runs_receive_only_their_own_decisions() {
        let (surface, mut handle) = ChannelConfirmation::new(4);
        let confirmation = ConfirmationLoop::default();

        let host = async {
            let mut seen = Vec::new();
            for _ in 0..2 {
                seen.push(handle.prompts.recv().await.expect("prompt").run_id);
            }
            seen.sort();
            assert_eq!(seen, ["run-a", "run-b"]);
            handle.decide("run-b", Decision::Reject).await.expect("send reject");
            handle.decide("run-a", Decision::Approve).await.expect("send approve");
        };

        let (run_a, run_b, ()) = tokio::join!(
            confirmation.run(&surface, "run-a", contact("a@x.com")),
            confirmation.run(&surface, "run-b", contact("b@x.com")),
            host,
        );

        assert!(run_a.is_approved(), "run-a was approved by the host");
        assert!(!run_b.is_approved(), "run-b was rejected by the host");
        assert!(surface.pending_runs().is_empty());
    }

    #[tokio::test]
    async fn decision_for_an_unknown_run_is_dropped() {
        let (surface, mut handle) = ChannelConfirmation::new(4);

        let host = async {
            let prompt = handle.prompts.recv().await.expect("prompt");
            handle.decide("run-elsewhere", Decision::Approve).await.expect("send stray");
            handle.decide(prompt.run_id, Decision::Reject).await.expect("send reject");
        };

        let confirm_loop = ConfirmationLoop::default();
        let (outcome, ()) = tokio::join!(
            confirm_loop.run(&surface, "run-c", contact("c@x.com")),
            host,
        );

        assert!(!outcome.is_approved());
    }
}
