//! Turn state machine for one chat session.
//!
//! A turn is split in three steps so a front end can keep handling input
//! (most importantly reset) while the remote call is in flight:
//!
//! 1. [`ConversationController::submit`] validates the input, records the user
//!    turn and hands back a [`PendingTurn`].
//! 2. [`PendingTurn::run`] performs the remote call. It owns everything it
//!    needs, so it can be spawned onto a runtime.
//! 3. [`ConversationController::resolve`] commits the reply, or drops it when
//!    the session was reset in the meantime.
//!
//! [`ConversationController::converse`] chains the three for callers that do
//! not need to interleave anything.

use std::sync::Arc;
use thiserror::Error;

use crate::ai::{CompletionClient, CompletionError, CompletionRequest, CompletionResult};
use crate::generation::GenerationConfig;
use crate::persona::Persona;
use crate::prompt;
use crate::session::{SessionId, SessionState, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// A request dispatched in `epoch` has not come back yet.
    AwaitingResponse { epoch: u64 },
}

/// Why a submission was ignored. Neither case touches the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("nothing to send")]
    EmptyInput,
    #[error("still waiting for the previous reply")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was appended to the history.
    Replied(String),
    /// The session was reset while the request was in flight; the reply was dropped.
    Discarded,
    /// The request failed. Only the user turn was kept.
    Failed(CompletionError),
}

/// A dispatched request waiting to be run.
pub struct PendingTurn {
    epoch: u64,
    request: CompletionRequest,
    client: Arc<dyn CompletionClient>,
}

impl PendingTurn {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }

    pub async fn run(self) -> Resolution {
        let result = self.client.generate(&self.request).await;
        Resolution {
            epoch: self.epoch,
            result,
        }
    }
}

/// Result of a remote call, tagged with the epoch it was dispatched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub epoch: u64,
    pub result: CompletionResult,
}

impl Resolution {
    pub fn new(epoch: u64, result: CompletionResult) -> Self {
        Self { epoch, result }
    }
}

pub struct ConversationController {
    session: SessionState,
    client: Arc<dyn CompletionClient>,
    state: TurnState,
}

impl ConversationController {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            session: SessionState::new(),
            client,
            state: TurnState::Idle,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, TurnState::AwaitingResponse { .. })
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Record a user turn and prepare the request for it.
    ///
    /// The persona and config are taken per call; switching either only
    /// affects requests built after the switch.
    pub fn submit(
        &mut self,
        text: &str,
        persona: &Persona,
        config: &GenerationConfig,
    ) -> Result<PendingTurn, Rejected> {
        if text.trim().is_empty() {
            return Err(Rejected::EmptyInput);
        }
        if self.is_awaiting() {
            tracing::debug!(session = %self.session.id(), "submit ignored while awaiting a reply");
            return Err(Rejected::Busy);
        }

        let epoch = self.session.epoch();
        self.session.append(Turn::user(text));
        let request = prompt::build_request(persona, self.session.turns(), config);
        self.state = TurnState::AwaitingResponse { epoch };

        tracing::debug!(
            session = %self.session.id(),
            persona = persona.name(),
            epoch,
            turns = self.session.turn_count(),
            "dispatching turn"
        );

        Ok(PendingTurn {
            epoch,
            request,
            client: Arc::clone(&self.client),
        })
    }

    /// Apply the outcome of a remote call and return to `Idle`.
    ///
    /// A resolution that does not belong to the request in flight is dropped
    /// and leaves the state alone.
    pub fn resolve(&mut self, resolution: Resolution) -> TurnOutcome {
        match self.state {
            TurnState::Idle => {
                tracing::warn!(
                    session = %self.session.id(),
                    "resolution arrived with no request in flight"
                );
                return TurnOutcome::Discarded;
            }
            TurnState::AwaitingResponse { epoch } if epoch != resolution.epoch => {
                tracing::warn!(
                    session = %self.session.id(),
                    in_flight = epoch,
                    received = resolution.epoch,
                    "resolution does not match the request in flight"
                );
                return TurnOutcome::Discarded;
            }
            TurnState::AwaitingResponse { .. } => {}
        }
        self.state = TurnState::Idle;

        match resolution.result {
            Ok(content) if resolution.epoch == self.session.epoch() => {
                self.session.append(Turn::assistant(content.clone()));
                tracing::info!(
                    session = %self.session.id(),
                    turns = self.session.turn_count(),
                    "turn committed"
                );
                TurnOutcome::Replied(content)
            }
            Ok(_) => {
                tracing::info!(
                    session = %self.session.id(),
                    dispatched = resolution.epoch,
                    current = self.session.epoch(),
                    "discarding reply from before reset"
                );
                TurnOutcome::Discarded
            }
            Err(error) => {
                tracing::warn!(
                    session = %self.session.id(),
                    kind = ?error.kind(),
                    "turn failed: {}",
                    error
                );
                TurnOutcome::Failed(error)
            }
        }
    }

    /// Submit, run and resolve in one go.
    pub async fn converse(
        &mut self,
        text: &str,
        persona: &Persona,
        config: &GenerationConfig,
    ) -> Result<TurnOutcome, Rejected> {
        let pending = self.submit(text, persona, config)?;
        let resolution = pending.run().await;
        Ok(self.resolve(resolution))
    }

    /// Clear the history. Never blocks on an in-flight request: its reply
    /// will be discarded when it is resolved.
    pub fn reset(&mut self) {
        self.session.reset();
        tracing::info!(
            session = %self.session.id(),
            epoch = self.session.epoch(),
            in_flight = self.is_awaiting(),
            "conversation reset"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ErrorKind;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        async fn generate(&self, request: &CompletionRequest) -> CompletionResult {
            let last = request.messages().last().map(|t| t.content.clone());
            Ok(format!("echo: {}", last.unwrap_or_default()))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn controller() -> ConversationController {
        ConversationController::new(Arc::new(Echo))
    }

    fn socrates() -> Persona {
        Persona::new("Socrates", "speak only in questions", None).unwrap()
    }

    #[test]
    fn test_blank_input_is_rejected_without_side_effects() {
        let mut controller = controller();
        for text in ["", "   ", "\n\t"] {
            let result = controller.submit(text, &socrates(), &GenerationConfig::default());
            assert!(matches!(result, Err(Rejected::EmptyInput)));
        }
        assert_eq!(controller.session().turn_count(), 0);
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[test]
    fn test_second_submit_while_awaiting_is_rejected() {
        let mut controller = controller();
        let pending = controller
            .submit("hi", &socrates(), &GenerationConfig::default())
            .unwrap();
        assert_eq!(pending.epoch(), 0);
        assert!(controller.is_awaiting());

        let again = controller.submit("hello?", &socrates(), &GenerationConfig::default());
        assert!(matches!(again, Err(Rejected::Busy)));
        assert_eq!(controller.session().turn_count(), 1);
    }

    #[test]
    fn test_request_includes_new_user_turn() {
        let mut controller = controller();
        let pending = controller
            .submit("hi", &socrates(), &GenerationConfig::default())
            .unwrap();

        let messages = pending.request().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], Turn::user("hi"));
    }

    #[test]
    fn test_failure_keeps_only_user_turn() {
        let mut controller = controller();
        let pending = controller
            .submit("hi", &socrates(), &GenerationConfig::default())
            .unwrap();

        let outcome = controller.resolve(Resolution::new(
            pending.epoch(),
            Err(CompletionError::new(ErrorKind::RateLimit, "slow down")),
        ));

        assert!(matches!(outcome, TurnOutcome::Failed(e) if e.kind() == ErrorKind::RateLimit));
        assert_eq!(controller.session().turns(), &[Turn::user("hi")]);
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[test]
    fn test_stale_success_is_discarded() {
        let mut controller = controller();
        let pending = controller
            .submit("hi", &socrates(), &GenerationConfig::default())
            .unwrap();

        controller.reset();
        assert_eq!(controller.session().turn_count(), 0);
        // Still one request outstanding
        assert!(controller.is_awaiting());

        let outcome = controller.resolve(Resolution::new(pending.epoch(), Ok("late".into())));
        assert_eq!(outcome, TurnOutcome::Discarded);
        assert_eq!(controller.session().turn_count(), 0);
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[test]
    fn test_foreign_resolution_keeps_request_in_flight() {
        let mut controller = controller();
        controller.reset();
        let pending = controller
            .submit("hi", &socrates(), &GenerationConfig::default())
            .unwrap();
        assert_eq!(pending.epoch(), 1);

        let outcome = controller.resolve(Resolution::new(0, Ok("from before".into())));
        assert_eq!(outcome, TurnOutcome::Discarded);
        assert_eq!(controller.state(), TurnState::AwaitingResponse { epoch: 1 });
        assert_eq!(controller.session().turns(), &[Turn::user("hi")]);

        let outcome = controller.resolve(Resolution::new(pending.epoch(), Ok("Why?".into())));
        assert_eq!(outcome, TurnOutcome::Replied("Why?".to_string()));
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[test]
    fn test_resolution_without_request_is_ignored() {
        let mut controller = controller();
        let outcome = controller.resolve(Resolution::new(0, Ok("unsolicited".into())));
        assert_eq!(outcome, TurnOutcome::Discarded);
        assert_eq!(controller.session().turn_count(), 0);
    }

    #[tokio::test]
    async fn test_converse_commits_reply() {
        let mut controller = controller();
        let outcome = controller
            .converse("hi", &socrates(), &GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Replied("echo: hi".to_string()));
        assert_eq!(
            controller.session().turns(),
            &[Turn::user("hi"), Turn::assistant("echo: hi")]
        );
        assert_eq!(controller.model(), "echo");
    }
}
