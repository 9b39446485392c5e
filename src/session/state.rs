//! Translation session state machine
//!
//! Defines the four session statuses and the transition table that drives the
//! capture → translate → speak loop. The machine is pure: it never touches a
//! device or the network. Every transition returns the ordered list of
//! [`SessionAction`]s the controller must execute to honour it.

use crate::speech::is_recoverable_capture_error;
use crate::translation::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Session status
///
/// Exactly one value is active at any instant. This is the only state of the
/// controller that is observable from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No handles held, waiting for the user to start
    #[default]
    Idle,
    /// Capture handle held, waiting for an utterance
    Listening,
    /// Waiting for the translation gateway, no handles held
    Processing,
    /// Output handle held while the translation is spoken
    Speaking,
}

impl SessionStatus {
    /// Returns the label shown to the user for this status
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Listening => "Listening...",
            SessionStatus::Processing => "Translating...",
            SessionStatus::Speaking => "Speaking...",
        }
    }

    /// Returns whether a capture handle is held in this status
    pub fn holds_capture(&self) -> bool {
        matches!(self, SessionStatus::Listening)
    }

    /// Returns whether an output handle is held in this status
    pub fn holds_output(&self) -> bool {
        matches!(self, SessionStatus::Speaking)
    }

    /// Returns whether the session loop is running
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::Idle)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events that can trigger a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// User asked to start listening
    Start,
    /// User asked to stop
    Stop,
    /// The owning component is being disposed
    Teardown,
    /// The recognizer produced an utterance
    Utterance {
        /// Recognized text, possibly empty
        text: String,
        /// Whether the recognizer considers the text final
        is_final: bool,
    },
    /// The recognizer reported an error code
    CaptureError { code: String },
    /// The recognizer stopped after an activation
    CaptureEnded,
    /// The gateway resolved
    TranslationComplete { source: String, translated: String },
    /// The gateway rejected; `message` is user facing
    TranslationFailed { message: String },
    /// The output sink finished speaking
    OutputFinished,
    /// A side effect could not be carried out; `message` is user facing
    Fault { message: String },
}

/// Reason for entering a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransitionReason {
    UserStart,
    UserStop,
    Teardown,
    /// An empty utterance was recognized and dropped
    EmptyUtterance,
    UtteranceCaptured,
    /// The recognizer ended while still listening and was restarted
    CaptureRestarted,
    CaptureFailed { code: String },
    TranslationSuccess,
    TranslationFailed,
    OutputComplete,
    Fault,
}

/// Side effect requested by a transition, executed in order by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Release capture, abandon any translation, release output
    ReleaseAll,
    ClearError,
    AcquireCapture,
    RestartCapture,
    ReleaseCapture,
    Translate { text: String },
    AppendLog { source: String, translated: String },
    Speak { text: String },
    ReleaseOutput,
    SetError { message: String },
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    /// The status after the transition
    pub new_status: SessionStatus,
    /// Reason for the transition
    pub reason: TransitionReason,
    /// Side effects to perform, in order
    pub actions: Vec<SessionAction>,
}

impl TransitionResult {
    fn new(new_status: SessionStatus, reason: TransitionReason, actions: Vec<SessionAction>) -> Self {
        Self {
            new_status,
            reason,
            actions,
        }
    }
}

/// Session state machine
///
/// Owns nothing but the current status. Handles, tickets and the log are kept
/// by the [`SessionController`](super::SessionController), which feeds events
/// in and executes the returned actions.
pub struct SessionStateMachine {
    status: SessionStatus,
    entered_at: Instant,
}

impl SessionStateMachine {
    /// Creates a new state machine in the Idle status
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            entered_at: Instant::now(),
        }
    }

    /// Returns the current status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns how long the machine has been in the current status
    pub fn time_in_status(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Process an event and return the transition if one occurred
    ///
    /// Returns `None` when the event is ignored in the current status.
    pub fn process_event(&mut self, event: SessionEvent) -> Option<TransitionResult> {
        use SessionAction as A;
        use SessionStatus as S;

        let transition = match (self.status, event) {
            (S::Idle, SessionEvent::Start) => Some(TransitionResult::new(
                S::Listening,
                TransitionReason::UserStart,
                vec![A::ReleaseAll, A::ClearError, A::AcquireCapture],
            )),

            (_, SessionEvent::Stop) => Some(TransitionResult::new(
                S::Idle,
                TransitionReason::UserStop,
                vec![A::ReleaseAll],
            )),
            (_, SessionEvent::Teardown) => Some(TransitionResult::new(
                S::Idle,
                TransitionReason::Teardown,
                vec![A::ReleaseAll],
            )),
            (_, SessionEvent::Fault { message }) => Some(TransitionResult::new(
                S::Idle,
                TransitionReason::Fault,
                vec![A::ReleaseAll, A::SetError { message }],
            )),

            // LISTENING
            (S::Listening, SessionEvent::Utterance { is_final: false, .. }) => None,
            (S::Listening, SessionEvent::Utterance { text, .. }) => {
                let text = text.trim();
                if text.is_empty() {
                    Some(TransitionResult::new(
                        S::Listening,
                        TransitionReason::EmptyUtterance,
                        Vec::new(),
                    ))
                } else {
                    Some(TransitionResult::new(
                        S::Processing,
                        TransitionReason::UtteranceCaptured,
                        vec![
                            A::ReleaseCapture,
                            A::Translate {
                                text: text.to_string(),
                            },
                        ],
                    ))
                }
            }
            (S::Listening, SessionEvent::CaptureError { code }) => {
                if is_recoverable_capture_error(&code) {
                    None
                } else {
                    Some(TransitionResult::new(
                        S::Idle,
                        TransitionReason::CaptureFailed { code: code.clone() },
                        vec![
                            A::ReleaseAll,
                            A::SetError {
                                message: format!("Speech recognition error: {}", code),
                            },
                        ],
                    ))
                }
            }
            (S::Listening, SessionEvent::CaptureEnded) => Some(TransitionResult::new(
                S::Listening,
                TransitionReason::CaptureRestarted,
                vec![A::RestartCapture],
            )),

            // PROCESSING
            (S::Processing, SessionEvent::TranslationComplete { source, translated }) => {
                let translated = translated.trim();
                if translated.is_empty() {
                    Some(TransitionResult::new(
                        S::Idle,
                        TransitionReason::TranslationFailed,
                        vec![
                            A::ReleaseAll,
                            A::SetError {
                                message: GatewayError::EmptyResult.user_message(),
                            },
                        ],
                    ))
                } else {
                    Some(TransitionResult::new(
                        S::Speaking,
                        TransitionReason::TranslationSuccess,
                        vec![
                            A::AppendLog {
                                source,
                                translated: translated.to_string(),
                            },
                            A::Speak {
                                text: translated.to_string(),
                            },
                        ],
                    ))
                }
            }
            (S::Processing, SessionEvent::TranslationFailed { message }) => {
                Some(TransitionResult::new(
                    S::Idle,
                    TransitionReason::TranslationFailed,
                    vec![A::ReleaseAll, A::SetError { message }],
                ))
            }

            // SPEAKING
            (S::Speaking, SessionEvent::OutputFinished) => Some(TransitionResult::new(
                S::Listening,
                TransitionReason::OutputComplete,
                vec![A::ReleaseOutput, A::AcquireCapture],
            )),

            _ => None,
        };

        if let Some(ref result) = transition {
            self.apply_transition(result);
        }

        transition
    }

    fn apply_transition(&mut self, result: &TransitionResult) {
        let previous = self.status;
        self.status = result.new_status;
        if previous != result.new_status {
            self.entered_at = Instant::now();
        }

        tracing::info!(
            "Session transition: {:?} -> {:?} (reason: {:?})",
            previous,
            result.new_status,
            result.reason
        );
    }

    /// Force the machine back to Idle without producing actions
    pub fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.entered_at = Instant::now();
        tracing::info!("Session state machine reset to Idle");
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listening() -> SessionStateMachine {
        let mut sm = SessionStateMachine::new();
        sm.process_event(SessionEvent::Start);
        sm
    }

    fn utterance(text: &str) -> SessionEvent {
        SessionEvent::Utterance {
            text: text.to_string(),
            is_final: true,
        }
    }

    fn processing() -> SessionStateMachine {
        let mut sm = listening();
        sm.process_event(utterance("Hola"));
        sm
    }

    fn speaking() -> SessionStateMachine {
        let mut sm = processing();
        sm.process_event(SessionEvent::TranslationComplete {
            source: "Hola".to_string(),
            translated: "Hallo".to_string(),
        });
        sm
    }

    #[test]
    fn test_initial_status_is_idle() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_start_acquires_capture_after_releasing_stale_handles() {
        let mut sm = SessionStateMachine::new();
        let result = sm.process_event(SessionEvent::Start).unwrap();

        assert_eq!(result.new_status, SessionStatus::Listening);
        assert_eq!(
            result.actions,
            vec![
                SessionAction::ReleaseAll,
                SessionAction::ClearError,
                SessionAction::AcquireCapture
            ]
        );
    }

    #[test]
    fn test_start_ignored_while_active() {
        let mut sm = listening();
        assert!(sm.process_event(SessionEvent::Start).is_none());
        assert_eq!(sm.status(), SessionStatus::Listening);
    }

    #[test]
    fn test_utterance_releases_capture_before_translating() {
        let mut sm = listening();
        let result = sm.process_event(utterance("  Hola, ¿cómo estás?  ")).unwrap();

        assert_eq!(result.new_status, SessionStatus::Processing);
        assert_eq!(
            result.actions,
            vec![
                SessionAction::ReleaseCapture,
                SessionAction::Translate {
                    text: "Hola, ¿cómo estás?".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_empty_utterance_stays_listening_without_actions() {
        let mut sm = listening();
        let result = sm.process_event(utterance("   ")).unwrap();

        assert_eq!(result.new_status, SessionStatus::Listening);
        assert_eq!(result.reason, TransitionReason::EmptyUtterance);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_interim_utterance_ignored() {
        let mut sm = listening();
        let result = sm.process_event(SessionEvent::Utterance {
            text: "Hola".to_string(),
            is_final: false,
        });
        assert!(result.is_none());
        assert_eq!(sm.status(), SessionStatus::Listening);
    }

    #[test]
    fn test_recoverable_capture_errors_ignored() {
        let mut sm = listening();
        for code in ["no-speech", "aborted"] {
            let result = sm.process_event(SessionEvent::CaptureError {
                code: code.to_string(),
            });
            assert!(result.is_none(), "{} should be ignored", code);
            assert_eq!(sm.status(), SessionStatus::Listening);
        }
    }

    #[test]
    fn test_unrecoverable_capture_error_returns_to_idle() {
        let mut sm = listening();
        let result = sm
            .process_event(SessionEvent::CaptureError {
                code: "not-allowed".to_string(),
            })
            .unwrap();

        assert_eq!(result.new_status, SessionStatus::Idle);
        assert_eq!(
            result.actions,
            vec![
                SessionAction::ReleaseAll,
                SessionAction::SetError {
                    message: "Speech recognition error: not-allowed".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_capture_end_while_listening_restarts() {
        let mut sm = listening();
        let result = sm.process_event(SessionEvent::CaptureEnded).unwrap();

        assert_eq!(result.new_status, SessionStatus::Listening);
        assert_eq!(result.actions, vec![SessionAction::RestartCapture]);
    }

    #[test]
    fn test_capture_end_outside_listening_ignored() {
        let mut sm = processing();
        assert!(sm.process_event(SessionEvent::CaptureEnded).is_none());
        assert_eq!(sm.status(), SessionStatus::Processing);
    }

    #[test]
    fn test_translation_success_logs_then_speaks() {
        let mut sm = processing();
        let result = sm
            .process_event(SessionEvent::TranslationComplete {
                source: "Hola".to_string(),
                translated: " Hallo ".to_string(),
            })
            .unwrap();

        assert_eq!(result.new_status, SessionStatus::Speaking);
        assert_eq!(
            result.actions,
            vec![
                SessionAction::AppendLog {
                    source: "Hola".to_string(),
                    translated: "Hallo".to_string()
                },
                SessionAction::Speak {
                    text: "Hallo".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_empty_translation_treated_as_failure() {
        let mut sm = processing();
        let result = sm
            .process_event(SessionEvent::TranslationComplete {
                source: "Hola".to_string(),
                translated: "  \n".to_string(),
            })
            .unwrap();

        assert_eq!(result.new_status, SessionStatus::Idle);
        assert_eq!(result.reason, TransitionReason::TranslationFailed);
        assert!(result
            .actions
            .iter()
            .any(|a| matches!(a, SessionAction::SetError { .. })));
        assert!(!result
            .actions
            .iter()
            .any(|a| matches!(a, SessionAction::AppendLog { .. })));
    }

    #[test]
    fn test_translation_failure_returns_to_idle() {
        let mut sm = processing();
        let result = sm
            .process_event(SessionEvent::TranslationFailed {
                message: "Sorry".to_string(),
            })
            .unwrap();

        assert_eq!(result.new_status, SessionStatus::Idle);
        assert_eq!(
            result.actions,
            vec![
                SessionAction::ReleaseAll,
                SessionAction::SetError {
                    message: "Sorry".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_output_finished_loops_back_to_listening() {
        let mut sm = speaking();
        let result = sm.process_event(SessionEvent::OutputFinished).unwrap();

        assert_eq!(result.new_status, SessionStatus::Listening);
        assert_eq!(
            result.actions,
            vec![SessionAction::ReleaseOutput, SessionAction::AcquireCapture]
        );
    }

    #[test]
    fn test_stop_from_every_status_returns_to_idle() {
        let machines = vec![
            SessionStateMachine::new(),
            listening(),
            processing(),
            speaking(),
        ];

        for mut sm in machines {
            let result = sm.process_event(SessionEvent::Stop).unwrap();
            assert_eq!(result.new_status, SessionStatus::Idle);
            assert_eq!(result.actions, vec![SessionAction::ReleaseAll]);
        }
    }

    #[test]
    fn test_fault_sets_error_and_returns_to_idle() {
        let mut sm = speaking();
        let result = sm
            .process_event(SessionEvent::Fault {
                message: "speaker missing".to_string(),
            })
            .unwrap();

        assert_eq!(result.new_status, SessionStatus::Idle);
        assert_eq!(result.reason, TransitionReason::Fault);
    }

    #[test]
    fn test_late_translation_in_idle_ignored() {
        let mut sm = processing();
        sm.process_event(SessionEvent::Stop);
        let result = sm.process_event(SessionEvent::TranslationComplete {
            source: "Hola".to_string(),
            translated: "Hallo".to_string(),
        });
        assert!(result.is_none());
        assert_eq!(sm.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::Idle.label(), "Idle");
        assert_eq!(SessionStatus::Listening.label(), "Listening...");
        assert_eq!(SessionStatus::Processing.label(), "Translating...");
        assert_eq!(SessionStatus::Speaking.to_string(), "Speaking...");
    }

    #[test]
    fn test_handles_are_mutually_exclusive_by_status() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Listening,
            SessionStatus::Processing,
            SessionStatus::Speaking,
        ] {
            assert!(!(status.holds_capture() && status.holds_output()));
        }
    }

    #[test]
    fn test_reset() {
        let mut sm = speaking();
        sm.reset();
        assert_eq!(sm.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_reason_serialisation() {
        let json = serde_json::to_string(&TransitionReason::CaptureFailed {
            code: "network".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"capture_failed","code":"network"}"#);
    }
}
