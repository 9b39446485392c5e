//! Translation session
//!
//! Coordinates the three asynchronous collaborators of a live translation
//! loop: the speech recognizer, the translation gateway and the speech
//! synthesizer. One session owns at most one capture handle and at most one
//! output handle, and never both at the same time.
//!
//! ## States
//!
//! 1. **IDLE** - No handles held, waiting for `start`
//! 2. **LISTENING** - Capture handle held, waiting for an utterance
//! 3. **PROCESSING** - Waiting for the translation gateway
//! 4. **SPEAKING** - Output handle held while the translation is spoken
//!
//! ## State Transitions
//!
//! ```text
//!                 empty utterance / capture end
//!                         ┌─────┐
//!                         ▼     │
//! ┌──────┐  start   ┌───────────┐  utterance  ┌────────────┐
//! │ IDLE │─────────►│ LISTENING │────────────►│ PROCESSING │
//! └──────┘          └───────────┘             └────────────┘
//!    ▲                 ▲     │                    │      │
//!    │                 │     │ capture error      │      │ translated
//!    │◄────────────────┼─────┘                    │      ▼
//!    │                 │     gateway failure      │  ┌──────────┐
//!    │◄────────────────┼──────────────────────────┘  │ SPEAKING │
//!    │                 │                             └──────────┘
//!    │                 │       output finished            │
//!    │                 └──────────────────────────────────┤
//!    │                                                    │
//!    │                 stop / teardown (any state)        │
//!    │◄───────────────────────────────────────────────────┘
//! ```
//!
//! ## Event flow
//!
//! Collaborators never mutate the session. They enqueue a [`Signal`] tagged
//! with the [`Ticket`] of the stage that produced it. The controller drops any
//! signal whose ticket no longer matches the live handle or request, so a
//! late result after `stop` can change neither the status nor the log.
//!
//! [`SessionRunner`] drives a controller on a tokio task and hands out a
//! cloneable [`SessionHandle`].

pub mod controller;
pub mod runner;
pub mod state;

pub use controller::{
    SessionController, SessionError, SessionSnapshot, SessionStateChange, Signal, Ticket,
};
pub use runner::{SessionCommand, SessionHandle, SessionRunner};
pub use state::{
    SessionAction, SessionEvent, SessionStateMachine, SessionStatus, TransitionReason,
    TransitionResult,
};
