//! Connection authentication
// (c) 2024 Ross Younger
//!
//! When a camera requires authentication, [`Camera::connect`](super::Camera::connect) sends an
//! [`AuthenticationEvent::Requested`] for each round. The client answers exactly once through the
//! [`AuthenticationContext`] it carries, and an [`AuthenticationEvent::Resolved`] follows before
//! anything else happens. Requests and resolutions therefore strictly alternate.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::Shared;
use crate::{CameraError, config::Authentication, config::OperationSize};

/// What the camera wants from the user
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum AuthenticationKind {
    /// The user must confirm the connection on the camera itself.
    /// The client may only cancel; any other response is treated as approval.
    InteractWithCamera,
    /// The user must enter a username and password
    UsernamePassword,
    /// The user must enter a four-digit code
    FourDigitCode,
}

impl AuthenticationKind {
    fn for_config(auth: &Authentication) -> Option<Self> {
        match auth {
            Authentication::None => None,
            Authentication::PairOnDevice => Some(Self::InteractWithCamera),
            Authentication::UsernamePassword { .. } => Some(Self::UsernamePassword),
            Authentication::FourDigitCode { .. } => Some(Self::FourDigitCode),
        }
    }
}

/// Describes one authentication prompt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationRound {
    /// What is being asked for
    pub kind: AuthenticationKind,
    /// True if a previous round in this connection attempt was rejected
    pub is_retry: bool,
    /// Identifier of the camera asking
    pub identifier: String,
}

#[derive(Debug)]
enum AuthResponse {
    Cancel,
    Credentials { username: String, password: String },
    Code(String),
}

/// The client's handle on an authentication round.
///
/// Exactly one of the `submit_*` methods may be called, as each consumes the context.
/// Dropping the context without responding cancels the connection attempt.
#[derive(Debug)]
pub struct AuthenticationContext {
    round: AuthenticationRound,
    responder: oneshot::Sender<AuthResponse>,
}

impl AuthenticationContext {
    /// Describes this round
    #[must_use]
    pub fn round(&self) -> &AuthenticationRound {
        &self.round
    }

    /// Cancels the connection attempt
    pub fn submit_cancellation(self) {
        self.respond(AuthResponse::Cancel);
    }

    /// Responds with a username and password
    pub fn submit_username_password(
        self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.respond(AuthResponse::Credentials {
            username: username.into(),
            password: password.into(),
        });
    }

    /// Responds with a numeric code
    pub fn submit_code(self, code: impl Into<String>) {
        self.respond(AuthResponse::Code(code.into()));
    }

    fn respond(self, response: AuthResponse) {
        // The camera may have stopped listening (pair-on-device timeout)
        let _ = self.responder.send(response);
    }
}

/// Events emitted during a connection attempt
#[derive(Debug)]
pub enum AuthenticationEvent {
    /// The camera wants the user to authenticate
    Requested(AuthenticationContext),
    /// The outstanding round has been answered, one way or another
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accepted,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPhase {
    NotStarted,
    AwaitingResponse { failures: u32 },
    Retrying { failures: u32 },
    Resolved(Result<(), CameraError>),
}

/// Judges a response against the configured authentication.
/// `None` means nobody answered before the camera stopped waiting.
fn judge(expected: &Authentication, response: Option<&AuthResponse>) -> Verdict {
    match (expected, response) {
        (_, Some(AuthResponse::Cancel)) => Verdict::Cancelled,
        (Authentication::PairOnDevice, _) => Verdict::Accepted,
        (
            Authentication::UsernamePassword { username, password },
            Some(AuthResponse::Credentials {
                username: u,
                password: p,
            }),
        ) if username == u && password == p => Verdict::Accepted,
        (Authentication::FourDigitCode { code }, Some(AuthResponse::Code(c))) if code == c => {
            Verdict::Accepted
        }
        _ => Verdict::Rejected,
    }
}

impl Shared {
    /// Runs authentication rounds until the client is accepted, cancels, or runs out of retries
    pub(super) async fn authenticate(
        &self,
        events: &mpsc::UnboundedSender<AuthenticationEvent>,
    ) -> Result<(), CameraError> {
        let Some(kind) = AuthenticationKind::for_config(&self.config.authentication) else {
            return Ok(());
        };
        let mut phase = AuthPhase::NotStarted;
        loop {
            phase = match phase {
                AuthPhase::NotStarted => {
                    self.latency.wait(OperationSize::Small).await;
                    AuthPhase::AwaitingResponse { failures: 0 }
                }
                AuthPhase::AwaitingResponse { failures } => {
                    let response = self.ask(kind, failures > 0, events).await;
                    let _ = events.send(AuthenticationEvent::Resolved);
                    match judge(&self.config.authentication, response.as_ref()) {
                        Verdict::Accepted => AuthPhase::Resolved(Ok(())),
                        Verdict::Cancelled => {
                            AuthPhase::Resolved(Err(CameraError::CancelledByUser))
                        }
                        Verdict::Rejected if failures >= self.config.authentication_retries => {
                            AuthPhase::Resolved(Err(CameraError::AuthenticationFailed))
                        }
                        Verdict::Rejected => AuthPhase::Retrying {
                            failures: failures + 1,
                        },
                    }
                }
                AuthPhase::Retrying { failures } => {
                    debug!("authentication rejected ({failures} so far), retrying");
                    self.latency.wait(OperationSize::Small).await;
                    AuthPhase::AwaitingResponse { failures }
                }
                AuthPhase::Resolved(result) => {
                    info!("authentication finished: {result:?}");
                    return result;
                }
            };
        }
    }

    /// Emits one round and waits for its response
    async fn ask(
        &self,
        kind: AuthenticationKind,
        is_retry: bool,
        events: &mpsc::UnboundedSender<AuthenticationEvent>,
    ) -> Option<AuthResponse> {
        let (responder, response) = oneshot::channel();
        let round = AuthenticationRound {
            kind,
            is_retry,
            identifier: self.config.identifier.clone(),
        };
        debug!("requesting authentication: {round:?}");
        // If the client has gone away the context is dropped with the event,
        // which reads as a cancel.
        let _ = events.send(AuthenticationEvent::Requested(AuthenticationContext {
            round,
            responder,
        }));

        if kind == AuthenticationKind::InteractWithCamera {
            tokio::select! {
                r = response => Some(r.unwrap_or(AuthResponse::Cancel)),
                () = tokio::time::sleep(self.config.pair_on_device_delay) => {
                    debug!("user approved the connection on the camera");
                    None
                }
            }
        } else {
            Some(response.await.unwrap_or(AuthResponse::Cancel))
        }
    }
}
