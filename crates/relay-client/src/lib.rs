//! Participant side of the agent relay.
//!
//! A [`Session`] keeps one named endpoint registered with the broker across
//! transport failures, and runs its [`Role`] on every link it establishes:
//!
//! - **Initiator**: an [`Operator`] supplies requests; each one is sent to the
//!   target and the session waits for exactly one reply before the next.
//! - **Responder**: each inbound payload goes through a [`Worker`]; the
//!   result is sent downstream, failures are reported to a fallback agent.

pub mod backoff;
pub mod error;
pub mod link;
pub mod role;
pub mod session;
pub mod worker;

pub use backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff, NoBackoff};
pub use error::{ClientError, WorkError};
pub use link::{validate_url, Link};
pub use role::{ChannelOperator, Flow, Operator, Role};
pub use session::{Session, SessionExit, SessionHandle, SessionState};
pub use worker::{CommandWorker, EchoWorker, Worker};
