//! Agent relay wire protocol: plain-text frames.
//!
//! Every frame is one text message on a participant's channel:
//!
//! - `register:<name>` binds the sending connection to `name`
//! - `send:<target>:<payload>` forwards `payload` verbatim to `target`
//!
//! Only the first two colons of a `send` frame are structural; the payload may
//! contain further colons. No escaping exists for payloads, so newlines and
//! colons pass through unchanged and names cannot contain a colon in `send`
//! frames.
//!
//! Broker-to-sender notices are free text; see [`notice`].

pub mod frame;
pub mod notice;

pub use frame::{Frame, FrameError, REGISTER_PREFIX, SEND_PREFIX};
pub use notice::Notice;
