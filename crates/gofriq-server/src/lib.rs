//! The gofr-iq tool surface.
//!
//! A multi-request HTTP server exposing every core operation as a named
//! tool: `POST /tools/{name}` with a flat JSON argument object (plus
//! `auth_tokens`), answering a uniform envelope
//! `{status, message?, data?, error_code?, recovery_strategy?}`.
//!
//! Handlers validate inputs, resolve permitted groups, call the
//! appropriate service and format the response; no business logic lives
//! here.

pub mod envelope;
pub mod state;
pub mod tools;

pub use envelope::Envelope;
pub use state::AppState;
pub use tools::router;
