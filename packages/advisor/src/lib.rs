//! Question routing and conversation state for the vidlore advisor surface.
//!
//! Everything here is deterministic and local: [`QueryRouter`] classifies a
//! question into a topic before any generative call, and
//! [`ConversationHistory`] bounds how much prior context a caller carries.

pub mod history;
pub mod router;

pub use history::{ConversationHistory, Exchange};
pub use router::{QueryRoute, QueryRouter};
