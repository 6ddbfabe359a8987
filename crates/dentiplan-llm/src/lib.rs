//! Text generation and request planning for dental treatment plans.
//!
//! Wraps a chat-completion generator around the `dentiplan-core` search
//! service: the planner builds the retrieval context, asks the generator for
//! reasoning plus plan JSON, records the exchange and parses the answer.

pub mod detection;
pub mod explanation;
pub mod generator;
#[cfg(feature = "http")]
pub mod http;
pub mod planner;
pub mod prompts;

pub use detection::{is_treatment_planning_request, RequestIntent};
pub use explanation::generate_explanation;
pub use generator::*;
#[cfg(feature = "http")]
pub use http::OpenAiChatGenerator;
pub use planner::{Planner, PlannerError, PlannerResponse, PlannerResult};
pub use prompts::{build_messages, build_system_prompt, SYSTEM_PROMPT};
