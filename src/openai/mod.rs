//! Generation collaborator: OpenAI-style chat completions.

pub(crate) mod client;
pub(crate) mod types;
