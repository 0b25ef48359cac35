//! Kuery - conversational Kubernetes agent
//!
//! The core is a step-chain flow engine (`flows`) driving a model through a
//! governed tool layer (`tools`). Tool calls accepted by the governance layer
//! can be exported as named flows (`store`) and replayed later.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod console;
pub mod flows;
pub mod llm;
pub mod store;
pub mod system_prompt;
pub mod tools;

#[cfg(test)]
mod testing;
