//! HTTP client for an ontology type registry.
//!
//! [`RegistryClient`] implements [`ontology::Remote`] on top of a blocking
//! `ureq` agent. Request and response shapes live in [`wire`]; HTTP status
//! codes are classified in [`error`] so the executor knows which failures
//! to retry and which mean the work is already done.
//!
//! | Request | Endpoint |
//! |---|---|
//! | snapshot | `POST {url}/ontology-types/query` |
//! | create | `POST {url}/{kind}-types` |
//! | update | `PUT {url}/{kind}-types` |
//! | archive | `PUT {url}/ontology-types/archive` |

pub mod client;
pub mod error;
pub mod wire;

pub use client::{DEFAULT_TIMEOUT, RegistryClient};
pub use error::{Error, Result};
