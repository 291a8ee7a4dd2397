//! Infrastructure Adapters
//!
//! Implementations of the [`ResourceSource`](crate::domain::ResourceSource)
//! port.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ResourceSource (domain port)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────────┐
//! │ KubeResourceSource            │ │ InMemoryResourceSource        │
//! │ dynamic API list + watch      │ │ scripted, for tests           │
//! └───────────────────────────────┘ └───────────────────────────────┘
//! ```

mod kubernetes;
mod memory;

pub use kubernetes::{api_resource, KubeResourceSource};
pub use memory::InMemoryResourceSource;
