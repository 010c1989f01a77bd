//! Routecheck Harness
//!
//! Drives a containerized routing platform through its test lifecycle and
//! checks its answers against stored references:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Session (one per run)                                       │
//! │    ├── DatasetLoader   register -> verify -> stage -> reload │
//! │    │     ├── Backend          (registry + routing HTTP)      │
//! │    │     └── ContainerFleet   (docker/podman CLI)            │
//! │    └── SnapshotComparator  create | compare                  │
//! │          ├── ReferenceStore   {suite}/{test}_{n}.json        │
//! │          └── ResponseFilter   Default | Journey              │
//! │  TestCase (one per test)  api / raw_api / journey            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every wait is a `RetryPolicy` around a single poll; waits run one after
//! the other, never concurrently.

pub mod backend;
pub mod error;
pub mod fixture;
pub mod fleet;
pub mod loader;
pub mod readiness;
pub mod retry;
pub mod snapshot;
pub mod staging;

pub use backend::{Backend, HttpBackend};
pub use error::{Error, Result};
pub use fixture::{JourneyQuery, Session, TestCase};
pub use fleet::{ContainerFleet, DockerFleet};
pub use loader::{DatasetLoader, LoadOutcome, LoaderSettings};
pub use readiness::MissingContainerPolicy;
pub use retry::RetryPolicy;
pub use snapshot::{ComparisonResult, SnapshotComparator};
