//! Process-wide session registry
//!
//! ```text
//!                      Arc<Registry>
//!               ┌───────────────────────────┐
//!               │ sessions:   id -> Session │
//!               │ publishers: path -> id    │
//!               │ idle:       {id}          │
//!               └─────────────┬─────────────┘
//!                             │
//!       ┌─────────────────────┼─────────────────────┐
//!       ▼                     ▼                     ▼
//!  [Publisher]            [Player]             [Idle player]
//!  fan-out via            receives             promoted when
//!  players set            chunks               path is published
//! ```
//!
//! Media does not pass through the registry. Publishers look their players
//! up by id and write pre-chunked `Bytes` into each player's queue; the
//! buffers are reference counted, not copied.

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::Registry;
