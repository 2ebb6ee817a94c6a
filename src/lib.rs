//! TableTheory: a type-safe, model-driven data-access layer over a
//! managed HTTP/JSON NoSQL key-value store with DynamoDB-like semantics.
//!
//! The crate root wires together the subsystems documented in DESIGN.md:
//! an attribute-value model (C1) and converter (C2), a schema registry
//! (C3) populated by `#[derive(Model)]` or the YAML loader, an expression
//! builder (C4), envelope encryption (C5), a query executor (C6) with a
//! batch orchestrator (C11) and parallel scan fan-out, a transaction
//! builder (C7), a credential/session manager (C8), a lease manager (C9),
//! and a cursor/stream codec (C10). `validate` (C12) is an opt-in,
//! advisory check on identifiers, operators, and values — defense in
//! depth, not a security boundary, since the store does not evaluate SQL.

pub mod clock;
pub mod config;
pub mod convert;
pub mod crypto;
pub mod cursor;
pub mod deadline;
pub mod error;
pub mod exec;
pub mod expr;
pub mod lease;
pub mod registry;
pub mod retry;
pub mod session;
pub mod stream;
pub mod txn;
pub mod validate;
pub mod value;
pub mod wire;

mod async_map_somes;

pub use once_cell;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use convert::{FromAttributeValue, Json, ToAttributeValue};
pub use crypto::{KeyService, KmsKeyService};
pub use deadline::{Ctx, Deadline};
pub use error::{Error, ErrorKind};
pub use exec::{CryptoConfig, Executor, Page, QueryOptions, ScanOptions, UpdateSpec};
pub use lease::{Lease, LeaseManager};
pub use registry::{FieldMeta, IndexMeta, Model, ModelMetadata};
pub use session::{SessionManager, TemporaryCredentials, TenantConfig};
pub use txn::Transaction;
pub use value::AttributeValue;
pub use wire::{AwsWire, Wire};

pub use tabletheory_derive::Model;
