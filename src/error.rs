//! Error types for every public operation, plus the stable sentinel kinds
//! from spec §7.
//!
//! Each operation gets its own `thiserror` enum so call sites can match on
//! the specific failure shape, and every enum exposes [`kind`] so callers
//! who only care about the sentinel don't need to know the concrete type.
//! This mirrors the teacher's `errors/mod.rs`: one enum per operation plus
//! an aggregating [`Error`].

use aws_sdk_dynamodb::error::SdkError;
use thiserror::Error;

/// Stable, matchable sentinel for every user-facing failure mode in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ConditionFailed,
    TransactionFailed,
    DeadlineImminent,
    DeadlineExceeded,
    EncryptionNotConfigured,
    EncryptedFieldNotQueryable,
    InvalidEnvelope,
    InvalidModel,
    InvalidOperator,
    InvalidValue,
    InjectionAttempt,
    DuplicatePlaceholder,
    UnprocessedKeysRemaining,
    Cancelled,
    Wire,
    Other,
}

/// Conditional-write / conditional-update / conditional-delete failed.
#[derive(Debug, Error)]
#[error("condition failed")]
pub struct ConditionFailed;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("missing attribute: {0}")]
    MissingAttribute(String),
    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("malformed numeric attribute: {0}")]
    MalformedNumber(String),
    #[error("type mismatch for field {field}: expected {expected}")]
    TypeMismatch { field: String, expected: String },
}

impl ConvertError {
    /// Attach the field name a `#[derive(Model)]`-generated `from_item`
    /// knows and the underlying trait impl (which has no field context)
    /// doesn't. A no-op for variants that don't carry a field name.
    pub fn renamed(self, field: &str) -> Self {
        match self {
            ConvertError::TypeMismatch { expected, .. } => {
                ConvertError::TypeMismatch { field: field.to_string(), expected }
            }
            ConvertError::InvalidValue { reason, .. } => {
                ConvertError::InvalidValue { field: field.to_string(), reason }
            }
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate role `{role}` on model `{model}`: already assigned to `{existing}`, cannot also assign to `{field}`")]
    DuplicateRole {
        model: String,
        role: String,
        existing: String,
        field: String,
    },
    #[error("model `{model}` has no primary key field")]
    MissingPrimaryKey { model: String },
    #[error("field `{field}` on model `{model}` cannot be both `json` and `binary`")]
    MutuallyExclusiveModifiers { model: String, field: String },
    #[error("key field `{field}` on model `{model}` cannot be marked encrypted")]
    EncryptedKeyField { model: String, field: String },
    #[error("key field `{field}` on model `{model}` must have scalar type S, N, or B")]
    NonScalarKeyField { model: String, field: String },
    #[error("index `{index}` on model `{model}` references unknown attribute `{field}`")]
    UnknownIndexAttribute {
        model: String,
        index: String,
        field: String,
    },
    #[error("index `{index}` on model `{model}` has pk type `{index_ty}` inconsistent with attribute `{field}` of type `{field_ty}`")]
    InconsistentIndexKeyType {
        model: String,
        index: String,
        field: String,
        index_ty: String,
        field_ty: String,
    },
    #[error("local secondary index `{index}` on model `{model}` must share the table's partition key `{table_pk}`, found `{found}`")]
    LsiPartitionKeyMismatch {
        model: String,
        index: String,
        table_pk: String,
        found: String,
    },
    #[error("duplicate attribute name `{field}` on model `{model}`")]
    DuplicateAttribute { model: String, field: String },
    #[error("invalid YAML data model document: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("duplicate placeholder `{0}`")]
    DuplicatePlaceholder(String),
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("update target `{0}` is a key field and cannot be modified")]
    KeyFieldInUpdate(String),
    #[error("update target `{0}` is encrypted and only supports SET f = :v")]
    EncryptedFieldUnsupportedAction(String),
    #[error("field `{0}` is encrypted and cannot be referenced in a query, filter, or condition")]
    EncryptedFieldNotQueryable(String),
    #[error("field `{0}` must be a list (L) for this action")]
    NotAList(String),
    #[error("field `{0}` must be a number or set type (N/SS/NS/BS) for ADD")]
    InvalidAddTarget(String),
    #[error("field `{0}` must be a set type (SS/NS/BS) for DELETE")]
    InvalidDeleteTarget(String),
    #[error("IN expects at most 100 values, got {0}")]
    TooManyInValues(usize),
    #[error("cursor conflicts with current query: {0}")]
    CursorMismatch(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption is not configured for model `{0}`, which has encrypted fields")]
    NotConfigured(String),
    #[error("stored attribute is not a valid envelope")]
    InvalidEnvelope,
    #[error("key service failure")]
    KeyService,
    #[error("authentication failed while decrypting")]
    AuthenticationFailed,
}

#[derive(Debug, Error)]
pub enum DeadlineError {
    #[error("deadline is imminent; aborting before issuing a wire call")]
    Imminent,
    #[error("deadline has passed")]
    Exceeded,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("get_item failed: {0}")]
    GetItem(String),
    #[error("put_item failed: {0}")]
    PutItem(String),
    #[error("update_item failed: {0}")]
    UpdateItem(String),
    #[error("delete_item failed: {0}")]
    DeleteItem(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("scan failed: {0}")]
    Scan(String),
    #[error("batch_get_item failed: {0}")]
    BatchGetItem(String),
    #[error("batch_write_item failed: {0}")]
    BatchWriteItem(String),
    #[error("transact_write_items failed: {0}")]
    TransactWriteItems(String),
    #[error("create_table failed: {0}")]
    CreateTable(String),
    #[error("delete_table failed: {0}")]
    DeleteTable(String),
    #[error("describe_table failed: {0}")]
    DescribeTable(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl<E: std::fmt::Debug> From<SdkError<E>> for WireError {
    fn from(e: SdkError<E>) -> Self {
        WireError::GetItem(format!("{e:?}"))
    }
}

macro_rules! op_error {
    ($name:ident { $($variant:ident($ty:ty) => $kind:expr),* $(,)? }) => {
        #[derive(Debug, Error)]
        pub enum $name {
            $(
                #[error(transparent)]
                $variant(#[from] $ty),
            )*
        }

        impl $name {
            pub fn kind(&self) -> ErrorKind {
                match self {
                    $(Self::$variant(_) => $kind,)*
                }
            }
        }
    };
}

#[derive(Debug, Error)]
pub enum GetError {
    #[error("no item with the given key")]
    NotFound,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl GetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Convert(_) => ErrorKind::InvalidValue,
        }
    }
}

/// Bridges [`crate::wire::ConditionalWriteError`] into each conditional
/// operation's own error enum, so the executor can use `?` directly
/// instead of matching the wire-layer distinction at every call site.
macro_rules! impl_conditional_write_from {
    ($name:ident) => {
        impl From<crate::wire::ConditionalWriteError> for $name {
            fn from(e: crate::wire::ConditionalWriteError) -> Self {
                match e {
                    crate::wire::ConditionalWriteError::ConditionFailed => {
                        $name::ConditionFailed(ConditionFailed)
                    }
                    crate::wire::ConditionalWriteError::Wire(w) => $name::Wire(w),
                }
            }
        }
    };
}

impl_conditional_write_from!(PutError);
impl_conditional_write_from!(UpdateError);
impl_conditional_write_from!(DeleteError);

#[derive(Debug, Error)]
pub enum PutError {
    #[error(transparent)]
    ConditionFailed(#[from] ConditionFailed),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

impl PutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConditionFailed(_) => ErrorKind::ConditionFailed,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Expr(_) => ErrorKind::InvalidValue,
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    ConditionFailed(#[from] ConditionFailed),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConditionFailed(_) => ErrorKind::ConditionFailed,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Expr(_) => ErrorKind::InvalidValue,
            Self::Convert(_) => ErrorKind::InvalidValue,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error(transparent)]
    ConditionFailed(#[from] ConditionFailed),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

impl DeleteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConditionFailed(_) => ErrorKind::ConditionFailed,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Expr(_) => ErrorKind::InvalidValue,
        }
    }
}

op_error!(QueryError {
    Crypto(CryptoError) => ErrorKind::EncryptionNotConfigured,
    Deadline(DeadlineError) => ErrorKind::DeadlineImminent,
    Wire(WireError) => ErrorKind::Wire,
    Expr(ExprError) => ErrorKind::InvalidValue,
    Convert(ConvertError) => ErrorKind::InvalidValue,
});

op_error!(ScanError {
    Crypto(CryptoError) => ErrorKind::EncryptionNotConfigured,
    Deadline(DeadlineError) => ErrorKind::DeadlineImminent,
    Wire(WireError) => ErrorKind::Wire,
    Expr(ExprError) => ErrorKind::InvalidValue,
    Convert(ConvertError) => ErrorKind::InvalidValue,
});

#[derive(Debug, Error)]
pub enum BatchGetError {
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("{remaining} keys remained unprocessed after retries were exhausted")]
    UnprocessedKeysRemaining { remaining: usize },
}

impl BatchGetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Convert(_) => ErrorKind::InvalidValue,
            Self::UnprocessedKeysRemaining { .. } => ErrorKind::UnprocessedKeysRemaining,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchWriteError {
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("{remaining} items remained unprocessed after retries were exhausted")]
    UnprocessedItemsRemaining { remaining: usize },
}

impl BatchWriteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Expr(_) => ErrorKind::InvalidValue,
            Self::UnprocessedItemsRemaining { .. } => ErrorKind::UnprocessedKeysRemaining,
        }
    }
}

#[derive(Debug, Error)]
#[error("transaction failed at operation {operation_index} ({operation_kind} on {model}): {message}")]
pub struct TransactionFailure {
    pub operation_index: usize,
    pub operation_kind: &'static str,
    pub model: String,
    pub message: String,
    pub was_condition_check: bool,
}

#[derive(Debug, Error)]
pub enum TransactError {
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("too many operations: {0} exceeds the limit of 25")]
    TooManyOperations(usize),
    #[error(transparent)]
    Failed(#[from] TransactionFailure),
}

impl TransactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deadline(_) => ErrorKind::DeadlineImminent,
            Self::Wire(_) => ErrorKind::Wire,
            Self::Crypto(_) => ErrorKind::EncryptionNotConfigured,
            Self::Expr(_) => ErrorKind::InvalidValue,
            Self::TooManyOperations(_) => ErrorKind::InvalidValue,
            Self::Failed(f) if f.was_condition_check => ErrorKind::ConditionFailed,
            Self::Failed(_) => ErrorKind::TransactionFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease is currently held by another owner")]
    LeaseHeld,
    #[error("lease is not owned by the presented token")]
    LeaseNotOwned,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
}

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64url")]
    InvalidEncoding,
    #[error("cursor is not valid JSON")]
    InvalidJson,
    #[error(transparent)]
    Mismatch(#[from] ExprError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to assume role for tenant `{tenant}`: {message}")]
    AssumeRoleFailed { tenant: String, message: String },
    #[error("no base credentials configured")]
    NoBaseCredentials,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Advisory defense-in-depth checks (C12) over identifiers, operators, and
/// values before they reach the expression builder. Not a security
/// boundary — the store does not evaluate SQL, so there is no injection to
/// actually prevent; this exists to catch malformed or suspicious input
/// early and with a clearer message than a downstream store rejection.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("invalid operator `{0}`")]
    InvalidOperator(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("input resembles an injection attempt: {0}")]
    InjectionAttempt(String),
}

impl ValidateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidOperator,
            Self::InvalidOperator(_) => ErrorKind::InvalidOperator,
            Self::InvalidValue(_) => ErrorKind::InvalidValue,
            Self::InjectionAttempt(_) => ErrorKind::InjectionAttempt,
        }
    }
}

/// Aggregating error for callers that want a single `?`-friendly type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Get(#[from] GetError),
    #[error(transparent)]
    Put(#[from] PutError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    BatchGet(#[from] BatchGetError),
    #[error(transparent)]
    BatchWrite(#[from] BatchWriteError),
    #[error(transparent)]
    Transact(#[from] TransactError),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}
