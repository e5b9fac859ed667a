use alloc::string::String;

use thiserror::Error;
use vc_class::AccessError;

use crate::NodeKind;

// -----------------------------------------------------------------------------
// ConfigError

/// A structurally invalid mapping, always reported while compiling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("the top of a mapping must be a `root` node, found `{0}`")]
    NotARoot(NodeKind),

    #[error("`{kind}` node is missing its `{field}`")]
    MissingField {
        kind: NodeKind,
        field: &'static str,
    },

    #[error("`{child}` node cannot appear inside a `{parent}` node")]
    UnexpectedChild { parent: NodeKind, child: NodeKind },

    #[error("attribute `{attribute}` of `{context}` follows an element producing node")]
    AttributeAfterElement { context: String, attribute: String },

    #[error("`{context}` declares attributes but emits no element to carry them")]
    AttributeWithoutElement { context: String },

    #[error("`item` node in `{context}` is not inside a polymorphic or collection node")]
    ItemOutsideDispatch { context: String },

    #[error("unknown or ambiguous type name `{0}`")]
    UnknownType(String),

    #[error("type `{class}` has no accessor `{accessor}`")]
    UnknownAccessor { class: String, accessor: String },

    #[error("no translator for the value of `{node}` in `{context}`")]
    MissingTranslator { context: String, node: String },

    #[error("reference id `{0}` is registered more than once")]
    DuplicateReference(String),

    #[error("reference id `{0}` is never registered")]
    UnresolvedReference(String),

    #[error("reference id `{0}` was registered but its node never finished building")]
    UnfulfilledReference(String),

    #[error("reference id `{0}` names an attribute, which cannot be referenced")]
    ReferenceToAttribute(String),

    #[error("eager construction of `{context}` failed: {source}")]
    Prewarm {
        context: String,
        #[source]
        source: EmitError,
    },
}

// -----------------------------------------------------------------------------
// EmitError

/// A failure while emitting markup.
///
/// Every error aborts the emission, output already written is left in the sink.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmitError {
    #[error("no variant of `{context}` accepts an object of type `{type_name}`")]
    NoMatchingVariant { context: String, type_name: String },

    #[error("accessor `{accessor}` failed on `{class}`: {source}")]
    AccessorFailure {
        class: String,
        accessor: String,
        #[source]
        source: AccessError,
    },

    #[error("accessor `{accessor}` of `{class}` produced a {found}, expected a {expected}")]
    UnexpectedShape {
        class: String,
        accessor: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("type `{class}` has no accessor `{accessor}`")]
    UnknownAccessor { class: String, accessor: String },

    #[error("no translator for values of type `{type_name}`")]
    MissingTranslator { type_name: String },

    #[error("object graph is nested deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("reference slot `{0}` has no target")]
    UnresolvedReference(String),

    #[error("sink rejected a write: {0}")]
    Io(#[from] std::io::Error),
}
