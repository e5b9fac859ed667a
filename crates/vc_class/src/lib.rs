//! Runtime class model for object-graph mapping.
//!
//! Rust has no runtime reflection, so every type that takes part in a mapping is
//! registered explicitly: concrete classes carry their accessors as typed closures,
//! interfaces (trait objects) act as abstract upper bounds, and an `implements`
//! relation with an upcast function links the two.
//!
//! ## Menu
//!
//! - [`ClassRegistry`]: storage for [`ClassMeta`], name lookup and assignability checks.
//! - [`ClassBuilder`]: registration-time builder for accessors and supertypes.
//! - [`Accessor`]: an erased accessor resolved for one concrete runtime type.
//! - [`Pulled`]: the value an accessor pulls out of its parent object.
//! - [`TranslatorRegistry`]: leaf-value to text translators keyed by [`TypeId`].
//!
//! [`TypeId`]: core::any::TypeId
#![no_std]

// -----------------------------------------------------------------------------
// no_std support

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod accessor;
mod class;
mod error;
mod pulled;
mod registry;
mod translate;

pub mod hash;

// -----------------------------------------------------------------------------
// Top-level exports

pub use accessor::Accessor;
pub use class::{ClassBuilder, ClassMeta};
pub use error::AccessError;
pub use hash::TypeIdMap;
pub use pulled::Pulled;
pub use registry::ClassRegistry;
pub use translate::{Translator, TranslatorRegistry};
