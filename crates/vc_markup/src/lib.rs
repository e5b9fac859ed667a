//! Configuration driven object-graph to markup serialization.
//!
//! A [`MappingSpec`] describes, declaratively, how objects map onto markup:
//! which accessors to visit, in which order, and whether each result becomes an
//! attribute, a leaf element, a nested object, a polymorphic slot, a collection or
//! a back-reference to another part of the mapping.
//!
//! A mapping is compiled once into an [`Engine`]. Emission then walks the object
//! graph, dispatching on the *runtime* type of every visited object.
//!
//! ## Overview
//!
//! - [`MappingSpec`] / [`MappingNode`]: the declarative tree, loadable through `serde`.
//! - [`ReferenceTable`]: forwarding slots for nodes referenced by id, which is
//!   what allows a mapping to refer to one of its ancestors.
//! - [`TypeContext`]: the compiled mapping of one structural position, which
//!   lazily builds and caches one [`ConcreteContext`] per runtime type.
//! - [`Engine`]: the entry point, `compile` then `emit` into a [`Sink`].
//!
//! # Examples
//!
//! ```
//! use vc_class::ClassRegistry;
//! use vc_markup::{Engine, MappingNode, MappingSpec};
//!
//! struct Node {
//!     name: String,
//!     children: Vec<Node>,
//! }
//!
//! let mut registry = ClassRegistry::new();
//! registry
//!     .class::<Node>("Node")
//!     .field("name", |n| Some(&n.name))
//!     .sequence("children", |n| &n.children);
//!
//! let spec = MappingSpec::new(
//!     MappingNode::root("Node", "Node")
//!         .with_id("node")
//!         .with_child(MappingNode::attribute_group()
//!             .with_child(MappingNode::attribute("name", "name")))
//!         .with_child(MappingNode::collection("children")
//!             .with_child(MappingNode::item("Node")
//!                 .with_child(MappingNode::reference("node")))),
//! );
//!
//! let engine = Engine::builder(registry).compile(&spec).unwrap();
//!
//! let tree = Node {
//!     name: "A".into(),
//!     children: vec![
//!         Node { name: "B".into(), children: vec![] },
//!         Node { name: "C".into(), children: vec![] },
//!     ],
//! };
//!
//! assert_eq!(
//!     engine.emit_to_string(&tree).unwrap(),
//!     r#"<Node name="A"><Node name="B"/><Node name="C"/></Node>"#,
//! );
//! ```
#![no_std]

// -----------------------------------------------------------------------------
// no_std support

// Caches and sinks need `std::sync` and `std::io`.
extern crate std;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod compile;
mod context;
mod engine;
mod error;
mod reference;
mod sink;
mod spec;
mod step;
mod writer;

// -----------------------------------------------------------------------------
// Top-level exports

pub use context::{ConcreteContext, ContextId, TypeContext};
pub use engine::{Engine, EngineBuilder, EngineOptions, compile};
pub use error::{ConfigError, EmitError};
pub use reference::{ForwardingSlot, ReferenceTable, SlotId};
pub use sink::{IoSink, Sink};
pub use spec::{MappingNode, MappingSpec, NodeKind};
pub use writer::MarkupWriter;
