use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// NodeKind

/// The kind of a [`MappingNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The top of a mapping, one element for the root object.
    Root,
    /// Groups attribute nodes, must precede element producing siblings.
    AttributeGroup,
    /// A `name="value"` pair on the enclosing element.
    Attribute,
    /// A leaf element with text content.
    Value,
    /// A nested object of a known upper bound.
    Object,
    /// A nested object whose mapping is picked among `item` children.
    Polymorphic,
    /// An ordered sequence, every element dispatched among `item` children.
    Collection,
    /// One candidate of a polymorphic or collection node.
    Item,
    /// Delegates to the node registered under the same id.
    Reference,
    /// Fixed text, written verbatim.
    Static,
}

impl NodeKind {
    /// The tag used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::AttributeGroup => "attribute_group",
            Self::Attribute => "attribute",
            Self::Value => "value",
            Self::Object => "object",
            Self::Polymorphic => "polymorphic",
            Self::Collection => "collection",
            Self::Item => "item",
            Self::Reference => "reference",
            Self::Static => "static",
        }
    }

    /// Returns `true` for the kinds that write into the opening tag.
    #[inline]
    pub const fn is_attribute(self) -> bool {
        matches!(self, Self::Attribute | Self::AttributeGroup)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// MappingNode

/// One node of a [`MappingSpec`].
///
/// Which fields matter depends on the [`kind`](Self::kind):
///
/// | kind              | name              | accessor  | bound    | children     |
/// |-------------------|-------------------|-----------|----------|--------------|
/// | `root`            | element, optional | -         | required | body         |
/// | `attribute_group` | -                 | -         | -        | attributes   |
/// | `attribute`       | required          | optional  | -        | -            |
/// | `value`           | required          | optional  | -        | -            |
/// | `object`          | element, optional | required  | required | body         |
/// | `polymorphic`     | wrapper, optional | optional  | -        | items        |
/// | `collection`      | wrapper, optional | required  | -        | items        |
/// | `item`            | element, optional | -         | required | body         |
/// | `reference`       | -                 | -         | -        | -            |
/// | `static`          | -                 | -         | -        | -            |
///
/// A missing accessor means the node applies to the current object itself.
/// `id` names the target of a `reference` node, and registers any other node.
/// `text` is the fixed text of a `static` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingNode {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MappingNode>,
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MappingNode {
    /// Creates a node of `kind` with every other field empty.
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            accessor: None,
            bound: None,
            children: Vec::new(),
            raw: false,
            id: None,
            text: None,
        }
    }

    /// A root emitting the element `name` for objects assignable to `bound`.
    pub fn root(name: &str, bound: &str) -> Self {
        Self {
            name: Some(name.into()),
            bound: Some(bound.into()),
            ..Self::new(NodeKind::Root)
        }
    }

    /// An empty attribute group.
    pub const fn attribute_group() -> Self {
        Self::new(NodeKind::AttributeGroup)
    }

    /// An attribute `name`, valued by `accessor` or by the current object.
    pub fn attribute<'a>(name: &str, accessor: impl Into<Option<&'a str>>) -> Self {
        Self {
            name: Some(name.into()),
            accessor: accessor.into().map(String::from),
            ..Self::new(NodeKind::Attribute)
        }
    }

    /// A leaf element `name`, valued by `accessor` or by the current object.
    pub fn value<'a>(name: &str, accessor: impl Into<Option<&'a str>>) -> Self {
        Self {
            name: Some(name.into()),
            accessor: accessor.into().map(String::from),
            ..Self::new(NodeKind::Value)
        }
    }

    /// A nested object pulled by `accessor`, emitted as the element `name`.
    pub fn object(name: &str, accessor: &str, bound: &str) -> Self {
        Self {
            name: Some(name.into()),
            accessor: Some(accessor.into()),
            bound: Some(bound.into()),
            ..Self::new(NodeKind::Object)
        }
    }

    /// A polymorphic slot pulled by `accessor`, or the current object.
    pub fn polymorphic<'a>(accessor: impl Into<Option<&'a str>>) -> Self {
        Self {
            accessor: accessor.into().map(String::from),
            ..Self::new(NodeKind::Polymorphic)
        }
    }

    /// A collection pulled by `accessor`.
    pub fn collection(accessor: &str) -> Self {
        Self {
            accessor: Some(accessor.into()),
            ..Self::new(NodeKind::Collection)
        }
    }

    /// A dispatch candidate for objects assignable to `bound`.
    pub fn item(bound: &str) -> Self {
        Self {
            bound: Some(bound.into()),
            ..Self::new(NodeKind::Item)
        }
    }

    /// A reference to the node registered under `id`.
    pub fn reference(id: &str) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(NodeKind::Reference)
        }
    }

    /// Fixed text.
    pub fn static_text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(NodeKind::Static)
        }
    }

    /// Sets the reference id.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the element, attribute or wrapper name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Removes the element, attribute or wrapper name.
    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    /// Appends a child node.
    pub fn with_child(mut self, child: MappingNode) -> Self {
        self.children.push(child);
        self
    }

    /// Appends several child nodes, in order.
    pub fn with_children(mut self, children: impl IntoIterator<Item = MappingNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Marks a value or attribute as raw, written without escaping.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

// -----------------------------------------------------------------------------
// MappingSpec

/// A complete, declarative mapping description.
///
/// Usually produced by a configuration loader:
///
/// ```
/// use vc_markup::{MappingSpec, NodeKind};
///
/// let spec: MappingSpec = serde_json::from_str(r#"{
///     "root": {
///         "kind": "root",
///         "name": "point",
///         "bound": "Point",
///         "children": [
///             { "kind": "attribute", "name": "x", "accessor": "x" },
///             { "kind": "attribute", "name": "y", "accessor": "y" }
///         ]
///     }
/// }"#).unwrap();
///
/// assert_eq!(spec.root.kind, NodeKind::Root);
/// assert_eq!(spec.root.children.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub root: MappingNode,
}

impl MappingSpec {
    /// Wraps a root node.
    #[inline]
    pub const fn new(root: MappingNode) -> Self {
        Self { root }
    }
}
