use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::TypeId;

use vc_class::{ClassRegistry, TranslatorRegistry};

use crate::context::Candidate;
use crate::step::{LeafPlan, NestedPlan, Plan};
use crate::{
    ConfigError, ContextId, MappingNode, MappingSpec, NodeKind, ReferenceTable, SlotId,
    TypeContext,
};

/// The output of a successful compilation.
pub(crate) struct Compiled {
    pub contexts: Vec<TypeContext>,
    pub references: ReferenceTable,
    pub root: ContextId,
}

#[derive(Clone)]
struct Bound {
    id: TypeId,
    name: Arc<str>,
}

fn required<'n>(
    node: &'n MappingNode,
    value: Option<&'n String>,
    field: &'static str,
) -> Result<&'n str, ConfigError> {
    value.map(String::as_str).ok_or(ConfigError::MissingField {
        kind: node.kind,
        field,
    })
}

fn childless(node: &MappingNode) -> Result<(), ConfigError> {
    match node.children.first() {
        Some(child) => Err(ConfigError::UnexpectedChild {
            parent: node.kind,
            child: child.kind,
        }),
        None => Ok(()),
    }
}

/// Turns a [`MappingSpec`] into an arena of [`TypeContext`]s.
///
/// Every structural position gets its own context. Nodes carrying an id also
/// get a context of their own, which their forwarding slot is patched with
/// once the node has been built.
pub(crate) struct Compiler<'a> {
    registry: &'a ClassRegistry,
    translators: &'a TranslatorRegistry,
    contexts: Vec<TypeContext>,
    references: ReferenceTable,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(registry: &'a ClassRegistry, translators: &'a TranslatorRegistry) -> Self {
        Self {
            registry,
            translators,
            contexts: Vec::new(),
            references: ReferenceTable::new(),
        }
    }

    pub(crate) fn compile(mut self, spec: &MappingSpec) -> Result<Compiled, ConfigError> {
        let node = &spec.root;
        if node.kind != NodeKind::Root {
            return Err(ConfigError::NotARoot(node.kind));
        }

        let bound = self.bound(node)?;
        let label = node.name.as_deref().unwrap_or(&bound.name).to_string();
        let root = self.reserve(label.clone());
        let slot = self.register(node)?;
        let candidate = self.candidate(node, bound, &label)?;
        self.contexts[root.index()].push_candidate(candidate);
        if let Some(slot) = slot {
            self.references.fulfil(slot, root);
        }

        self.references.verify()?;

        log::debug!(
            "compiled mapping `{label}` into {} contexts and {} reference slots",
            self.contexts.len(),
            self.references.len(),
        );

        Ok(Compiled {
            contexts: self.contexts,
            references: self.references,
            root,
        })
    }

    fn bound(&self, node: &MappingNode) -> Result<Bound, ConfigError> {
        let name = required(node, node.bound.as_ref(), "bound")?;
        match self.registry.id_of(name) {
            Some(id) => Ok(Bound {
                id,
                name: Arc::from(name),
            }),
            None => Err(ConfigError::UnknownType(name.to_string())),
        }
    }

    fn reserve(&mut self, label: String) -> ContextId {
        let id = ContextId::new(self.contexts.len());
        self.contexts.push(TypeContext::new(id, label));
        id
    }

    fn register(&mut self, node: &MappingNode) -> Result<Option<SlotId>, ConfigError> {
        match node.id.as_deref() {
            Some(id) if node.kind != NodeKind::Reference => {
                self.references.register(id, node.kind).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn accessor(
        &self,
        node: &MappingNode,
        bound: &Bound,
        is_required: bool,
    ) -> Result<Option<Arc<str>>, ConfigError> {
        match node.accessor.as_deref() {
            Some(name) if self.registry.has_accessor(bound.id, name) => Ok(Some(Arc::from(name))),
            Some(name) => Err(ConfigError::UnknownAccessor {
                class: bound.name.to_string(),
                accessor: name.to_string(),
            }),
            None if is_required => Err(ConfigError::MissingField {
                kind: node.kind,
                field: "accessor",
            }),
            None => Ok(None),
        }
    }

    /// Compiles the body of a root, object or item node, wrapped in its element.
    fn candidate(
        &mut self,
        node: &MappingNode,
        bound: Bound,
        label: &str,
    ) -> Result<Candidate, ConfigError> {
        let element = node.name.as_deref().map(Arc::<str>::from);
        let (attributes, content) = self.body(node, &bound, label)?;
        if element.is_none() && !attributes.is_empty() {
            return Err(ConfigError::AttributeWithoutElement {
                context: label.to_string(),
            });
        }

        let mut plans = Vec::with_capacity(attributes.len() + content.len() + 2);
        if let Some(name) = &element {
            plans.push(Plan::Open(name.clone()));
        }
        plans.extend(attributes);
        plans.extend(content);
        if let Some(name) = element {
            plans.push(Plan::Close(name));
        }

        Ok(Candidate {
            bound: bound.id,
            bound_name: bound.name,
            plans: plans.into(),
        })
    }

    fn body(
        &mut self,
        node: &MappingNode,
        bound: &Bound,
        label: &str,
    ) -> Result<(Vec<Plan>, Vec<Plan>), ConfigError> {
        let mut attributes = Vec::new();
        let mut content = Vec::new();

        for child in &node.children {
            match child.kind {
                NodeKind::Attribute | NodeKind::AttributeGroup if !content.is_empty() => {
                    let attribute = match child.kind {
                        NodeKind::Attribute => child.name.clone().unwrap_or_default(),
                        _ => String::from("attribute_group"),
                    };
                    return Err(ConfigError::AttributeAfterElement {
                        context: label.to_string(),
                        attribute,
                    });
                }
                NodeKind::Attribute => {
                    self.register(child)?;
                    attributes.push(Plan::Attribute(self.leaf(child, bound, label)?));
                }
                NodeKind::AttributeGroup => {
                    self.register(child)?;
                    for attribute in &child.children {
                        if attribute.kind != NodeKind::Attribute {
                            return Err(ConfigError::UnexpectedChild {
                                parent: child.kind,
                                child: attribute.kind,
                            });
                        }
                        self.register(attribute)?;
                        attributes.push(Plan::Attribute(self.leaf(attribute, bound, label)?));
                    }
                }
                NodeKind::Item => {
                    return Err(ConfigError::ItemOutsideDispatch {
                        context: label.to_string(),
                    });
                }
                NodeKind::Root => {
                    return Err(ConfigError::UnexpectedChild {
                        parent: node.kind,
                        child: child.kind,
                    });
                }
                _ => content.push(self.content(child, bound, label)?),
            }
        }

        Ok((attributes, content))
    }

    fn leaf(
        &self,
        node: &MappingNode,
        bound: &Bound,
        label: &str,
    ) -> Result<LeafPlan, ConfigError> {
        childless(node)?;
        let name = required(node, node.name.as_ref(), "name")?;
        let accessor = self.accessor(node, bound, false)?;

        let output = match &accessor {
            Some(accessor) => self.registry.accessor_output(bound.id, accessor).flatten(),
            None => self
                .registry
                .get(bound.id)
                .filter(|meta| meta.is_concrete())
                .map(|meta| meta.type_id()),
        };
        if output.is_some_and(|output| !self.translators.contains(output)) {
            return Err(ConfigError::MissingTranslator {
                context: label.to_string(),
                node: name.to_string(),
            });
        }

        Ok(LeafPlan {
            name: Arc::from(name),
            accessor,
            raw: node.raw,
        })
    }

    fn content(
        &mut self,
        node: &MappingNode,
        bound: &Bound,
        label: &str,
    ) -> Result<Plan, ConfigError> {
        let slot = self.register(node)?;

        let plan = match node.kind {
            NodeKind::Static => {
                childless(node)?;
                Plan::Static(Arc::from(required(node, node.text.as_ref(), "text")?))
            }
            NodeKind::Value => Plan::Value(self.leaf(node, bound, label)?),
            NodeKind::Object => {
                let accessor = self.accessor(node, bound, true)?;
                let inner = self.bound(node)?;
                let position = node
                    .name
                    .as_deref()
                    .or(node.accessor.as_deref())
                    .unwrap_or_default();
                let nested_label = format!("{label}/{position}");
                let context = self.reserve(nested_label.clone());
                let candidate = self.candidate(node, inner, &nested_label)?;
                self.contexts[context.index()].push_candidate(candidate);
                Plan::Object(NestedPlan {
                    accessor,
                    context,
                    wrapper: None,
                })
            }
            NodeKind::Polymorphic | NodeKind::Collection => {
                let is_collection = node.kind == NodeKind::Collection;
                let accessor = self.accessor(node, bound, is_collection)?;
                let position = node
                    .name
                    .as_deref()
                    .or(node.accessor.as_deref())
                    .unwrap_or(node.kind.as_str());
                let context = self.dispatch(node, &format!("{label}/{position}"))?;
                let nested = NestedPlan {
                    accessor,
                    context,
                    wrapper: node.name.as_deref().map(Arc::from),
                };
                if is_collection {
                    Plan::Collection(nested)
                } else {
                    Plan::Polymorphic(nested)
                }
            }
            NodeKind::Reference => {
                childless(node)?;
                let id = required(node, node.id.as_ref(), "id")?;
                Plan::Reference(self.references.demand(id))
            }
            NodeKind::Root | NodeKind::AttributeGroup | NodeKind::Attribute | NodeKind::Item => {
                return Err(ConfigError::UnexpectedChild {
                    parent: NodeKind::Root,
                    child: node.kind,
                });
            }
        };

        if let Some(slot) = slot {
            let own = self.reserve(format!("{label}#{}", self.references.get(slot).id()));
            self.contexts[own.index()].push_candidate(Candidate {
                bound: bound.id,
                bound_name: bound.name.clone(),
                plans: Arc::from([plan.clone()]),
            });
            self.references.fulfil(slot, own);
        }

        Ok(plan)
    }

    /// Compiles the items of a polymorphic or collection node into one context.
    fn dispatch(&mut self, node: &MappingNode, label: &str) -> Result<ContextId, ConfigError> {
        if node.children.is_empty() {
            return Err(ConfigError::MissingField {
                kind: node.kind,
                field: "items",
            });
        }

        let context = self.reserve(label.to_string());
        for item in &node.children {
            if item.kind != NodeKind::Item {
                return Err(ConfigError::UnexpectedChild {
                    parent: node.kind,
                    child: item.kind,
                });
            }
            let bound = self.bound(item)?;
            let slot = self.register(item)?;
            let item_label = format!("{label}/{}", item.name.as_deref().unwrap_or(&bound.name));
            let candidate = self.candidate(item, bound, &item_label)?;
            if let Some(slot) = slot {
                let own = self.reserve(item_label);
                self.contexts[own.index()].push_candidate(candidate.clone());
                self.references.fulfil(slot, own);
            }
            self.contexts[context.index()].push_candidate(candidate);
        }

        Ok(context)
    }
}
