use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::TypeId;

use crate::accessor::{AccessEntry, FinishFn};
use crate::hash::HashMap;
use crate::{Accessor, ClassMeta, TypeIdMap};

// -----------------------------------------------------------------------------
// ClassRegistry

/// A registry of mappable classes and interfaces.
///
/// This is the central store of runtime type information: which accessors a
/// class provides, and which upper bounds it is assignable to.
///
/// # Example
///
/// ```
/// use core::any::TypeId;
/// use vc_class::ClassRegistry;
///
/// struct Node {
///     name: String,
/// }
///
/// let mut registry = ClassRegistry::new();
/// registry.class::<Node>("Node").field("name", |n| Some(&n.name));
///
/// let id = registry.id_of("Node").unwrap();
/// assert_eq!(id, TypeId::of::<Node>());
/// assert!(registry.has_accessor(id, "name"));
/// assert!(registry.is_assignable(id, id));
/// ```
#[derive(Default)]
pub struct ClassRegistry {
    classes: TypeIdMap<ClassMeta>,
    // `None` marks a name shared by several types.
    names: HashMap<Arc<str>, Option<TypeId>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry<T: ?Sized + 'static>(
        &mut self,
        name: &str,
        finish: Option<FinishFn>,
    ) -> &mut ClassMeta {
        let type_id = TypeId::of::<T>();

        let name: Arc<str> = match self.classes.get(&type_id) {
            Some(existing) => {
                if existing.name() != name {
                    log::warn!(
                        "type `{}` is already registered as `{}`, ignoring the name `{name}`",
                        existing.type_path(),
                        existing.name(),
                    );
                }
                existing.name_arc().clone()
            }
            None => {
                let name: Arc<str> = Arc::from(name);
                match self.names.get_mut(&name) {
                    Some(slot) => {
                        log::warn!("class name `{name}` is ambiguous, it names several types");
                        *slot = None;
                    }
                    None => {
                        self.names.insert(name.clone(), Some(type_id));
                    }
                }
                name
            }
        };

        self.classes
            .get_or_insert(type_id, ClassMeta::new::<T>(name, finish))
    }

    /// Returns the [`ClassMeta`] registered for `type_id`.
    #[inline]
    pub fn get(&self, type_id: TypeId) -> Option<&ClassMeta> {
        self.classes.get(&type_id)
    }

    /// Returns the [`TypeId`] registered under `name`.
    ///
    /// Ambiguous names return `None`.
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied().flatten()
    }

    /// Returns the [`ClassMeta`] registered under `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&ClassMeta> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Returns the registration name of `type_id`.
    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.get(type_id).map(ClassMeta::name)
    }

    /// Returns `true` if `name` was used for more than one type.
    pub fn is_ambiguous(&self, name: &str) -> bool {
        matches!(self.names.get(name), Some(None))
    }

    /// Returns the number of registered classes and interfaces.
    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if nothing was registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns an iterator over the registered classes, in arbitrary order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ClassMeta> {
        self.classes.values()
    }

    /// Returns `true` if a value of type `runtime` may be used where `bound` is expected.
    ///
    /// That is the case when both are the same type, or when `runtime` reaches `bound`
    /// through its declared supertypes.
    pub fn is_assignable(&self, bound: TypeId, runtime: TypeId) -> bool {
        if bound == runtime {
            return true;
        }

        let mut visited: Vec<TypeId> = Vec::new();
        let mut pending: Vec<TypeId> = Vec::from([runtime]);

        while let Some(current) = pending.pop() {
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);

            let Some(meta) = self.classes.get(&current) else {
                continue;
            };
            for target in meta.supertypes() {
                if target == bound {
                    return true;
                }
                pending.push(target);
            }
        }

        false
    }

    /// Finds `name` on `type_id` or, depth first in declaration order, on its supertypes.
    ///
    /// Cyclic `implements` declarations are legal, every type is visited once.
    fn lookup(&self, type_id: TypeId, name: &str) -> Option<AccessEntry> {
        self.lookup_in(type_id, name, &mut Vec::new())
    }

    fn lookup_in(
        &self,
        type_id: TypeId,
        name: &str,
        visited: &mut Vec<TypeId>,
    ) -> Option<AccessEntry> {
        if visited.contains(&type_id) {
            return None;
        }
        visited.push(type_id);

        let meta = self.classes.get(&type_id)?;
        if let Some(entry) = meta.accessors.get(name) {
            return Some(entry.clone());
        }
        meta.supers.iter().find_map(|link| {
            let inherited = self.lookup_in(link.target, name, visited)?;
            (link.lift)(&inherited)
        })
    }

    /// Returns `true` if `bound` declares or inherits an accessor called `name`.
    pub fn has_accessor(&self, bound: TypeId, name: &str) -> bool {
        self.lookup(bound, name).is_some()
    }

    /// Returns the declared output type of an accessor on `bound`.
    ///
    /// The outer `Option` tells whether the accessor exists at all.
    pub fn accessor_output(&self, bound: TypeId, name: &str) -> Option<Option<TypeId>> {
        self.lookup(bound, name).map(|entry| entry.output)
    }

    /// Resolves the accessor `name` for the concrete class `runtime`.
    ///
    /// Accessors declared on the class itself take precedence over inherited ones.
    /// Returns `None` for interfaces, unknown types and unknown accessors.
    pub fn accessor(&self, runtime: TypeId, name: &str) -> Option<Accessor> {
        let meta = self.classes.get(&runtime)?;
        let finish = meta.finish?;
        let entry = self.lookup(runtime, name)?;
        let fun = finish(&entry)?;
        Some(Accessor::new(
            Arc::from(name),
            meta.name_arc().clone(),
            entry.output,
            fun,
        ))
    }
}

impl core::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set()
            .entries(self.classes.values().map(ClassMeta::name))
            .finish()
    }
}
