use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use std::sync::{PoisonError, RwLock};

use vc_class::{ClassRegistry, TranslatorRegistry, TypeIdMap};

use crate::EmitError;
use crate::step::{Emitter, Plan, Step, describe_type};

// -----------------------------------------------------------------------------
// ContextId

/// Index of a [`TypeContext`] inside its [`Engine`](crate::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// -----------------------------------------------------------------------------
// Candidate

/// One way of mapping objects assignable to `bound`.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub bound: TypeId,
    pub bound_name: Arc<str>,
    pub plans: Arc<[Plan]>,
}

// -----------------------------------------------------------------------------
// ConcreteContext

/// The steps of a [`TypeContext`] specialized to one runtime type.
///
/// Built lazily the first time an object of that type is emitted, then shared
/// by every later emission.
#[derive(Debug)]
pub struct ConcreteContext {
    type_id: TypeId,
    type_name: Arc<str>,
    candidate: usize,
    steps: Box<[Step]>,
}

impl ConcreteContext {
    fn build(
        candidate: usize,
        plans: &[Plan],
        runtime: TypeId,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<Self, EmitError> {
        let steps = plans
            .iter()
            .map(|plan| plan.specialize(runtime, registry, translators))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            type_id: runtime,
            type_name: Arc::from(describe_type(registry, runtime)),
            candidate,
            steps: steps.into_boxed_slice(),
        })
    }

    /// The runtime type this context was built for.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Position of the selected candidate in its [`TypeContext`].
    #[inline]
    pub fn candidate(&self) -> usize {
        self.candidate
    }

    /// Number of emission steps.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn emit(
        &self,
        object: &dyn Any,
        emitter: &mut Emitter<'_, '_>,
    ) -> Result<(), EmitError> {
        self.steps.iter().try_for_each(|step| step.emit(object, emitter))
    }
}

// -----------------------------------------------------------------------------
// TypeContext

/// The compiled mapping of one position in a [`MappingSpec`](crate::MappingSpec).
///
/// A context holds an ordered list of candidates. An object is mapped by the
/// first candidate whose bound it is assignable to, so more specific bounds
/// must be declared before more general ones.
///
/// Concrete contexts are cached per runtime type. Concurrent emissions may
/// race to build the same entry. Only the first one is published and both
/// callers continue with it.
pub struct TypeContext {
    id: ContextId,
    label: Arc<str>,
    candidates: Vec<Candidate>,
    cache: RwLock<TypeIdMap<Arc<ConcreteContext>>>,
}

impl TypeContext {
    pub(crate) fn new(id: ContextId, label: String) -> Self {
        Self {
            id,
            label: Arc::from(label),
            candidates: Vec::new(),
            cache: RwLock::new(TypeIdMap::new()),
        }
    }

    pub(crate) fn push_candidate(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// A path like `Node/children/Node` naming where the context sits in the mapping.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Names of the candidate bounds, in dispatch order.
    pub fn candidate_bounds(&self) -> impl ExactSizeIterator<Item = &str> {
        self.candidates.iter().map(|c| &*c.bound_name)
    }

    /// Number of concrete contexts built so far.
    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the index of the first candidate accepting `runtime`.
    pub fn select(&self, registry: &ClassRegistry, runtime: TypeId) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| registry.is_assignable(c.bound, runtime))
    }

    /// Builds the concrete context for `runtime` without consulting the cache.
    pub fn specialize(
        &self,
        runtime: TypeId,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<ConcreteContext, EmitError> {
        let Some(index) = self.select(registry, runtime) else {
            return Err(EmitError::NoMatchingVariant {
                context: self.label.to_string(),
                type_name: describe_type(registry, runtime),
            });
        };
        let built = ConcreteContext::build(
            index,
            &self.candidates[index].plans,
            runtime,
            registry,
            translators,
        )?;
        log::trace!(
            "built `{}` for `{}` from candidate `{}` in {} steps",
            self.label,
            built.type_name,
            self.candidates[index].bound_name,
            built.steps.len(),
        );
        Ok(built)
    }

    /// Returns the concrete context for the runtime type of `object`.
    ///
    /// Builds and caches it on first use.
    pub fn resolve(
        &self,
        object: &dyn Any,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<Arc<ConcreteContext>, EmitError> {
        let runtime = object.type_id();
        if let Some(cached) = self.resolve_cached(runtime) {
            return Ok(cached);
        }
        let built = self.specialize(runtime, registry, translators)?;
        Ok(self.publish(Arc::new(built)))
    }

    /// Returns the concrete context of `runtime` if it was already built.
    pub fn resolve_cached(&self, runtime: TypeId) -> Option<Arc<ConcreteContext>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&runtime)
            .cloned()
    }

    fn publish(&self, built: Arc<ConcreteContext>) -> Arc<ConcreteContext> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let published = cache.get_or_insert(built.type_id, built.clone());
        if !Arc::ptr_eq(published, &built) {
            log::debug!(
                "`{}` for `{}` was built concurrently, keeping the first one",
                self.label,
                built.type_name,
            );
        }
        published.clone()
    }

    /// Builds the concrete context of every candidate whose bound is a concrete class.
    ///
    /// Returns the number of contexts added to the cache.
    pub(crate) fn prewarm(
        &self,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<usize, EmitError> {
        let mut added = 0;
        for candidate in &self.candidates {
            let concrete = registry
                .get(candidate.bound)
                .is_some_and(|meta| meta.is_concrete());
            if !concrete || self.resolve_cached(candidate.bound).is_some() {
                continue;
            }
            let built = self.specialize(candidate.bound, registry, translators)?;
            self.publish(Arc::new(built));
            added += 1;
        }
        Ok(added)
    }
}

impl core::fmt::Debug for TypeContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeContext")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("candidates", &self.candidates.len())
            .field("cached", &self.cached_len())
            .finish()
    }
}
