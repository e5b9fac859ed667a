use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};

use vc_class::{Accessor, ClassRegistry, Pulled, Translator, TranslatorRegistry};

use crate::{ContextId, EmitError, Engine, MarkupWriter, SlotId};

// -----------------------------------------------------------------------------
// Plan

/// A leaf node, compiled but not yet bound to a runtime type.
#[derive(Debug, Clone)]
pub(crate) struct LeafPlan {
    pub name: Arc<str>,
    pub accessor: Option<Arc<str>>,
    pub raw: bool,
}

/// A node delegating to another context.
#[derive(Debug, Clone)]
pub(crate) struct NestedPlan {
    pub accessor: Option<Arc<str>>,
    pub context: ContextId,
    pub wrapper: Option<Arc<str>>,
}

/// One compiled emission action of a candidate.
///
/// Plans only depend on the [`MappingSpec`](crate::MappingSpec). Binding them to
/// the runtime type of an object resolves their accessors and translators,
/// which yields [`Step`]s.
#[derive(Debug, Clone)]
pub(crate) enum Plan {
    Static(Arc<str>),
    Open(Arc<str>),
    Close(Arc<str>),
    Attribute(LeafPlan),
    Value(LeafPlan),
    Object(NestedPlan),
    Polymorphic(NestedPlan),
    Collection(NestedPlan),
    Reference(SlotId),
}

pub(crate) fn describe_type(registry: &ClassRegistry, type_id: TypeId) -> String {
    match registry.name_of(type_id) {
        Some(name) => name.to_string(),
        None => format!("{type_id:?}"),
    }
}

impl Plan {
    /// Binds the plan to the concrete class `runtime`.
    pub(crate) fn specialize(
        &self,
        runtime: TypeId,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<Step, EmitError> {
        let step = match self {
            Plan::Static(text) => Step::Static(text.clone()),
            Plan::Open(name) => Step::Open(name.clone()),
            Plan::Close(name) => Step::Close(name.clone()),
            Plan::Attribute(leaf) => {
                Step::Attribute(leaf.specialize(runtime, registry, translators)?)
            }
            Plan::Value(leaf) => Step::Value(leaf.specialize(runtime, registry, translators)?),
            Plan::Object(nested) => Step::Object(nested.specialize(runtime, registry)?),
            Plan::Polymorphic(nested) => Step::Polymorphic(nested.specialize(runtime, registry)?),
            Plan::Collection(nested) => Step::Collection(nested.specialize(runtime, registry)?),
            Plan::Reference(slot) => Step::Reference(*slot),
        };
        Ok(step)
    }
}

impl LeafPlan {
    fn specialize(
        &self,
        runtime: TypeId,
        registry: &ClassRegistry,
        translators: &TranslatorRegistry,
    ) -> Result<LeafStep, EmitError> {
        let source = Source::resolve(self.accessor.as_deref(), runtime, registry)?;
        let declared = match &source {
            Source::This => Some(runtime),
            Source::Accessor(accessor) => accessor.output(),
        };
        let translator = match declared {
            Some(type_id) => match translators.get(type_id) {
                Some(translator) => Some(translator.clone()),
                None => {
                    return Err(EmitError::MissingTranslator {
                        type_name: describe_type(registry, type_id),
                    });
                }
            },
            None => None,
        };
        Ok(LeafStep {
            name: self.name.clone(),
            source,
            translator,
            raw: self.raw,
        })
    }
}

impl NestedPlan {
    fn specialize(
        &self,
        runtime: TypeId,
        registry: &ClassRegistry,
    ) -> Result<NestedStep, EmitError> {
        Ok(NestedStep {
            source: Source::resolve(self.accessor.as_deref(), runtime, registry)?,
            context: self.context,
            wrapper: self.wrapper.clone(),
        })
    }
}

// -----------------------------------------------------------------------------
// Source

/// Where a step takes its value from.
#[derive(Debug)]
pub(crate) enum Source {
    /// The current object itself.
    This,
    Accessor(Accessor),
}

impl Source {
    fn resolve(
        accessor: Option<&str>,
        runtime: TypeId,
        registry: &ClassRegistry,
    ) -> Result<Self, EmitError> {
        let Some(name) = accessor else {
            return Ok(Source::This);
        };
        match registry.accessor(runtime, name) {
            Some(accessor) => Ok(Source::Accessor(accessor)),
            None => Err(EmitError::UnknownAccessor {
                class: describe_type(registry, runtime),
                accessor: name.to_string(),
            }),
        }
    }

    fn pull<'a>(&self, object: &'a dyn Any) -> Result<Pulled<'a>, EmitError> {
        match self {
            Source::This => Ok(Pulled::One(object)),
            Source::Accessor(accessor) => {
                accessor
                    .pull(object)
                    .map_err(|source| EmitError::AccessorFailure {
                        class: accessor.owner().to_string(),
                        accessor: accessor.name().to_string(),
                        source,
                    })
            }
        }
    }

    fn unexpected(&self, expected: &'static str, found: &Pulled<'_>) -> EmitError {
        let (class, accessor) = match self {
            Source::This => (String::from("<current object>"), String::from("<self>")),
            Source::Accessor(accessor) => {
                (accessor.owner().to_string(), accessor.name().to_string())
            }
        };
        EmitError::UnexpectedShape {
            class,
            accessor,
            expected,
            found: found.shape(),
        }
    }

    fn pull_one<'a>(&self, object: &'a dyn Any) -> Result<Option<&'a dyn Any>, EmitError> {
        match self.pull(object)? {
            Pulled::Absent => Ok(None),
            Pulled::One(value) => Ok(Some(value)),
            many => Err(self.unexpected("single value", &many)),
        }
    }

    fn pull_many<'a>(&self, object: &'a dyn Any) -> Result<Option<Vec<&'a dyn Any>>, EmitError> {
        match self.pull(object)? {
            Pulled::Absent => Ok(None),
            Pulled::Many(values) => Ok(Some(values)),
            one => Err(self.unexpected("sequence", &one)),
        }
    }
}

// -----------------------------------------------------------------------------
// Step

#[derive(Debug)]
pub(crate) struct LeafStep {
    name: Arc<str>,
    source: Source,
    // `None` when the value type is only known at runtime.
    translator: Option<Translator>,
    raw: bool,
}

impl LeafStep {
    fn text(&self, object: &dyn Any, engine: &Engine) -> Result<Option<String>, EmitError> {
        let Some(value) = self.source.pull_one(object)? else {
            return Ok(None);
        };
        if let Some(text) = self.translator.as_ref().and_then(|t| t.translate(value)) {
            return Ok(Some(text));
        }
        let runtime = (*value).type_id();
        match engine.translators().get(runtime).and_then(|t| t.translate(value)) {
            Some(text) => Ok(Some(text)),
            None => Err(EmitError::MissingTranslator {
                type_name: describe_type(engine.registry(), runtime),
            }),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NestedStep {
    source: Source,
    context: ContextId,
    wrapper: Option<Arc<str>>,
}

/// One emission action bound to a concrete runtime type.
#[derive(Debug)]
pub(crate) enum Step {
    Static(Arc<str>),
    Open(Arc<str>),
    Close(Arc<str>),
    Attribute(LeafStep),
    Value(LeafStep),
    Object(NestedStep),
    Polymorphic(NestedStep),
    Collection(NestedStep),
    /// Forwards to the context the slot was patched with.
    Reference(SlotId),
}

impl Step {
    pub(crate) fn emit(
        &self,
        object: &dyn Any,
        emitter: &mut Emitter<'_, '_>,
    ) -> Result<(), EmitError> {
        match self {
            Step::Static(text) => emitter.writer.raw(text)?,
            Step::Open(name) => emitter.writer.open(name)?,
            Step::Close(name) => emitter.writer.close(name)?,
            Step::Attribute(leaf) => {
                if let Some(text) = leaf.text(object, emitter.engine)? {
                    emitter.writer.attribute(&leaf.name, &text, leaf.raw)?;
                }
            }
            Step::Value(leaf) => {
                let text = leaf.text(object, emitter.engine)?;
                emitter.writer.open(&leaf.name)?;
                if let Some(text) = text {
                    emitter.writer.text(&text, leaf.raw)?;
                }
                emitter.writer.close(&leaf.name)?;
            }
            Step::Object(nested) | Step::Polymorphic(nested) => {
                if let Some(child) = nested.source.pull_one(object)? {
                    emitter.wrapped(nested.wrapper.as_deref(), |emitter| {
                        emitter.dispatch(nested.context, child)
                    })?;
                }
            }
            Step::Collection(nested) => {
                if let Some(items) = nested.source.pull_many(object)? {
                    emitter.wrapped(nested.wrapper.as_deref(), |emitter| {
                        items
                            .into_iter()
                            .try_for_each(|item| emitter.dispatch(nested.context, item))
                    })?;
                }
            }
            Step::Reference(slot) => {
                let slot = emitter.engine.references().get(*slot);
                let Some(target) = slot.target() else {
                    return Err(EmitError::UnresolvedReference(slot.id().to_string()));
                };
                emitter.dispatch(target, object)?;
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Emitter

/// The state of one emission call.
pub(crate) struct Emitter<'e, 's> {
    engine: &'e Engine,
    writer: MarkupWriter<'s>,
    depth: usize,
}

impl<'e, 's> Emitter<'e, 's> {
    pub(crate) fn new(engine: &'e Engine, writer: MarkupWriter<'s>) -> Self {
        Self {
            engine,
            writer,
            depth: 0,
        }
    }

    #[inline]
    pub(crate) fn writer(&mut self) -> &mut MarkupWriter<'s> {
        &mut self.writer
    }

    fn wrapped(
        &mut self,
        wrapper: Option<&str>,
        body: impl FnOnce(&mut Self) -> Result<(), EmitError>,
    ) -> Result<(), EmitError> {
        if let Some(name) = wrapper {
            self.writer.open(name)?;
        }
        body(self)?;
        if let Some(name) = wrapper {
            self.writer.close(name)?;
        }
        Ok(())
    }

    /// Resolves the concrete context of `object` in `context` and runs it.
    pub(crate) fn dispatch(
        &mut self,
        context: ContextId,
        object: &dyn Any,
    ) -> Result<(), EmitError> {
        let limit = self.engine.options().max_depth;
        if self.depth >= limit {
            return Err(EmitError::DepthExceeded { limit });
        }

        let concrete = self.engine.context(context).resolve(
            object,
            self.engine.registry(),
            self.engine.translators(),
        )?;

        self.depth += 1;
        let result = concrete.emit(object, self);
        self.depth -= 1;
        result
    }
}
