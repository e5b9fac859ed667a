use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt::Debug;

use crate::accessor::{AccessEntry, FinishFn, LiftFn, access_fn, lift_fn};
use crate::hash::HashMap;
use crate::{AccessError, ClassRegistry, Pulled};

// -----------------------------------------------------------------------------
// ClassMeta

/// A link from a class to one of its declared supertypes.
pub(crate) struct SuperLink {
    pub target: TypeId,
    pub lift: LiftFn,
}

/// Runtime storage for one registered class or interface.
///
/// Created through [`ClassRegistry::class`] or [`ClassRegistry::interface`].
pub struct ClassMeta {
    type_id: TypeId,
    name: Arc<str>,
    type_path: &'static str,
    pub(crate) accessors: HashMap<Arc<str>, AccessEntry>,
    pub(crate) supers: Vec<SuperLink>,
    // `None` for interfaces, which are never instantiated.
    pub(crate) finish: Option<FinishFn>,
}

impl ClassMeta {
    pub(crate) fn new<T: ?Sized + 'static>(name: Arc<str>, finish: Option<FinishFn>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name,
            type_path: core::any::type_name::<T>(),
            accessors: HashMap::default(),
            supers: Vec::new(),
            finish,
        }
    }

    /// The [`TypeId`] the class was registered with.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The registration name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// The compiler provided type path, for diagnostics only.
    #[inline]
    pub fn type_path(&self) -> &'static str {
        self.type_path
    }

    /// Returns `true` for concrete classes, `false` for interfaces.
    #[inline]
    pub fn is_concrete(&self) -> bool {
        self.finish.is_some()
    }

    /// Names of the accessors declared directly on this class.
    pub fn accessor_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(|name| &**name)
    }

    /// The declared supertypes, in declaration order.
    pub fn supertypes(&self) -> impl ExactSizeIterator<Item = TypeId> + '_ {
        self.supers.iter().map(|link| link.target)
    }
}

impl Debug for ClassMeta {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClassMeta")
            .field("name", &self.name)
            .field("type_path", &self.type_path)
            .field("concrete", &self.is_concrete())
            .field("accessors", &self.accessors.len())
            .field("supers", &self.supers.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ClassBuilder

/// Registers accessors and supertypes of `T`.
///
/// # Examples
///
/// ```
/// use core::any::Any;
/// use vc_class::{ClassRegistry, Pulled};
///
/// trait Shape: Any {
///     fn label(&self) -> &String;
/// }
///
/// struct Square {
///     label: String,
///     side: u32,
/// }
///
/// impl Shape for Square {
///     fn label(&self) -> &String {
///         &self.label
///     }
/// }
///
/// let mut registry = ClassRegistry::new();
/// registry
///     .interface::<dyn Shape>("Shape")
///     .accessor("label", |s| Ok(Pulled::one(s.label())));
/// registry
///     .class::<Square>("Square")
///     .field("side", |s| Some(&s.side))
///     .implements::<dyn Shape>(|s| s);
///
/// let square = Square { label: "square".into(), side: 3 };
/// let id = core::any::TypeId::of::<Square>();
/// let label = registry.accessor(id, "label").unwrap();
/// let Ok(Pulled::One(value)) = label.pull(&square) else { unreachable!() };
/// assert_eq!(value.downcast_ref::<String>().unwrap(), "square");
/// ```
pub struct ClassBuilder<'r, T: ?Sized + 'static> {
    meta: &'r mut ClassMeta,
    _marker: core::marker::PhantomData<fn(&T)>,
}

impl<'r, T: ?Sized + 'static> ClassBuilder<'r, T> {
    pub(crate) fn new(meta: &'r mut ClassMeta) -> Self {
        Self {
            meta,
            _marker: core::marker::PhantomData,
        }
    }

    fn insert(&mut self, name: &str, entry: AccessEntry) {
        if self.meta.accessors.insert(Arc::from(name), entry).is_some() {
            log::warn!(
                "accessor `{name}` of class `{}` was registered twice, the last one wins",
                self.meta.name,
            );
        }
    }

    /// Registers a general, fallible accessor.
    pub fn accessor<F>(mut self, name: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a T) -> Result<Pulled<'a>, AccessError> + Send + Sync + 'static,
    {
        self.insert(name, AccessEntry::new::<T>(None, access_fn(f)));
        self
    }

    /// Registers an accessor for an optional value of the statically known type `V`.
    ///
    /// Knowing `V` lets leaf steps pick their translator once, when they are built.
    pub fn field<V, F>(mut self, name: &str, f: F) -> Self
    where
        V: Any,
        F: for<'a> Fn(&'a T) -> Option<&'a V> + Send + Sync + 'static,
    {
        let fun = access_fn(move |value: &T| Ok(Pulled::maybe(f(value))));
        self.insert(name, AccessEntry::new::<T>(Some(TypeId::of::<V>()), fun));
        self
    }

    /// Registers an accessor for an optional object whose type is only known at runtime.
    pub fn object<F>(mut self, name: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a T) -> Option<&'a dyn Any> + Send + Sync + 'static,
    {
        let fun = access_fn(move |value: &T| Ok(Pulled::dynamic(f(value))));
        self.insert(name, AccessEntry::new::<T>(None, fun));
        self
    }

    /// Registers an accessor for an ordered sequence of `V`.
    pub fn sequence<V, F>(mut self, name: &str, f: F) -> Self
    where
        V: Any,
        F: for<'a> Fn(&'a T) -> &'a [V] + Send + Sync + 'static,
    {
        let fun = access_fn(move |value: &T| Ok(Pulled::many(f(value))));
        self.insert(name, AccessEntry::new::<T>(None, fun));
        self
    }

    /// Declares `S` as a supertype of `T`.
    ///
    /// Accessors not found on `T` are looked up on its supertypes in declaration
    /// order, and `T` becomes assignable to every upper bound `S` is assignable to.
    pub fn implements<S: ?Sized + 'static>(mut self, upcast: fn(&T) -> &S) -> Self {
        let target = TypeId::of::<S>();
        if target == self.meta.type_id || self.meta.supers.iter().any(|s| s.target == target) {
            log::warn!(
                "class `{}` already declares `{}` as a supertype",
                self.meta.name,
                core::any::type_name::<S>(),
            );
            return self;
        }
        self.meta.supers.push(SuperLink {
            target,
            lift: lift_fn::<T, S>(upcast),
        });
        self
    }

    /// The metadata registered so far.
    #[inline]
    pub fn meta(&self) -> &ClassMeta {
        &*self.meta
    }
}

impl ClassRegistry {
    /// Registers the concrete class `T` under `name`.
    ///
    /// Registering the same type again returns a builder over the existing entry.
    pub fn class<T: Any>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        let meta = self.entry::<T>(name, Some(crate::accessor::finish::<T>));
        ClassBuilder::new(meta)
    }

    /// Registers the abstract upper bound `T`, usually a `dyn Trait`, under `name`.
    pub fn interface<T: ?Sized + 'static>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        let meta = self.entry::<T>(name, None);
        ClassBuilder::new(meta)
    }
}
