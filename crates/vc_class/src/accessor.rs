use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::{Any, TypeId};
use core::fmt::Debug;

use crate::{AccessError, Pulled};

// -----------------------------------------------------------------------------
// Typed accessors

/// An accessor function on a (possibly unsized) type `T`.
pub(crate) type AccessFn<T> =
    dyn for<'a> Fn(&'a T) -> Result<Pulled<'a>, AccessError> + Send + Sync;

/// An accessor function on an erased object.
pub(crate) type DynAccessFn =
    dyn for<'a> Fn(&'a dyn Any) -> Result<Pulled<'a>, AccessError> + Send + Sync;

/// Forces the higher-ranked signature onto a closure before boxing it.
#[inline(always)]
pub(crate) fn access_fn<T, F>(f: F) -> Arc<AccessFn<T>>
where
    T: ?Sized + 'static,
    F: for<'a> Fn(&'a T) -> Result<Pulled<'a>, AccessError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[inline(always)]
fn dyn_access_fn<F>(f: F) -> Arc<DynAccessFn>
where
    F: for<'a> Fn(&'a dyn Any) -> Result<Pulled<'a>, AccessError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A registered accessor, typed on its owner but stored erased.
pub(crate) struct TypedAccess<T: ?Sized + 'static> {
    pub fun: Arc<AccessFn<T>>,
}

/// Registration entry of one accessor.
///
/// `typed` always holds a [`TypedAccess<T>`] where `T` is the owning class.
#[derive(Clone)]
pub(crate) struct AccessEntry {
    pub output: Option<TypeId>,
    pub typed: Arc<dyn Any + Send + Sync>,
}

impl AccessEntry {
    pub fn new<T: ?Sized + 'static>(output: Option<TypeId>, fun: Arc<AccessFn<T>>) -> Self {
        Self {
            output,
            typed: Arc::new(TypedAccess { fun }),
        }
    }
}

/// Turns an entry typed on `T` into an entry typed on `U`, through `upcast`.
pub(crate) type LiftFn = Box<dyn Fn(&AccessEntry) -> Option<AccessEntry> + Send + Sync>;

pub(crate) fn lift_fn<T, S>(upcast: fn(&T) -> &S) -> LiftFn
where
    T: ?Sized + 'static,
    S: ?Sized + 'static,
{
    Box::new(move |entry: &AccessEntry| {
        let sup = entry.typed.downcast_ref::<TypedAccess<S>>()?;
        let f = sup.fun.clone();
        Some(AccessEntry::new::<T>(
            entry.output,
            access_fn(move |value: &T| f(upcast(value))),
        ))
    })
}

/// Erases an entry typed on the sized class `T`.
pub(crate) type FinishFn = fn(&AccessEntry) -> Option<Arc<DynAccessFn>>;

pub(crate) fn finish<T: Any>(entry: &AccessEntry) -> Option<Arc<DynAccessFn>> {
    let typed = entry.typed.downcast_ref::<TypedAccess<T>>()?;
    let f = typed.fun.clone();
    Some(dyn_access_fn(move |value: &dyn Any| {
        match value.downcast_ref::<T>() {
            Some(value) => f(value),
            None => Err(AccessError::TypeMismatch {
                expected: core::any::type_name::<T>(),
            }),
        }
    }))
}

// -----------------------------------------------------------------------------
// Accessor

/// An accessor resolved for one concrete runtime type.
///
/// Obtained from [`ClassRegistry::accessor`](crate::ClassRegistry::accessor).
/// Cloning is cheap, the function is shared.
#[derive(Clone)]
pub struct Accessor {
    name: Arc<str>,
    owner: Arc<str>,
    output: Option<TypeId>,
    fun: Arc<DynAccessFn>,
}

impl Accessor {
    pub(crate) fn new(
        name: Arc<str>,
        owner: Arc<str>,
        output: Option<TypeId>,
        fun: Arc<DynAccessFn>,
    ) -> Self {
        Self {
            name,
            owner,
            output,
            fun,
        }
    }

    /// The accessor name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the class the accessor was resolved for.
    #[inline]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The [`TypeId`] of a single pulled value, when it was declared at registration.
    #[inline]
    pub fn output(&self) -> Option<TypeId> {
        self.output
    }

    /// Invokes the accessor on `object`.
    ///
    /// `object` must be an instance of the class this accessor was resolved for,
    /// otherwise [`AccessError::TypeMismatch`] is returned.
    #[inline]
    pub fn pull<'a>(&self, object: &'a dyn Any) -> Result<Pulled<'a>, AccessError> {
        (self.fun)(object)
    }
}

impl Debug for Accessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Accessor")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("output", &self.output)
            .finish()
    }
}
