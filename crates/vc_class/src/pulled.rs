use alloc::vec::Vec;
use core::any::Any;

// -----------------------------------------------------------------------------
// Pulled

/// A value pulled out of a parent object by an [`Accessor`](crate::Accessor).
///
/// References keep the concrete runtime type of the target, so a trait object
/// must be upcast from the inner `dyn Trait` rather than from its `Box`:
///
/// ```
/// use core::any::Any;
/// use vc_class::Pulled;
///
/// trait Shape: Any {}
/// struct Square;
/// impl Shape for Square {}
///
/// let shape: Box<dyn Shape> = Box::new(Square);
/// let pulled = Pulled::dynamic(Some(&*shape as &dyn Any));
///
/// let Pulled::One(value) = pulled else { unreachable!() };
/// assert!(value.is::<Square>());
/// ```
pub enum Pulled<'a> {
    /// The accessor produced nothing, the null value.
    Absent,
    /// A single value.
    One(&'a dyn Any),
    /// An ordered sequence of values.
    Many(Vec<&'a dyn Any>),
}

impl<'a> Pulled<'a> {
    /// A single typed value.
    #[inline]
    pub fn one<V: Any>(value: &'a V) -> Self {
        Self::One(value)
    }

    /// A single typed value, or [`Pulled::Absent`].
    #[inline]
    pub fn maybe<V: Any>(value: Option<&'a V>) -> Self {
        match value {
            Some(value) => Self::One(value),
            None => Self::Absent,
        }
    }

    /// A single value whose concrete type is only known at runtime.
    #[inline]
    pub fn dynamic(value: Option<&'a dyn Any>) -> Self {
        match value {
            Some(value) => Self::One(value),
            None => Self::Absent,
        }
    }

    /// A sequence of typed values, in iteration order.
    pub fn many<V: Any>(values: impl IntoIterator<Item = &'a V>) -> Self {
        Self::Many(values.into_iter().map(|v| v as &dyn Any).collect())
    }

    /// A sequence of values whose concrete types are only known at runtime.
    pub fn dynamic_many(values: impl IntoIterator<Item = &'a dyn Any>) -> Self {
        Self::Many(values.into_iter().collect())
    }

    /// Returns `true` for [`Pulled::Absent`].
    #[inline]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// A short name of the shape, used in diagnostics.
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::One(_) => "single value",
            Self::Many(_) => "sequence",
        }
    }
}

impl core::fmt::Debug for Pulled<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::One(_) => f.write_str("One(..)"),
            Self::Many(values) => write!(f, "Many(len = {})", values.len()),
        }
    }
}
