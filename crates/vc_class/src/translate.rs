use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::any::{Any, TypeId};
use core::fmt::{Debug, Display};

use crate::TypeIdMap;

type TranslateFn = dyn Fn(&dyn Any) -> Option<String> + Send + Sync;

// -----------------------------------------------------------------------------
// Translator

/// Turns a leaf value of one fixed type into text.
#[derive(Clone)]
pub struct Translator {
    type_path: &'static str,
    fun: Arc<TranslateFn>,
}

impl Translator {
    /// Creates a translator for values of type `V`.
    pub fn of<V: Any>(f: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
        Self {
            type_path: core::any::type_name::<V>(),
            fun: Arc::new(move |value: &dyn Any| value.downcast_ref::<V>().map(&f)),
        }
    }

    /// The path of the type this translator accepts.
    #[inline]
    pub fn type_path(&self) -> &'static str {
        self.type_path
    }

    /// Translates `value`, or returns `None` if it is not of the accepted type.
    #[inline]
    pub fn translate(&self, value: &dyn Any) -> Option<String> {
        (self.fun)(value)
    }
}

impl Debug for Translator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Translator").field(&self.type_path).finish()
    }
}

// -----------------------------------------------------------------------------
// TranslatorRegistry

/// Leaf-value translators keyed by the [`TypeId`] of the value.
///
/// # Examples
///
/// ```
/// use core::any::TypeId;
/// use vc_class::TranslatorRegistry;
///
/// struct Celsius(f32);
///
/// let mut translators = TranslatorRegistry::new();
/// translators.register::<Celsius>(|c| format!("{:.1}C", c.0));
///
/// let t = translators.get(TypeId::of::<Celsius>()).unwrap();
/// assert_eq!(t.translate(&Celsius(21.5)).unwrap(), "21.5C");
///
/// let t = translators.get(TypeId::of::<bool>()).unwrap();
/// assert_eq!(t.translate(&true).unwrap(), "true");
/// ```
#[derive(Clone, Debug)]
pub struct TranslatorRegistry {
    table: TypeIdMap<Translator>,
}

impl Default for TranslatorRegistry {
    /// See [`TranslatorRegistry::new`] .
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl TranslatorRegistry {
    /// Creates a registry without any translator.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            table: TypeIdMap::new(),
        }
    }

    /// Creates a registry with translators for the primitive types.
    ///
    /// - `bool` `char`
    /// - `i8 - i128` `isize`
    /// - `u8 - u128` `usize`
    /// - `f32` `f64`
    /// - `String` `&'static str` `Box<str>` `Arc<str>` `Cow<'static, str>`
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_display::<bool>();
        registry.register_display::<char>();
        registry.register_display::<u8>();
        registry.register_display::<u16>();
        registry.register_display::<u32>();
        registry.register_display::<u64>();
        registry.register_display::<u128>();
        registry.register_display::<usize>();
        registry.register_display::<i8>();
        registry.register_display::<i16>();
        registry.register_display::<i32>();
        registry.register_display::<i64>();
        registry.register_display::<i128>();
        registry.register_display::<isize>();
        registry.register_display::<f32>();
        registry.register_display::<f64>();
        registry.register::<String>(|s| s.clone());
        registry.register::<&'static str>(|s| (*s).to_string());
        registry.register::<Box<str>>(|s| s.to_string());
        registry.register::<Arc<str>>(|s| s.to_string());
        registry.register::<Cow<'static, str>>(|s| s.to_string());
        registry
    }

    /// Registers or replaces the translator of `V`.
    pub fn register<V: Any>(&mut self, f: impl Fn(&V) -> String + Send + Sync + 'static) {
        self.table.insert(TypeId::of::<V>(), Translator::of::<V>(f));
    }

    /// Registers or replaces the translator of `V` with its [`Display`] output.
    #[inline]
    pub fn register_display<V: Any + Display>(&mut self) {
        self.register::<V>(V::to_string);
    }

    /// Returns the translator of the type `type_id`.
    #[inline]
    pub fn get(&self, type_id: TypeId) -> Option<&Translator> {
        self.table.get(&type_id)
    }

    /// Returns `true` if a translator is registered for `type_id`.
    #[inline]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.table.contains(&type_id)
    }

    /// Returns the number of registered translators.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use alloc::borrow::Cow;
    use alloc::string::String;
    use core::any::{Any, TypeId};

    use super::TranslatorRegistry;

    fn translate<V: Any>(registry: &TranslatorRegistry, value: V) -> String {
        registry
            .get(TypeId::of::<V>())
            .and_then(|t| t.translate(&value))
            .unwrap()
    }

    #[test]
    fn primitives_are_preregistered() {
        let registry = TranslatorRegistry::new();
        assert_eq!(translate(&registry, 42_u8), "42");
        assert_eq!(translate(&registry, -7_i64), "-7");
        assert_eq!(translate(&registry, 1.5_f64), "1.5");
        assert_eq!(translate(&registry, 'x'), "x");
        assert_eq!(translate(&registry, "borrowed"), "borrowed");
        assert_eq!(translate(&registry, Cow::<'static, str>::Borrowed("cow")), "cow");
        assert_eq!(translate(&registry, String::from("owned")), "owned");
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let registry = TranslatorRegistry::new();
        let t = registry.get(TypeId::of::<u32>()).unwrap();
        assert_eq!(t.translate(&1_u64), None);
        assert_eq!(t.type_path(), "u32");
    }

    #[test]
    fn register_replaces() {
        let mut registry = TranslatorRegistry::empty();
        registry.register::<bool>(|b| String::from(if *b { "yes" } else { "no" }));
        assert_eq!(translate(&registry, true), "yes");
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(TypeId::of::<u8>()));
    }
}
