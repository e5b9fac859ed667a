use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::any::{Any, TypeId};

use serde::{Deserialize, Serialize};
use vc_class::{ClassRegistry, TranslatorRegistry};

use crate::compile::Compiler;
use crate::step::Emitter;
use crate::{
    ConcreteContext, ConfigError, ContextId, EmitError, MappingSpec, MarkupWriter, ReferenceTable,
    Sink, TypeContext,
};

// -----------------------------------------------------------------------------
// EngineOptions

/// Tunables of an [`Engine`], loadable through `serde`.
///
/// Missing fields keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Text written verbatim before the root element, e.g. an XML declaration.
    pub declaration: Option<String>,
    /// Maximum number of nested dispatches, cycles in the object graph hit it.
    pub max_depth: usize,
    /// Build the concrete contexts of all concrete bounds while compiling.
    pub prewarm: bool,
}

impl EngineOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 256;
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            declaration: None,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            prewarm: true,
        }
    }
}

// -----------------------------------------------------------------------------
// EngineBuilder

/// Configures and compiles an [`Engine`].
#[derive(Debug)]
pub struct EngineBuilder {
    registry: Arc<ClassRegistry>,
    translators: TranslatorRegistry,
    options: EngineOptions,
}

impl EngineBuilder {
    /// Replaces the default translators.
    pub fn translators(mut self, translators: TranslatorRegistry) -> Self {
        self.translators = translators;
        self
    }

    /// Adds or replaces the translator of `V`.
    pub fn translator<V: Any>(mut self, f: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
        self.translators.register(f);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Shorthand for setting [`EngineOptions::declaration`].
    pub fn declaration(mut self, declaration: &str) -> Self {
        self.options.declaration = Some(declaration.into());
        self
    }

    /// Validates `spec` and compiles it.
    ///
    /// All structural mistakes are reported here, never during emission.
    pub fn compile(self, spec: &MappingSpec) -> Result<Engine, ConfigError> {
        let compiled = Compiler::new(&self.registry, &self.translators).compile(spec)?;

        let engine = Engine {
            registry: self.registry,
            translators: Arc::new(self.translators),
            contexts: compiled.contexts.into_boxed_slice(),
            references: compiled.references,
            root: compiled.root,
            options: self.options,
        };

        if engine.options.prewarm {
            let mut built = 0;
            for context in engine.contexts.iter() {
                built += context
                    .prewarm(&engine.registry, &engine.translators)
                    .map_err(|source| ConfigError::Prewarm {
                        context: String::from(context.label()),
                        source,
                    })?;
            }
            log::debug!("prewarmed {built} concrete contexts");
        }

        Ok(engine)
    }
}

// -----------------------------------------------------------------------------
// Engine

/// A compiled mapping, ready to emit object graphs.
///
/// The engine is immutable apart from its concrete-context caches, so a single
/// instance can be shared between threads and used for any number of
/// concurrent emissions.
///
/// # Examples
///
/// ```
/// use vc_class::ClassRegistry;
/// use vc_markup::{Engine, MappingNode, MappingSpec};
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let mut registry = ClassRegistry::new();
/// registry
///     .class::<Point>("Point")
///     .field("x", |p| Some(&p.x))
///     .field("y", |p| Some(&p.y));
///
/// let spec = MappingSpec::new(
///     MappingNode::root("point", "Point")
///         .with_child(MappingNode::attribute("x", "x"))
///         .with_child(MappingNode::value("y", "y")),
/// );
///
/// let engine = Engine::builder(registry)
///     .declaration(r#"<?xml version="1.0"?>"#)
///     .compile(&spec)
///     .unwrap();
///
/// assert_eq!(
///     engine.emit_to_string(&Point { x: 1, y: -2 }).unwrap(),
///     r#"<?xml version="1.0"?><point x="1"><y>-2</y></point>"#,
/// );
/// ```
pub struct Engine {
    registry: Arc<ClassRegistry>,
    translators: Arc<TranslatorRegistry>,
    contexts: Box<[TypeContext]>,
    references: ReferenceTable,
    root: ContextId,
    options: EngineOptions,
}

/// Compiles `spec` against `registry` with the default translators and options.
pub fn compile(spec: &MappingSpec, registry: ClassRegistry) -> Result<Engine, ConfigError> {
    Engine::builder(registry).compile(spec)
}

impl Engine {
    /// Starts configuring an engine over `registry`.
    pub fn builder(registry: impl Into<Arc<ClassRegistry>>) -> EngineBuilder {
        EngineBuilder {
            registry: registry.into(),
            translators: TranslatorRegistry::new(),
            options: EngineOptions::default(),
        }
    }

    /// Writes the markup of the object graph under `root` into `sink`.
    ///
    /// On error, whatever was written before the failure stays in the sink.
    pub fn emit(&self, root: &dyn Any, sink: &mut dyn Sink) -> Result<(), EmitError> {
        let mut emitter = Emitter::new(self, MarkupWriter::new(sink));
        if let Some(declaration) = &self.options.declaration {
            emitter.writer().raw(declaration)?;
        }
        emitter.dispatch(self.root, root)
    }

    /// Emits into a new string.
    pub fn emit_to_string(&self, root: &dyn Any) -> Result<String, EmitError> {
        let mut out = String::new();
        self.emit(root, &mut out)?;
        Ok(out)
    }

    /// Returns the concrete context `object` maps to in the context `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this engine.
    pub fn resolve(
        &self,
        id: ContextId,
        object: &dyn Any,
    ) -> Result<Arc<ConcreteContext>, EmitError> {
        self.context(id)
            .resolve(object, &self.registry, &self.translators)
    }

    /// The context of the root node.
    #[inline]
    pub fn root(&self) -> ContextId {
        self.root
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this engine.
    #[inline]
    pub fn context(&self, id: ContextId) -> &TypeContext {
        &self.contexts[id.index()]
    }

    /// All contexts, in compilation order.
    #[inline]
    pub fn contexts(&self) -> impl ExactSizeIterator<Item = &TypeContext> {
        self.contexts.iter()
    }

    /// Total number of concrete contexts built so far.
    pub fn cached_contexts(&self) -> usize {
        self.contexts.iter().map(TypeContext::cached_len).sum()
    }

    /// Returns `true` if `type_id` has a concrete context in the context `id`.
    pub fn is_cached(&self, id: ContextId, type_id: TypeId) -> bool {
        self.context(id).resolve_cached(type_id).is_some()
    }

    #[inline]
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    #[inline]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    #[inline]
    pub fn translators(&self) -> &TranslatorRegistry {
        &self.translators
    }

    #[inline]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("contexts", &self.contexts.len())
            .field("references", &self.references.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::format;
    use alloc::string::{String, ToString};
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use core::any::{Any, TypeId};
    use std::io;

    use vc_class::{AccessError, ClassRegistry, Pulled};

    use super::{Engine, EngineOptions};
    use crate::{ConfigError, EmitError, IoSink, MappingNode, MappingSpec, NodeKind};

    // -------------------------------------------------------------------------
    // Fixtures

    struct Node {
        id: u32,
        name: String,
        children: Vec<Node>,
    }

    fn leaf(id: u32, name: &str) -> Node {
        Node {
            id,
            name: name.into(),
            children: Vec::new(),
        }
    }

    fn branch(id: u32, name: &str, children: Vec<Node>) -> Node {
        Node {
            id,
            name: name.into(),
            children,
        }
    }

    fn node_registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry
            .class::<Node>("Node")
            .field("id", |n| Some(&n.id))
            .field("name", |n| Some(&n.name))
            .sequence("children", |n| &n.children);
        registry
    }

    fn node_spec(attributes: &[&str]) -> MappingSpec {
        let group = MappingNode::attribute_group()
            .with_children(attributes.iter().map(|a| MappingNode::attribute(a, *a)));
        MappingSpec::new(
            MappingNode::root("Node", "Node")
                .with_id("node")
                .with_child(group)
                .with_child(
                    MappingNode::collection("children").with_child(
                        MappingNode::item("Node").with_child(MappingNode::reference("node")),
                    ),
                ),
        )
    }

    trait Shape: Any {
        fn label(&self) -> &String;
    }

    struct Square {
        label: String,
        side: u32,
    }

    struct Circle {
        label: String,
        radius: u32,
    }

    impl Shape for Square {
        fn label(&self) -> &String {
            &self.label
        }
    }

    impl Shape for Circle {
        fn label(&self) -> &String {
            &self.label
        }
    }

    struct Drawing {
        title: Option<String>,
        shapes: Vec<Box<dyn Shape>>,
        focus: Option<Box<dyn Shape>>,
    }

    fn drawing() -> Drawing {
        Drawing {
            title: Some("plan".into()),
            shapes: Vec::from([
                Box::new(Square {
                    label: "s".into(),
                    side: 2,
                }) as Box<dyn Shape>,
                Box::new(Circle {
                    label: "c".into(),
                    radius: 3,
                }),
            ]),
            focus: None,
        }
    }

    fn shape_registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry
            .interface::<dyn Shape>("Shape")
            .field("label", |s| Some(s.label()));
        registry
            .class::<Square>("Square")
            .field("side", |s| Some(&s.side))
            .implements::<dyn Shape>(|s| s);
        registry
            .class::<Circle>("Circle")
            .field("radius", |c| Some(&c.radius))
            .implements::<dyn Shape>(|c| c);
        registry
            .class::<Drawing>("Drawing")
            .field("title", |d| d.title.as_ref())
            .accessor("shapes", |d| {
                Ok(Pulled::dynamic_many(
                    d.shapes.iter().map(|s| &**s as &dyn Any),
                ))
            })
            .object("focus", |d| d.focus.as_deref().map(|s| s as &dyn Any));
        registry
    }

    fn shape_items(first: MappingNode, second: MappingNode) -> MappingSpec {
        MappingSpec::new(
            MappingNode::root("drawing", "Drawing").with_child(
                MappingNode::collection("shapes")
                    .with_name("shapes")
                    .with_child(first)
                    .with_child(second),
            ),
        )
    }

    fn square_item() -> MappingNode {
        MappingNode::item("Square")
            .with_name("square")
            .with_child(MappingNode::attribute("side", "side"))
    }

    fn shape_item() -> MappingNode {
        MappingNode::item("Shape")
            .with_name("shape")
            .with_child(MappingNode::attribute("label", "label"))
    }

    // -------------------------------------------------------------------------
    // Emission

    #[test]
    fn self_referencing_tree() {
        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["name"]))
            .unwrap();

        let tree = branch(0, "A", Vec::from([leaf(1, "B"), leaf(2, "C")]));
        assert_eq!(
            engine.emit_to_string(&tree).unwrap(),
            r#"<Node name="A"><Node name="B"/><Node name="C"/></Node>"#,
        );
    }

    #[test]
    fn reference_recurses_through_every_level() {
        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["id", "name"]))
            .unwrap();

        let tree = branch(
            1,
            "root",
            Vec::from([branch(2, "mid", Vec::from([leaf(3, "leaf")])), leaf(4, "side")]),
        );
        assert_eq!(
            engine.emit_to_string(&tree).unwrap(),
            concat!(
                r#"<Node id="1" name="root">"#,
                r#"<Node id="2" name="mid"><Node id="3" name="leaf"/></Node>"#,
                r#"<Node id="4" name="side"/>"#,
                r#"</Node>"#,
            ),
        );
    }

    #[test]
    fn emission_is_deterministic() {
        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["id", "name"]))
            .unwrap();
        let tree = branch(0, "A", Vec::from([leaf(1, "B")]));

        let first = engine.emit_to_string(&tree).unwrap();
        let second = engine.emit_to_string(&tree).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn absent_empty_and_present_values() {
        struct Person {
            name: Option<String>,
            nick: Option<String>,
        }

        let mut registry = ClassRegistry::new();
        registry
            .class::<Person>("Person")
            .field("name", |p| p.name.as_ref())
            .field("nick", |p| p.nick.as_ref());
        let spec = MappingSpec::new(
            MappingNode::root("person", "Person")
                .with_child(MappingNode::attribute("nick", "nick"))
                .with_child(MappingNode::value("name", "name")),
        );
        let engine = Engine::builder(registry).compile(&spec).unwrap();

        let absent = Person {
            name: None,
            nick: None,
        };
        assert_eq!(
            engine.emit_to_string(&absent).unwrap(),
            "<person><name/></person>",
        );

        let empty = Person {
            name: Some(String::new()),
            nick: Some(String::new()),
        };
        assert_eq!(
            engine.emit_to_string(&empty).unwrap(),
            r#"<person nick=""><name></name></person>"#,
        );

        let present = Person {
            name: Some("Ada <3".into()),
            nick: Some("\"a\"".into()),
        };
        assert_eq!(
            engine.emit_to_string(&present).unwrap(),
            r#"<person nick="&quot;a&quot;"><name>Ada &lt;3</name></person>"#,
        );
    }

    #[test]
    fn raw_values_are_not_escaped() {
        struct Snippet {
            body: String,
        }

        let mut registry = ClassRegistry::new();
        registry
            .class::<Snippet>("Snippet")
            .field("body", |s| Some(&s.body));
        let spec = MappingSpec::new(
            MappingNode::root("snippet", "Snippet")
                .with_child(MappingNode::value("escaped", "body"))
                .with_child(MappingNode::value("verbatim", "body").raw()),
        );
        let engine = Engine::builder(registry).compile(&spec).unwrap();

        let snippet = Snippet {
            body: "<b>&</b>".into(),
        };
        assert_eq!(
            engine.emit_to_string(&snippet).unwrap(),
            concat!(
                "<snippet><escaped>&lt;b&gt;&amp;&lt;/b&gt;</escaped>",
                "<verbatim><b>&</b></verbatim></snippet>",
            ),
        );
    }

    #[test]
    fn collections_keep_order_and_wrappers() {
        let engine = Engine::builder(shape_registry())
            .compile(&shape_items(square_item(), shape_item()))
            .unwrap();

        assert_eq!(
            engine.emit_to_string(&drawing()).unwrap(),
            r#"<drawing><shapes><square side="2"/><shape label="c"/></shapes></drawing>"#,
        );

        let empty = Drawing {
            title: None,
            shapes: Vec::new(),
            focus: None,
        };
        assert_eq!(
            engine.emit_to_string(&empty).unwrap(),
            "<drawing><shapes/></drawing>",
        );
    }

    #[test]
    fn first_matching_item_wins() {
        let engine = Engine::builder(shape_registry())
            .compile(&shape_items(shape_item(), square_item()))
            .unwrap();

        assert_eq!(
            engine.emit_to_string(&drawing()).unwrap(),
            r#"<drawing><shapes><shape label="s"/><shape label="c"/></shapes></drawing>"#,
        );
    }

    fn focus_spec(first: MappingNode, second: MappingNode) -> MappingSpec {
        MappingSpec::new(
            MappingNode::root("drawing", "Drawing").with_child(
                MappingNode::polymorphic("focus")
                    .with_name("focus")
                    .with_child(first)
                    .with_child(second),
            ),
        )
    }

    #[test]
    fn polymorphic_slot_is_order_sensitive() {
        let mut focused = drawing();
        focused.focus = Some(Box::new(Square {
            label: "s".into(),
            side: 2,
        }));

        let general_first = Engine::builder(shape_registry())
            .compile(&focus_spec(shape_item(), square_item()))
            .unwrap();
        assert_eq!(
            general_first.emit_to_string(&focused).unwrap(),
            r#"<drawing><focus><shape label="s"/></focus></drawing>"#,
        );

        let specific_first = Engine::builder(shape_registry())
            .compile(&focus_spec(square_item(), shape_item()))
            .unwrap();
        assert_eq!(
            specific_first.emit_to_string(&focused).unwrap(),
            r#"<drawing><focus><square side="2"/></focus></drawing>"#,
        );
    }

    #[test]
    fn polymorphic_slot_dispatches_on_runtime_type() {
        let spec = MappingSpec::new(
            MappingNode::root("drawing", "Drawing")
                .with_child(MappingNode::value("title", "title"))
                .with_child(
                    MappingNode::polymorphic("focus")
                        .with_name("focus")
                        .with_child(square_item())
                        .with_child(
                            MappingNode::item("Circle")
                                .with_name("circle")
                                .with_child(MappingNode::value("r", "radius")),
                        ),
                ),
        );
        let engine = Engine::builder(shape_registry()).compile(&spec).unwrap();

        let mut drawing = drawing();
        assert_eq!(
            engine.emit_to_string(&drawing).unwrap(),
            "<drawing><title>plan</title></drawing>",
        );

        drawing.focus = Some(Box::new(Circle {
            label: "c".into(),
            radius: 7,
        }));
        assert_eq!(
            engine.emit_to_string(&drawing).unwrap(),
            "<drawing><title>plan</title><focus><circle><r>7</r></circle></focus></drawing>",
        );
    }

    #[test]
    fn nested_object_and_static_text() {
        struct Address {
            city: String,
        }
        struct Person {
            address: Option<Address>,
        }

        let mut registry = ClassRegistry::new();
        registry
            .class::<Address>("Address")
            .field("city", |a| Some(&a.city));
        registry
            .class::<Person>("Person")
            .object("address", |p| p.address.as_ref().map(|a| a as &dyn Any));
        let spec = MappingSpec::new(
            MappingNode::root("person", "Person")
                .with_child(MappingNode::static_text("<!-- person -->"))
                .with_child(
                    MappingNode::object("address", "address", "Address")
                        .with_child(MappingNode::attribute("city", "city")),
                ),
        );
        let engine = Engine::builder(registry).compile(&spec).unwrap();

        let person = Person {
            address: Some(Address {
                city: "Oslo".into(),
            }),
        };
        assert_eq!(
            engine.emit_to_string(&person).unwrap(),
            r#"<person><!-- person --><address city="Oslo"/></person>"#,
        );
        assert_eq!(
            engine.emit_to_string(&Person { address: None }).unwrap(),
            "<person><!-- person --></person>",
        );
    }

    #[test]
    fn values_of_the_current_object() {
        struct Tags {
            tags: Vec<String>,
        }

        let mut registry = ClassRegistry::new();
        registry.class::<String>("String");
        registry.class::<Tags>("Tags").sequence("tags", |t| &t.tags);
        let spec = MappingSpec::new(
            MappingNode::root("tags", "Tags").with_child(
                MappingNode::collection("tags")
                    .with_child(MappingNode::item("String")
                        .with_child(MappingNode::new(NodeKind::Value).with_name("tag"))),
            ),
        );
        let engine = Engine::builder(registry).compile(&spec).unwrap();

        let tags = Tags {
            tags: Vec::from(["a".into(), "b".into()]),
        };
        assert_eq!(
            engine.emit_to_string(&tags).unwrap(),
            "<tags><tag>a</tag><tag>b</tag></tags>",
        );
    }

    #[test]
    fn custom_translator() {
        struct Celsius(f32);
        struct Reading {
            temperature: Celsius,
        }

        let mut registry = ClassRegistry::new();
        registry
            .class::<Reading>("Reading")
            .field("temperature", |r| Some(&r.temperature));
        let spec = MappingSpec::new(
            MappingNode::root("reading", "Reading")
                .with_child(MappingNode::attribute("t", "temperature")),
        );

        let err = Engine::builder(registry).compile(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTranslator { .. }));

        let mut registry = ClassRegistry::new();
        registry
            .class::<Reading>("Reading")
            .field("temperature", |r| Some(&r.temperature));
        let engine = Engine::builder(registry)
            .translator(|c: &Celsius| format!("{:.1}C", c.0))
            .compile(&spec)
            .unwrap();
        let reading = Reading {
            temperature: Celsius(21.5),
        };
        assert_eq!(
            engine.emit_to_string(&reading).unwrap(),
            r#"<reading t="21.5C"/>"#,
        );
    }

    #[test]
    fn declaration_comes_first() {
        let engine = Engine::builder(node_registry())
            .declaration(r#"<?xml version="1.0" encoding="UTF-8"?>"#)
            .compile(&node_spec(&["name"]))
            .unwrap();
        assert_eq!(
            engine.emit_to_string(&leaf(0, "A")).unwrap(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Node name="A"/>"#,
        );
    }

    #[test]
    fn io_sink_receives_bytes() {
        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["name"]))
            .unwrap();
        let mut sink = IoSink::new(Vec::new());
        engine.emit(&leaf(0, "A"), &mut sink).unwrap();
        assert_eq!(sink.into_inner(), br#"<Node name="A"/>"#);
    }

    // -------------------------------------------------------------------------
    // Emission errors

    #[test]
    fn unmatched_object_is_reported() {
        let spec = shape_items(square_item(), square_item().with_name("again"));
        let engine = Engine::builder(shape_registry()).compile(&spec).unwrap();

        let err = engine.emit_to_string(&drawing()).unwrap_err();
        let EmitError::NoMatchingVariant { context, type_name } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(context, "drawing/shapes");
        assert_eq!(type_name, "Circle");
    }

    #[test]
    fn accessor_failure_is_wrapped() {
        struct Flaky;

        let mut registry = ClassRegistry::new();
        registry
            .class::<Flaky>("Flaky")
            .accessor("value", |_| Err(AccessError::failed("offline")));
        let spec = MappingSpec::new(
            MappingNode::root("flaky", "Flaky").with_child(MappingNode::value("value", "value")),
        );
        let engine = Engine::builder(registry).compile(&spec).unwrap();

        let mut out = String::new();
        let err = engine.emit(&Flaky, &mut out).unwrap_err();
        let EmitError::AccessorFailure {
            class,
            accessor,
            source,
        } = err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(class, "Flaky");
        assert_eq!(accessor, "value");
        assert_eq!(source.to_string(), "offline");
    }

    #[test]
    fn sink_failure_is_reported() {
        struct Closed;

        impl io::Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["name"]))
            .unwrap();
        let err = engine
            .emit(&leaf(0, "A"), &mut IoSink::new(Closed))
            .unwrap_err();
        assert!(matches!(err, EmitError::Io(_)));
    }

    #[test]
    fn deep_graphs_hit_the_depth_limit() {
        let mut chain = leaf(0, "end");
        for id in 1..100 {
            chain = branch(id, "link", Vec::from([chain]));
        }

        let options = EngineOptions {
            max_depth: 64,
            ..EngineOptions::default()
        };
        let engine = Engine::builder(node_registry())
            .options(options)
            .compile(&node_spec(&["id"]))
            .unwrap();

        let err = engine.emit_to_string(&chain).unwrap_err();
        assert!(matches!(err, EmitError::DepthExceeded { limit: 64 }));

        let shallow = branch(0, "a", Vec::from([leaf(1, "b")]));
        assert!(engine.emit_to_string(&shallow).is_ok());
    }

    #[test]
    fn wrong_root_type_is_reported() {
        let engine = Engine::builder(node_registry())
            .compile(&node_spec(&["name"]))
            .unwrap();
        let err = engine.emit_to_string(&42_u32).unwrap_err();
        assert!(matches!(err, EmitError::NoMatchingVariant { .. }));
    }

    struct Bag {
        first: u32,
        all: Vec<u32>,
    }

    fn bag_registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.class::<u32>("u32");
        registry
            .class::<Bag>("Bag")
            .accessor("first", |b| Ok(Pulled::one(&b.first)))
            .accessor("all", |b| Ok(Pulled::many(&b.all)));
        registry
    }

    fn bag_spec(child: MappingNode) -> MappingSpec {
        MappingSpec::new(MappingNode::root("bag", "Bag").with_child(child))
    }

    fn number_item() -> MappingNode {
        MappingNode::item("u32")
            .with_child(MappingNode::new(NodeKind::Value).with_name("n"))
    }

    #[test]
    fn mismatched_shapes_are_reported() {
        let bag = Bag {
            first: 1,
            all: Vec::from([1, 2]),
        };

        let collection = bag_spec(MappingNode::collection("first").with_child(number_item()));
        let engine = Engine::builder(bag_registry())
            .compile(&collection)
            .unwrap();
        let err = engine.emit_to_string(&bag).unwrap_err();
        let EmitError::UnexpectedShape {
            accessor,
            expected,
            found,
            ..
        } = err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(accessor, "first");
        assert_eq!((expected, found), ("sequence", "single value"));

        let object = bag_spec(MappingNode::object("n", "all", "u32"));
        let engine = Engine::builder(bag_registry()).compile(&object).unwrap();
        let err = engine.emit_to_string(&bag).unwrap_err();
        let EmitError::UnexpectedShape {
            accessor,
            expected,
            found,
            ..
        } = err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(accessor, "all");
        assert_eq!((expected, found), ("single value", "sequence"));

        let matching = bag_spec(MappingNode::collection("all").with_child(number_item()));
        let engine = Engine::builder(bag_registry()).compile(&matching).unwrap();
        assert_eq!(
            engine.emit_to_string(&bag).unwrap(),
            "<bag><n>1</n><n>2</n></bag>",
        );
    }

    #[test]
    fn dynamic_leaf_without_translator_fails_at_emission() {
        struct Opaque;
        struct Holder {
            opaque: Opaque,
            count: u32,
        }

        let mut registry = ClassRegistry::new();
        registry
            .class::<Holder>("Holder")
            .accessor("opaque", |h| Ok(Pulled::one(&h.opaque)))
            .accessor("count", |h| Ok(Pulled::one(&h.count)));
        let registry = Arc::new(registry);
        let holder = Holder {
            opaque: Opaque,
            count: 3,
        };

        let counted = MappingSpec::new(
            MappingNode::root("holder", "Holder")
                .with_child(MappingNode::value("count", "count")),
        );
        let engine = Engine::builder(registry.clone()).compile(&counted).unwrap();
        assert_eq!(
            engine.emit_to_string(&holder).unwrap(),
            "<holder><count>3</count></holder>",
        );

        // Compiles, the output type of `opaque` is only known once it is pulled.
        let opaque = MappingSpec::new(
            MappingNode::root("holder", "Holder")
                .with_child(MappingNode::value("o", "opaque")),
        );
        let engine = Engine::builder(registry).compile(&opaque).unwrap();
        let err = engine.emit_to_string(&holder).unwrap_err();
        assert!(matches!(err, EmitError::MissingTranslator { .. }));
    }

    // -------------------------------------------------------------------------
    // Configuration errors

    fn compile_nodes(spec: &MappingSpec) -> Result<Engine, ConfigError> {
        Engine::builder(node_registry()).compile(spec)
    }

    #[test]
    fn attribute_after_element_is_rejected() {
        let spec = MappingSpec::new(
            MappingNode::root("Node", "Node")
                .with_child(MappingNode::value("name", "name"))
                .with_child(
                    MappingNode::attribute_group().with_child(MappingNode::attribute("id", "id")),
                ),
        );
        let err = compile_nodes(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::AttributeAfterElement { .. }));
    }

    #[test]
    fn structural_mistakes_are_rejected() {
        let not_root = MappingSpec::new(MappingNode::value("name", "name"));
        assert!(matches!(
            compile_nodes(&not_root),
            Err(ConfigError::NotARoot(NodeKind::Value)),
        ));

        let loose_item = MappingSpec::new(
            MappingNode::root("Node", "Node").with_child(MappingNode::item("Node")),
        );
        assert!(matches!(
            compile_nodes(&loose_item),
            Err(ConfigError::ItemOutsideDispatch { .. }),
        ));

        let stray_child = MappingSpec::new(
            MappingNode::root("Node", "Node").with_child(
                MappingNode::collection("children").with_child(MappingNode::value("name", "name")),
            ),
        );
        assert!(matches!(
            compile_nodes(&stray_child),
            Err(ConfigError::UnexpectedChild {
                parent: NodeKind::Collection,
                child: NodeKind::Value,
            }),
        ));

        let nameless = MappingSpec::new(
            MappingNode::root("Node", "Node")
                .without_name()
                .with_child(MappingNode::attribute("name", "name")),
        );
        assert!(matches!(
            compile_nodes(&nameless),
            Err(ConfigError::AttributeWithoutElement { .. }),
        ));

        let unbounded = MappingSpec::new(MappingNode::new(NodeKind::Root));
        assert!(matches!(
            compile_nodes(&unbounded),
            Err(ConfigError::MissingField {
                kind: NodeKind::Root,
                field: "bound",
            }),
        ));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let unknown_type = MappingSpec::new(MappingNode::root("Tree", "Tree"));
        assert!(matches!(
            compile_nodes(&unknown_type),
            Err(ConfigError::UnknownType(name)) if name == "Tree",
        ));

        let unknown_accessor = MappingSpec::new(
            MappingNode::root("Node", "Node").with_child(MappingNode::value("size", "size")),
        );
        assert!(matches!(
            compile_nodes(&unknown_accessor),
            Err(ConfigError::UnknownAccessor { class, accessor })
                if class == "Node" && accessor == "size",
        ));
    }

    #[test]
    fn reference_mistakes_are_rejected() {
        let unresolved = MappingSpec::new(
            MappingNode::root("Node", "Node").with_child(
                MappingNode::collection("children").with_child(
                    MappingNode::item("Node").with_child(MappingNode::reference("missing")),
                ),
            ),
        );
        assert!(matches!(
            compile_nodes(&unresolved),
            Err(ConfigError::UnresolvedReference(id)) if id == "missing",
        ));

        let duplicate = MappingSpec::new(
            MappingNode::root("Node", "Node")
                .with_id("node")
                .with_child(MappingNode::value("name", "name").with_id("node")),
        );
        assert!(matches!(
            compile_nodes(&duplicate),
            Err(ConfigError::DuplicateReference(id)) if id == "node",
        ));

        let to_attribute = MappingSpec::new(
            MappingNode::root("Node", "Node")
                .with_child(MappingNode::attribute("name", "name").with_id("name"))
                .with_child(MappingNode::reference("name")),
        );
        assert!(matches!(
            compile_nodes(&to_attribute),
            Err(ConfigError::ReferenceToAttribute(id)) if id == "name",
        ));
    }

    #[test]
    fn forward_references_resolve() {
        // The reference appears before the node it names.
        let spec = MappingSpec::new(
            MappingNode::root("Node", "Node")
                .with_child(MappingNode::reference("label"))
                .with_child(MappingNode::value("name", "name").with_id("label")),
        );
        let engine = compile_nodes(&spec).unwrap();
        assert_eq!(
            engine.emit_to_string(&leaf(0, "A")).unwrap(),
            "<Node><name>A</name><name>A</name></Node>",
        );
    }

    // -------------------------------------------------------------------------
    // Caching

    #[test]
    fn prewarm_builds_concrete_bounds() {
        let engine = compile_nodes(&node_spec(&["name"])).unwrap();
        assert_eq!(engine.cached_contexts(), 2);
        assert!(engine.is_cached(engine.root(), TypeId::of::<Node>()));

        let resolved = engine.resolve(engine.root(), &leaf(0, "A")).unwrap();
        assert_eq!(resolved.type_name(), "Node");
        assert_eq!(resolved.candidate(), 0);
        assert_eq!(engine.cached_contexts(), 2);
    }

    #[test]
    fn failed_prewarm_fails_compilation() {
        // `Square` is first matched by the `Shape` item, whose value is the
        // current object, and squares have no translator.
        let spec = focus_spec(
            MappingNode::item("Shape").with_child(MappingNode::value("shape", None)),
            square_item(),
        );

        let err = Engine::builder(shape_registry()).compile(&spec).unwrap_err();
        let ConfigError::Prewarm { context, source } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(context, "drawing/focus");
        assert!(matches!(
            source,
            EmitError::MissingTranslator { type_name } if type_name == "Square",
        ));

        let lazy = EngineOptions {
            prewarm: false,
            ..EngineOptions::default()
        };
        let engine = Engine::builder(shape_registry())
            .options(lazy)
            .compile(&spec)
            .unwrap();
        let mut focused = drawing();
        focused.focus = Some(Box::new(Square {
            label: "s".into(),
            side: 2,
        }));
        let err = engine.emit_to_string(&focused).unwrap_err();
        assert!(matches!(err, EmitError::MissingTranslator { .. }));
    }

    #[test]
    fn lazy_contexts_are_built_once() {
        let options = EngineOptions {
            prewarm: false,
            ..EngineOptions::default()
        };
        let engine = Engine::builder(node_registry())
            .options(options)
            .compile(&node_spec(&["name"]))
            .unwrap();
        assert_eq!(engine.cached_contexts(), 0);

        engine.emit_to_string(&leaf(0, "A")).unwrap();
        assert_eq!(engine.cached_contexts(), 1);

        let tree = branch(0, "A", Vec::from([leaf(1, "B"), leaf(2, "C")]));
        engine.emit_to_string(&tree).unwrap();
        engine.emit_to_string(&tree).unwrap();
        assert_eq!(engine.cached_contexts(), 2);
    }

    #[test]
    fn interface_bounds_are_built_on_demand() {
        let engine = Engine::builder(shape_registry())
            .compile(&shape_items(square_item(), shape_item()))
            .unwrap();
        // The root and the `Square` item, not the `Shape` interface.
        assert_eq!(engine.cached_contexts(), 2);

        engine.emit_to_string(&drawing()).unwrap();
        assert_eq!(engine.cached_contexts(), 3);
    }

    #[test]
    fn concurrent_emissions_agree() {
        let options = EngineOptions {
            prewarm: false,
            ..EngineOptions::default()
        };
        let engine = Engine::builder(node_registry())
            .options(options)
            .compile(&node_spec(&["id", "name"]))
            .unwrap();
        let tree = branch(
            0,
            "A",
            Vec::from([branch(1, "B", Vec::from([leaf(2, "C")])), leaf(3, "D")]),
        );
        let expected = engine.emit_to_string(&tree).unwrap();

        let fresh = Engine::builder(node_registry())
            .options(EngineOptions {
                prewarm: false,
                ..EngineOptions::default()
            })
            .compile(&node_spec(&["id", "name"]))
            .unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| fresh.emit_to_string(&tree).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
        assert_eq!(fresh.cached_contexts(), 2);
    }

    #[test]
    fn engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    // -------------------------------------------------------------------------
    // Configuration files

    #[test]
    fn spec_and_options_from_files() {
        let spec: MappingSpec = serde_json::from_str(
            r#"{
                "root": {
                    "kind": "root", "name": "Node", "bound": "Node", "id": "node",
                    "children": [
                        { "kind": "attribute", "name": "name", "accessor": "name" },
                        { "kind": "collection", "accessor": "children", "children": [
                            { "kind": "item", "bound": "Node", "children": [
                                { "kind": "reference", "id": "node" }
                            ] }
                        ] }
                    ]
                }
            }"#,
        )
        .unwrap();
        let options: EngineOptions = ron::from_str("(max_depth: 8, prewarm: false)").unwrap();
        assert_eq!(options.declaration, None);

        let engine = Engine::builder(node_registry())
            .options(options)
            .compile(&spec)
            .unwrap();
        assert_eq!(engine.options().max_depth, 8);

        let tree = branch(0, "A", Vec::from([leaf(1, "B")]));
        assert_eq!(
            engine.emit_to_string(&tree).unwrap(),
            r#"<Node name="A"><Node name="B"/></Node>"#,
        );
    }
}
