//! End-to-end tests for the parse/render pipeline: the template language,
//! control flow, scope discipline, and the early-termination signal.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use runnel_core::error::ErrorKind;
use runnel_core::{
    filters, tags, to_display, FilterHandler, FilterRegistry, Parser, RenderFlow, Renderer, Scope,
    TagHandler, TagInput, TagRegistry, TagRenderer, TagSpec, Template, TemplateError,
    TemplateLoader,
};

fn registries() -> (TagRegistry, FilterRegistry) {
    let mut tag_registry = TagRegistry::new();
    tags::register_defaults(&mut tag_registry).unwrap();
    let mut filter_registry = FilterRegistry::new();
    filters::register_defaults(&mut filter_registry).unwrap();
    (tag_registry, filter_registry)
}

async fn render(source: &str, context: Value) -> Result<String, TemplateError> {
    let (tag_registry, filter_registry) = registries();
    let template = Parser::new(&tag_registry).parse(source)?;
    let mut scope = Scope::new(context);
    Renderer::new(&tag_registry, &filter_registry)
        .render_template(&template, &mut scope)
        .await
}

async fn render_ok(source: &str, context: Value) -> String {
    render(source, context).await.unwrap()
}

// ======================= Plain rendering =======================

#[tokio::test]
async fn literal_only_template_round_trips() {
    let source = "no tags here,\njust text { with } stray braces";
    assert_eq!(render_ok(source, json!({})).await, source);
    assert_eq!(render_ok(source, json!({"x": 1})).await, source);
}

#[tokio::test]
async fn output_interpolation() {
    assert_eq!(
        render_ok("Hello, {{ name }}!", json!({"name": "ada"})).await,
        "Hello, ada!"
    );
}

#[tokio::test]
async fn unknown_variable_renders_empty() {
    assert_eq!(render_ok("[{{ missing }}]", json!({})).await, "[]");
    assert_eq!(render_ok("[{{ a.b.c }}]", json!({"a": 1})).await, "[]");
}

#[tokio::test]
async fn parse_twice_renders_identically() {
    let (tag_registry, filter_registry) = registries();
    let parser = Parser::new(&tag_registry);
    let source = "{% for x in xs %}{{ x }}-{% endfor %}";
    let a = parser.parse(source).unwrap();
    let b = parser.parse(source).unwrap();
    let renderer = Renderer::new(&tag_registry, &filter_registry);

    let mut scope_a = Scope::new(json!({"xs": [1, 2]}));
    let mut scope_b = Scope::new(json!({"xs": [1, 2]}));
    assert_eq!(
        renderer.render_template(&a, &mut scope_a).await.unwrap(),
        renderer.render_template(&b, &mut scope_b).await.unwrap()
    );
}

#[tokio::test]
async fn render_never_mutates_the_template() {
    let (tag_registry, filter_registry) = registries();
    let template = Parser::new(&tag_registry)
        .parse("{% assign n = 1 %}{{ n }}{% increment c %}")
        .unwrap();
    let renderer = Renderer::new(&tag_registry, &filter_registry);
    for _ in 0..3 {
        let mut scope = Scope::new(json!({}));
        // Counter state lives in the scope's registers, so every fresh
        // render starts over.
        assert_eq!(
            renderer.render_template(&template, &mut scope).await.unwrap(),
            "10"
        );
    }
}

#[tokio::test]
async fn concurrent_renders_share_one_template() {
    let (tag_registry, filter_registry) = registries();
    let template = Arc::new(
        Parser::new(&tag_registry)
            .parse("{{ who }}: {% for x in xs %}{{ x }}{% endfor %}")
            .unwrap(),
    );
    let renderer = Renderer::new(&tag_registry, &filter_registry);
    let mut scope_a = Scope::new(json!({"who": "a", "xs": [1, 2]}));
    let mut scope_b = Scope::new(json!({"who": "b", "xs": [3, 4]}));
    let (a, b) = tokio::join!(
        renderer.render_template(&template, &mut scope_a),
        renderer.render_template(&template, &mut scope_b),
    );
    assert_eq!(a.unwrap(), "a: 12");
    assert_eq!(b.unwrap(), "b: 34");
}

// ======================= Conditionals =======================

#[tokio::test]
async fn if_elsif_else_chain() {
    let source = "{% if n > 10 %}big{% elsif n > 5 %}medium{% else %}small{% endif %}";
    assert_eq!(render_ok(source, json!({"n": 20})).await, "big");
    assert_eq!(render_ok(source, json!({"n": 7})).await, "medium");
    assert_eq!(render_ok(source, json!({"n": 1})).await, "small");
}

#[tokio::test]
async fn if_uses_template_truthiness() {
    // Zero and empty collections are truthy; only nil and false are not.
    assert_eq!(render_ok("{% if 0 %}y{% endif %}", json!({})).await, "y");
    assert_eq!(render_ok("{% if xs %}y{% endif %}", json!({"xs": []})).await, "y");
    assert_eq!(render_ok("{% if missing %}y{% else %}n{% endif %}", json!({})).await, "n");
    assert_eq!(render_ok("{% if f %}y{% else %}n{% endif %}", json!({"f": false})).await, "n");
}

#[tokio::test]
async fn unless_renders_on_falsy() {
    let source = "{% unless ok %}fallback{% else %}fine{% endunless %}";
    assert_eq!(render_ok(source, json!({})).await, "fallback");
    assert_eq!(render_ok(source, json!({"ok": true})).await, "fine");
}

#[tokio::test]
async fn case_when_matches_any_candidate() {
    let source = "{% case kind %}{% when 'a', 'b' %}ab{% when 'c' or 'd' %}cd{% else %}other{% endcase %}";
    assert_eq!(render_ok(source, json!({"kind": "b"})).await, "ab");
    assert_eq!(render_ok(source, json!({"kind": "d"})).await, "cd");
    assert_eq!(render_ok(source, json!({"kind": "z"})).await, "other");
}

#[tokio::test]
async fn assign_inside_conditional_persists() {
    let source = "{% if true %}{% assign x = 5 %}{% endif %}{{ x }}";
    assert_eq!(render_ok(source, json!({})).await, "5");
}

// ======================= Iteration =======================

#[tokio::test]
async fn for_iterates_in_document_order() {
    assert_eq!(
        render_ok("{% for x in xs %}{{ x }},{% endfor %}", json!({"xs": ["a", "b", "c"]})).await,
        "a,b,c,"
    );
}

#[tokio::test]
async fn for_exposes_forloop_metadata() {
    let source = "{% for x in xs %}{{ forloop.index }}/{{ forloop.length }}{% if forloop.last %}!{% endif %} {% endfor %}";
    assert_eq!(
        render_ok(source, json!({"xs": [10, 20, 30]})).await,
        "1/3 2/3 3/3! "
    );
}

#[tokio::test]
async fn for_loop_variable_is_frame_scoped() {
    let source = "{% for x in xs %}{{ x }}{% endfor %}[{{ x }}]";
    assert_eq!(render_ok(source, json!({"xs": [1]})).await, "1[]");
}

#[tokio::test]
async fn for_else_renders_on_empty_collection() {
    let source = "{% for x in xs %}{{ x }}{% else %}none{% endfor %}";
    assert_eq!(render_ok(source, json!({"xs": []})).await, "none");
    assert_eq!(render_ok(source, json!({})).await, "none");
    assert_eq!(render_ok(source, json!({"xs": [1]})).await, "1");
}

#[tokio::test]
async fn for_modifiers_slice_then_reverse() {
    let ctx = json!({"xs": [1, 2, 3, 4, 5]});
    assert_eq!(
        render_ok("{% for x in xs limit: 2 %}{{ x }}{% endfor %}", ctx.clone()).await,
        "12"
    );
    assert_eq!(
        render_ok("{% for x in xs offset: 3 %}{{ x }}{% endfor %}", ctx.clone()).await,
        "45"
    );
    assert_eq!(
        render_ok(
            "{% for x in xs offset: 1 limit: 3 reversed %}{{ x }}{% endfor %}",
            ctx
        )
        .await,
        "432"
    );
}

#[tokio::test]
async fn for_over_range_and_object() {
    assert_eq!(
        render_ok("{% for i in (1..4) %}{{ i }}{% endfor %}", json!({})).await,
        "1234"
    );
    assert_eq!(
        render_ok(
            "{% for pair in obj %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
            json!({"obj": {"a": 1, "b": 2}})
        )
        .await,
        "a=1;b=2;"
    );
}

#[tokio::test]
async fn nested_for_shadows_loop_variable() {
    let source = "{% for x in outer %}{% for x in inner %}{{ x }}{% endfor %}{{ x }} {% endfor %}";
    assert_eq!(
        render_ok(source, json!({"outer": ["A", "B"], "inner": ["i"]})).await,
        "iA iB "
    );
}

#[tokio::test]
async fn cycle_alternates_and_groups() {
    let source = "{% for x in xs %}{% cycle 'odd', 'even' %} {% endfor %}";
    assert_eq!(
        render_ok(source, json!({"xs": [1, 2, 3]})).await,
        "odd even odd "
    );
    // Distinct groups keep distinct counters over the same candidates.
    let grouped = "{% cycle 'g1': 'a', 'b' %}{% cycle 'g2': 'a', 'b' %}{% cycle 'g1': 'a', 'b' %}";
    assert_eq!(render_ok(grouped, json!({})).await, "aab");
}

// ======================= Assignment =======================

#[tokio::test]
async fn assign_with_filter_pipeline() {
    let source = "{% assign shout = name | upcase | append: '!' %}{{ shout }}";
    assert_eq!(render_ok(source, json!({"name": "ada"})).await, "ADA!");
}

#[tokio::test]
async fn capture_binds_rendered_body() {
    let source = "{% capture greeting %}Hi {{ name }}{% endcapture %}[{{ greeting }}]";
    assert_eq!(render_ok(source, json!({"name": "ada"})).await, "[Hi ada]");
}

#[tokio::test]
async fn increment_and_decrement_counters() {
    assert_eq!(
        render_ok("{% increment c %}{% increment c %}{% increment c %}", json!({})).await,
        "012"
    );
    assert_eq!(
        render_ok("{% decrement c %}{% decrement c %}", json!({})).await,
        "-1-2"
    );
    // Counters are registers, not variables.
    assert_eq!(render_ok("{% increment c %}[{{ c }}]", json!({})).await, "0[]");
}

#[tokio::test]
async fn lazy_binding_is_computed_once_per_render() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    let (tag_registry, filter_registry) = registries();
    let template = Parser::new(&tag_registry)
        .parse("{{ expensive }} and {{ expensive }}")
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut scope = Scope::new(json!({}));
    let counter = Arc::clone(&calls);
    scope.assign_lazy("expensive", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        json!("value")
    });

    let output = Renderer::new(&tag_registry, &filter_registry)
        .render_template(&template, &mut scope)
        .await
        .unwrap();
    assert_eq!(output, "value and value");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ======================= Verbatim blocks =======================

#[tokio::test]
async fn raw_preserves_delimiters() {
    let source = "{% raw %}{{ not parsed }} {% if %} {% endraw %}done";
    assert_eq!(
        render_ok(source, json!({})).await,
        "{{ not parsed }} {% if %} done"
    );
}

#[tokio::test]
async fn comment_discards_body() {
    let source = "a{% comment %} {{ junk }} {% bogus %} {% endcomment %}b";
    assert_eq!(render_ok(source, json!({})).await, "ab");
}

// ======================= Filters in templates =======================

#[tokio::test]
async fn filter_pipeline_applies_left_to_right() {
    let (tag_registry, mut filter_registry) = registries();
    filter_registry
        .register_fn("add", |input, args| {
            Ok(json!(input.as_i64().unwrap_or(0) + args[0].as_i64().unwrap_or(0)))
        })
        .unwrap();
    filter_registry
        .register_fn("multiply", |input, args| {
            Ok(json!(input.as_i64().unwrap_or(0) * args[0].as_i64().unwrap_or(1)))
        })
        .unwrap();
    let template = Parser::new(&tag_registry)
        .parse("{{ 3 | add: 2 | multiply: 10 }}")
        .unwrap();
    let mut scope = Scope::new(json!({}));
    let output = Renderer::new(&tag_registry, &filter_registry)
        .render_template(&template, &mut scope)
        .await
        .unwrap();
    assert_eq!(output, "50");
}

#[tokio::test]
async fn unknown_filter_fails_with_its_name_and_position() {
    let err = render("line one\n{{ x | no_such_filter }}", json!({"x": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert!(err.to_string().contains("no_such_filter"));
    assert_eq!(err.position().map(|p| p.line), Some(2));
}

struct YieldingUpcase;

impl FilterHandler for YieldingUpcase {
    fn apply<'a>(
        &'a self,
        input: Value,
        _args: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, TemplateError>> {
        Box::pin(async move {
            // Force a real suspension point before resolving.
            tokio::task::yield_now().await;
            Ok(Value::String(to_display(&input).to_uppercase()))
        })
    }
}

#[tokio::test]
async fn asynchronous_filter_suspends_and_resumes() {
    let (tag_registry, mut filter_registry) = registries();
    filter_registry
        .register("slow_upcase", Box::new(YieldingUpcase))
        .unwrap();
    let template = Parser::new(&tag_registry)
        .parse("{{ name | slow_upcase }} ok")
        .unwrap();
    let mut scope = Scope::new(json!({"name": "ada"}));
    let output = Renderer::new(&tag_registry, &filter_registry)
        .render_template(&template, &mut scope)
        .await
        .unwrap();
    assert_eq!(output, "ADA ok");
}

// ======================= Early termination =======================

/// A user tag that stops the render: output so far is final.
struct HaltTag;

impl TagHandler for HaltTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, _input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        Ok(Box::new(HaltRenderer))
    }
}

struct HaltRenderer;

impl TagRenderer for HaltRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        _scope: &'a mut Scope,
        _out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move { Ok(RenderFlow::Break) })
    }
}

/// A user tag that always fails, for error-path balance tests.
struct BoomTag;

impl TagHandler for BoomTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, _input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        Ok(Box::new(BoomRenderer))
    }
}

struct BoomRenderer;

impl TagRenderer for BoomRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        _scope: &'a mut Scope,
        _out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move { Err(TemplateError::render("boom")) })
    }
}

fn registries_with_test_tags() -> (TagRegistry, FilterRegistry) {
    let (mut tag_registry, filter_registry) = registries();
    tag_registry.register("halt", Box::new(HaltTag)).unwrap();
    tag_registry.register("boom", Box::new(BoomTag)).unwrap();
    (tag_registry, filter_registry)
}

async fn render_with_test_tags(
    source: &str,
    context: Value,
) -> (Result<String, TemplateError>, usize) {
    let (tag_registry, filter_registry) = registries_with_test_tags();
    let template = Parser::new(&tag_registry).parse(source).unwrap();
    let mut scope = Scope::new(context);
    let result = Renderer::new(&tag_registry, &filter_registry)
        .render_template(&template, &mut scope)
        .await;
    (result, scope.depth())
}

#[tokio::test]
async fn break_stops_rendering_and_is_not_an_error() {
    let (result, _) = render_with_test_tags("A {% halt %} B", json!({})).await;
    assert_eq!(result.unwrap(), "A ");
}

#[tokio::test]
async fn break_propagates_through_nested_blocks() {
    let source = "{% for x in xs %}{{ x }}{% if x > 1 %}{% halt %}{% endif %}.{% endfor %}tail";
    let (result, depth) = render_with_test_tags(source, json!({"xs": [1, 2, 3]})).await;
    // Iteration 1 emits "1."; iteration 2 emits "2" then halts before ".".
    assert_eq!(result.unwrap(), "1.2");
    assert_eq!(depth, 1);
}

#[tokio::test]
async fn frame_stack_is_balanced_after_success_break_and_error() {
    let cases = [
        ("{% for x in xs %}{% if x %}{{ x }}{% endif %}{% endfor %}", true),
        ("{% for x in xs %}{% halt %}{% endfor %}", true),
        ("{% for x in xs %}{% boom %}{% endfor %}", false),
    ];
    for (source, succeeds) in cases {
        let (result, depth) = render_with_test_tags(source, json!({"xs": [1, 2]})).await;
        assert_eq!(result.is_ok(), succeeds, "source: {}", source);
        assert_eq!(depth, 1, "leaked frames in: {}", source);
    }
}

#[tokio::test]
async fn render_error_carries_node_position() {
    let (result, _) = render_with_test_tags("line\n  {% boom %}", json!({})).await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(err.position().map(|p| (p.line, p.col)), Some((2, 3)));
}

// ======================= Loader-backed tags =======================

/// In-memory template source for `include`/`layout` tests; parses with its
/// own registry of default tags, the way an engine-level loader would.
struct MapLoader {
    templates: HashMap<String, String>,
    tags: TagRegistry,
}

impl MapLoader {
    fn new(entries: &[(&str, &str)]) -> Self {
        let mut registry = TagRegistry::new();
        tags::register_defaults(&mut registry).unwrap();
        Self {
            templates: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tags: registry,
        }
    }
}

impl TemplateLoader for MapLoader {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<Template>, TemplateError>> {
        Box::pin(async move {
            let source = self
                .templates
                .get(name)
                .ok_or_else(|| TemplateError::not_found(format!("no template '{}'", name)))?;
            Ok(Arc::new(Parser::new(&self.tags).parse(source)?))
        })
    }
}

async fn render_with_loader(
    source: &str,
    context: Value,
    loader: &MapLoader,
) -> Result<String, TemplateError> {
    let (tag_registry, filter_registry) = registries();
    let template = Parser::new(&tag_registry).parse(source)?;
    let mut scope = Scope::new(context);
    Renderer::new(&tag_registry, &filter_registry)
        .with_loader(loader)
        .render_template(&template, &mut scope)
        .await
}

#[tokio::test]
async fn include_renders_partial_against_current_scope() {
    let loader = MapLoader::new(&[("header", "== {{ title }} ==")]);
    let output = render_with_loader(
        "{% include 'header' %}\nbody",
        json!({"title": "T"}),
        &loader,
    )
    .await
    .unwrap();
    assert_eq!(output, "== T ==\nbody");
}

#[tokio::test]
async fn include_with_binds_stem_name() {
    let loader = MapLoader::new(&[("cards/card", "<{{ card }}>")]);
    let output = render_with_loader(
        "{% include 'cards/card' with items[0] %}",
        json!({"items": ["a"]}),
        &loader,
    )
    .await
    .unwrap();
    assert_eq!(output, "<a>");
}

#[tokio::test]
async fn include_assigns_do_not_leak() {
    let loader = MapLoader::new(&[("setter", "{% assign inner = 1 %}")]);
    let output = render_with_loader("{% include 'setter' %}[{{ inner }}]", json!({}), &loader)
        .await
        .unwrap();
    assert_eq!(output, "[]");
}

#[tokio::test]
async fn layout_substitutes_wrapper_output_and_succeeds() {
    let loader = MapLoader::new(&[("wrap", "<main>{{ content }}</main>")]);
    let output = render_with_loader(
        "before {% layout 'wrap' %}inner {{ n }}{% endlayout %} never",
        json!({"n": 7}),
        &loader,
    )
    .await
    .unwrap();
    // The wrapper's output replaces everything; nothing after renders.
    assert_eq!(output, "<main>inner 7</main>");
}

#[tokio::test]
async fn missing_include_surfaces_not_found() {
    let loader = MapLoader::new(&[]);
    let err = render_with_loader("{% include 'ghost' %}", json!({}), &loader)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn include_without_loader_is_a_render_error() {
    let err = render("{% include 'x' %}", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert!(err.to_string().contains("loader"));
}
