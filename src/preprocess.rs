//! Preprocessing step registry and composition.
//!
//! Steps are named batch transforms bound to one side of the examples.
//! Resolution is explicit: a registry maps names to step functions, the
//! builder resolves configured step lists eagerly, and the resulting
//! `BoundSteps` run in configuration order on each columnar batch. There is
//! no global registration; callers start from `PreprocessRegistry::builtin`
//! and register their own steps on top.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::config::StepSpec;
use crate::constants::fields;
use crate::errors::PairsetError;
use crate::record::{ColumnarBatch, Record};
use crate::types::Kwargs;

/// Which side of the examples a step operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// The `source` payload.
    Source,
    /// The `target` payload.
    Target,
}

impl Side {
    /// The example field carrying this side's payload.
    pub fn field(self) -> &'static str {
        match self {
            Side::Source => fields::SOURCE,
            Side::Target => fields::TARGET,
        }
    }
}

/// One preprocessing step: mutates a batch of examples on one side.
///
/// Examples: `lower_case`, `ensure_text_ends_with` with a `suffix` kwarg.
pub type StepFn =
    Arc<dyn Fn(&mut ColumnarBatch, Side, &Kwargs) -> Result<(), PairsetError> + Send + Sync>;

/// Name-to-step registry consulted when a pipeline is built.
#[derive(Clone, Default)]
pub struct PreprocessRegistry {
    steps: IndexMap<String, StepFn>,
}

impl PreprocessRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of built-in text steps.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("lower_case", Arc::new(lower_case));
        registry.register("clean_text", Arc::new(clean_text));
        registry.register("prefix_language_token", Arc::new(prefix_language_token));
        registry.register("ensure_text_ends_with", Arc::new(ensure_text_ends_with));
        registry
    }

    /// Register (or replace) a step under `name`.
    pub fn register(&mut self, name: impl Into<String>, step: StepFn) {
        self.steps.insert(name.into(), step);
    }

    /// Registered step names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.steps.keys().cloned().collect()
    }

    /// Look up one step by name.
    pub fn resolve(&self, name: &str) -> Result<&StepFn, PairsetError> {
        self.steps
            .get(name)
            .ok_or_else(|| PairsetError::UnknownPreprocessor {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Resolve an ordered step list for one side. Unknown names fail here,
    /// at pipeline-build time, not mid-stream.
    pub fn compose(&self, specs: &[StepSpec], side: Side) -> Result<BoundSteps, PairsetError> {
        let mut bound = BoundSteps::identity();
        for spec in specs {
            let step = self.resolve(&spec.name)?;
            debug!(step = spec.name.as_str(), ?side, "bound preprocessing step");
            bound.steps.push((Arc::clone(step), side, spec.kwargs.clone()));
        }
        Ok(bound)
    }
}

/// An ordered, side-bound sequence of resolved steps.
#[derive(Clone, Default)]
pub struct BoundSteps {
    steps: Vec<(StepFn, Side, Kwargs)>,
}

impl std::fmt::Debug for BoundSteps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSteps")
            .field("len", &self.steps.len())
            .finish()
    }
}

impl BoundSteps {
    /// The empty sequence.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Whether no steps are bound.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append another sequence after this one.
    pub fn extend(&mut self, other: BoundSteps) {
        self.steps.extend(other.steps);
    }

    /// Run every step, in order, on one batch of examples.
    pub fn apply(&self, batch: &mut ColumnarBatch) -> Result<(), PairsetError> {
        for (step, side, kwargs) in &self.steps {
            step(batch, *side, kwargs)?;
        }
        Ok(())
    }
}

/// Lift a per-example function over a whole batch.
///
/// Columnarizes back over the union of the resulting field names, so a step
/// may add or remove example fields.
pub fn for_each_example(
    batch: &mut ColumnarBatch,
    mut f: impl FnMut(&mut Record) -> Result<(), PairsetError>,
) -> Result<(), PairsetError> {
    let mut records = std::mem::take(batch).into_records();
    for record in &mut records {
        f(record)?;
    }
    *batch = ColumnarBatch::from_records(&records);
    Ok(())
}

/// Mutate every string payload cell on `side`; non-string cells (audio) are
/// left alone.
fn for_each_text(batch: &mut ColumnarBatch, side: Side, f: impl Fn(&str) -> String) {
    if let Some(column) = batch.column_mut(side.field()) {
        for cell in column {
            if let Value::String(text) = cell {
                *cell = Value::String(f(text));
            }
        }
    }
}

fn lower_case(batch: &mut ColumnarBatch, side: Side, _kwargs: &Kwargs) -> Result<(), PairsetError> {
    for_each_text(batch, side, str::to_lowercase);
    Ok(())
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn normalize_inline_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_text(batch: &mut ColumnarBatch, side: Side, _kwargs: &Kwargs) -> Result<(), PairsetError> {
    for_each_text(batch, side, normalize_inline_whitespace);
    Ok(())
}

/// Prefix each text payload with its own language token, read per example
/// from `side.language`.
fn prefix_language_token(
    batch: &mut ColumnarBatch,
    side: Side,
    _kwargs: &Kwargs,
) -> Result<(), PairsetError> {
    let payload = side.field();
    let language_field = format!("{payload}.language");
    for_each_example(batch, |example| {
        let Some(language) = example.text(&language_field).map(str::to_string) else {
            return Ok(());
        };
        if let Some(Value::String(text)) = example.get_mut(payload) {
            *text = format!("<{language}> {text}");
        }
        Ok(())
    })
}

fn ensure_text_ends_with(
    batch: &mut ColumnarBatch,
    side: Side,
    kwargs: &Kwargs,
) -> Result<(), PairsetError> {
    let suffix = kwargs
        .get("suffix")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PairsetError::Configuration(
                "ensure_text_ends_with requires a string 'suffix' kwarg".to_string(),
            )
        })?;
    for_each_text(batch, side, |text| {
        if text.ends_with(suffix) {
            text.to_string()
        } else {
            format!("{text}{suffix}")
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(rows: Vec<Value>) -> ColumnarBatch {
        let records: Vec<Record> = rows
            .into_iter()
            .map(|row| Record::from_value(row).unwrap())
            .collect();
        ColumnarBatch::from_records(&records)
    }

    fn steps(registry: &PreprocessRegistry, spec: Value, side: Side) -> BoundSteps {
        let specs = StepSpec::parse_list(&Some(spec)).unwrap();
        registry.compose(&specs, side).unwrap()
    }

    #[test]
    fn unknown_step_names_fail_with_the_available_names() {
        let registry = PreprocessRegistry::builtin();
        let specs = StepSpec::parse_list(&Some(json!(["shout"]))).unwrap();
        let err = registry.compose(&specs, Side::Source).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("shout"), "got: {message}");
        assert!(message.contains("lower_case"), "got: {message}");
    }

    #[test]
    fn steps_only_touch_their_own_side() {
        let registry = PreprocessRegistry::builtin();
        let mut examples = batch(vec![json!({"source": "HELLO", "target": "WORLD"})]);
        steps(&registry, json!(["lower_case"]), Side::Source)
            .apply(&mut examples)
            .unwrap();
        assert_eq!(examples.column("source").unwrap(), &[json!("hello")]);
        assert_eq!(examples.column("target").unwrap(), &[json!("WORLD")]);
    }

    #[test]
    fn non_string_payloads_pass_through_text_steps() {
        let registry = PreprocessRegistry::builtin();
        let mut examples = batch(vec![json!({"source": "Hi", "target": [0.1, 0.2]})]);
        steps(&registry, json!(["lower_case", "clean_text"]), Side::Target)
            .apply(&mut examples)
            .unwrap();
        assert_eq!(examples.column("target").unwrap(), &[json!([0.1, 0.2])]);
    }

    #[test]
    fn clean_text_collapses_inline_whitespace() {
        let registry = PreprocessRegistry::builtin();
        let mut examples = batch(vec![json!({"source": "  a \t b\n c  "})]);
        steps(&registry, json!(["clean_text"]), Side::Source)
            .apply(&mut examples)
            .unwrap();
        assert_eq!(examples.column("source").unwrap(), &[json!("a b c")]);
    }

    #[test]
    fn prefix_language_token_reads_the_sides_language() {
        let registry = PreprocessRegistry::builtin();
        let mut examples = batch(vec![
            json!({"source": "hello", "source.language": "eng"}),
            json!({"source": "mbote"}),
        ]);
        steps(&registry, json!(["prefix_language_token"]), Side::Source)
            .apply(&mut examples)
            .unwrap();
        assert_eq!(
            examples.column("source").unwrap(),
            &[json!("<eng> hello"), json!("mbote")]
        );
    }

    #[test]
    fn ensure_text_ends_with_is_idempotent() {
        let registry = PreprocessRegistry::builtin();
        let bound = steps(
            &registry,
            json!([{"ensure_text_ends_with": {"suffix": "."}}]),
            Side::Source,
        );
        let mut examples = batch(vec![json!({"source": "done."}), json!({"source": "not"})]);
        bound.apply(&mut examples).unwrap();
        bound.apply(&mut examples).unwrap();
        assert_eq!(
            examples.column("source").unwrap(),
            &[json!("done."), json!("not.")]
        );
    }

    #[test]
    fn ensure_text_ends_with_requires_a_suffix_kwarg() {
        let registry = PreprocessRegistry::builtin();
        let bound = steps(&registry, json!(["ensure_text_ends_with"]), Side::Source);
        let mut examples = batch(vec![json!({"source": "hi"})]);
        let err = bound.apply(&mut examples).unwrap_err();
        assert!(matches!(err, PairsetError::Configuration(_)));
    }

    #[test]
    fn step_order_is_the_configured_order() {
        // lower_case and the suffix check do not commute.
        let registry = PreprocessRegistry::builtin();
        let mut examples = batch(vec![json!({"source": "HELLO"})]);
        steps(
            &registry,
            json!([{"ensure_text_ends_with": {"suffix": "X"}}, "lower_case"]),
            Side::Source,
        )
        .apply(&mut examples)
        .unwrap();
        assert_eq!(examples.column("source").unwrap(), &[json!("hellox")]);

        let mut examples = batch(vec![json!({"source": "HELLO"})]);
        steps(
            &registry,
            json!(["lower_case", {"ensure_text_ends_with": {"suffix": "X"}}]),
            Side::Source,
        )
        .apply(&mut examples)
        .unwrap();
        assert_eq!(examples.column("source").unwrap(), &[json!("helloX")]);
    }

    #[test]
    fn custom_steps_can_be_registered_alongside_builtins() {
        let mut registry = PreprocessRegistry::builtin();
        registry.register(
            "shout",
            Arc::new(|batch, side, _kwargs| {
                for_each_text(batch, side, str::to_uppercase);
                Ok(())
            }),
        );
        let mut examples = batch(vec![json!({"source": "hi"})]);
        steps(&registry, json!(["shout"]), Side::Source)
            .apply(&mut examples)
            .unwrap();
        assert_eq!(examples.column("source").unwrap(), &[json!("HI")]);
    }
}
