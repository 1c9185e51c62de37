//! The advisor contract adapters implement to participate in discovery.
//!
//! Rather than scanning an adapter's methods by reflection for a marker attribute,
//! an adapter lists its advisors explicitly via [`Discoverable::advisors`] — each
//! entry names the field it covers and the relative order advisors should run in.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::advice::AdvisedValue;

/// Read-only view of field values already settled along the current discovery path.
/// Mirrors the builder-graph edge walk in the original design, flattened into a
/// simple lookup since only prior fields (never later ones) are ever queried.
#[derive(Clone, Debug, Default)]
pub struct EdgeContext {
    resolved: HashMap<String, Value>,
}

impl EdgeContext {
    /// An empty context, as seen by the first advisor.
    #[must_use]
    pub fn new() -> Self {
        EdgeContext::default()
    }

    /// The value a previous advisor settled on for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.resolved.get(field)
    }

    /// A new context extending this one with `field`'s resolved value.
    #[must_use]
    pub fn with(&self, field: &str, value: Value) -> Self {
        let mut resolved = self.resolved.clone();
        resolved.insert(field.to_string(), value);
        EdgeContext { resolved }
    }
}

/// One field's contribution to discovery: given the value the caller supplied (if
/// any) and the fields already resolved along this path, say what values are
/// acceptable.
#[async_trait]
pub trait FieldAdvisor: Send + Sync {
    /// The parameter field this advisor covers.
    fn field(&self) -> &str;

    /// Relative position among an adapter's advisors. A non-negative order runs
    /// in ascending order first; a negative order counts back from the end (-1
    /// last, -2 second-to-last, and so on), which is also the default. Ties are
    /// broken by declaration order in [`Discoverable::advisors`]. See
    /// [`crate::builder::order_sort_key`] for the normalization that gives
    /// negative orders their actual sort position.
    fn order(&self) -> i32 {
        -1
    }

    /// Produce advice for this field. `value` is `Some` when the caller already
    /// supplied a concrete value to validate, `None` when the field is missing and
    /// needs full advice. Returning `Err` means the field cannot be advised or
    /// validated at all under the current context.
    async fn advise(&self, value: Option<&Value>, ctx: &EdgeContext) -> Result<AdvisedValue, String>;
}

/// An adapter configuration that can be discovered field by field.
pub trait Discoverable {
    /// This adapter's field advisors, in the order they were registered. Sorting
    /// by [`FieldAdvisor::order`] happens in [`crate::builder::generate_advice`].
    fn advisors(&self) -> Vec<std::sync::Arc<dyn FieldAdvisor>>;

    /// The caller-supplied parameters, as a flat JSON object. A field absent from
    /// this map is treated as a request for advice rather than a value to validate.
    fn params(&self) -> &Map<String, Value>;
}
