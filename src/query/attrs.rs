/// The closed attribute match-rule table.
///
/// Each recognised attribute is registered with one of three kinds:
///
/// - **Predicate** — the value is handed to a set-side function
///   (`modelTypeGroup=question` asks the anchor model about group
///   membership).
/// - **Truthy** — the bare form (`(isComplete)`) requires the property to
///   be truthy.
/// - **StringEq** — the valued form compares the property's string form
///   against the literal.
///
/// Booleans stringify to `true`/`false`, so `isAvailable=false` works the
/// way the valued form promises. Unrecognised attributes match nothing
/// and are logged once per evaluation at debug level.
///
/// `modelId` matches the set's anchor model id by string equality; the
/// overlapping-hierarchy form of model addressing lives on the dedicated
/// `*_by_intersecting_model_id` surfaces.
use crate::query::parser::Attr;
use crate::sets::{IntersectionSet, SetRef};
use tracing::debug;

/// A set property projected for matching.
enum PropValue {
    Bool(bool),
    Text(String),
}

impl PropValue {
    fn truthy(&self) -> bool {
        match self {
            PropValue::Bool(value) => *value,
            PropValue::Text(text) => !text.is_empty(),
        }
    }

    fn eq_str(&self, expected: &str) -> bool {
        match self {
            PropValue::Bool(value) => {
                expected == if *value { "true" } else { "false" }
            }
            PropValue::Text(text) => text == expected,
        }
    }
}

/// Does `set` match one attribute occurrence?
pub fn match_attr(set: &SetRef, attr: &Attr) -> bool {
    match attr.name.as_str() {
        // Predicate kind: the value is an argument, not a comparison.
        "modelTypeGroup" => {
            let Some(group) = attr.value.as_deref() else {
                return false;
            };
            set.model().is_some_and(|model| model.is_type_group(group))
        }
        // Anchor-model equality.
        "modelId" => {
            let Some(expected) = attr.value.as_deref() else {
                return set.model_id().is_some();
            };
            set.model_id().as_deref() == Some(expected)
        }
        name => {
            let Some(value) = prop_value(set, name) else {
                debug!(attr = name, "unrecognised query attribute");
                return false;
            };
            match attr.value.as_deref() {
                None => value.truthy(),
                Some(expected) => value.eq_str(expected),
            }
        }
    }
}

/// All attributes of one where-object must match.
pub fn match_all(set: &SetRef, attrs: &[Attr]) -> bool {
    attrs.iter().all(|attr| match_attr(set, attr))
}

fn prop_value(set: &SetRef, name: &str) -> Option<PropValue> {
    let value = match name {
        "id" => PropValue::Text(set.id().to_string()),
        "type" => PropValue::Text(set.set_type().to_string()),
        "isEnabled" => PropValue::Bool(set.is_enabled()),
        "isOptional" => PropValue::Bool(set.is_optional()),
        "isAvailable" => PropValue::Bool(set.is_available()),
        "isModelAvailableInHierarchy" => {
            PropValue::Bool(set.is_model_available_in_hierarchy())
        }
        "isPopulated" => PropValue::Bool(set.is_populated()),
        "isNotPopulated" => PropValue::Bool(set.is_not_populated()),
        "modelType" => PropValue::Text(
            set.model()
                .map(|model| model.model_type().as_str().to_string())
                .unwrap_or_default(),
        ),
        "modelComponent" => PropValue::Text(
            set.model()
                .and_then(|model| model.component_kind().map(str::to_string))
                .unwrap_or_default(),
        ),
        "isComplete" => PropValue::Bool(set_is_complete(set)),
        "isIncomplete" => PropValue::Bool(!set_is_complete(set)),
        "isPassed" => PropValue::Bool(match set.as_scoring() {
            Some(scoring) => scoring.is_passed(),
            // For a plain wrapper set, passed is an alias of complete.
            None => set_is_complete(set),
        }),
        "isFailed" => PropValue::Bool(
            set.as_scoring().is_some_and(|scoring| scoring.is_failed()),
        ),
        _ => return None,
    };
    Some(value)
}

fn set_is_complete(set: &SetRef) -> bool {
    match set.as_scoring() {
        Some(scoring) => scoring.is_complete(),
        None => set.model().is_some_and(|model| model.is_complete()),
    }
}
