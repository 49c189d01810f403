/// Query evaluation: selection, multiplication, intersection, filters.
///
/// Per column: start from every registered set, narrow by the primary and
/// the multiplied `[…]` where-objects. Then Cartesian-multiply the
/// column selections, fold each tuple left to right through the
/// intersection operator, apply each column's `(…)` filters to the
/// intermediate result as its column is folded in, and de-duplicate.
use crate::context::ScoringContext;
use crate::error::ScoringResult;
use crate::query::attrs::match_all;
use crate::query::parser::{parse_query, Attr, Primary, QueryColumn};
use crate::sets::{intersect_chain, IntersectionSet, SetRef, SubsetExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Evaluate a query against the registry.
pub fn get_subsets_by_query(ctx: &Arc<ScoringContext>, query: &str) -> ScoringResult<Vec<SetRef>> {
    let columns = parse_query(query)?;
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let all = ctx.registry().sets();
    let selections: Vec<Vec<SetRef>> = columns
        .iter()
        .map(|column| select_column(&all, column))
        .collect();
    // An unmatched column empties every tuple.
    if selections.iter().any(Vec::is_empty) {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    let mut seen = HashSet::new();
    for tuple in cartesian(&selections) {
        if let Some(result) = fold_tuple(&columns, &tuple) {
            if seen.insert(path_signature(&result)) {
                results.push(result);
            }
        }
    }
    Ok(results)
}

/// First result of [`get_subsets_by_query`].
pub fn get_subset_by_query(ctx: &Arc<ScoringContext>, query: &str) -> ScoringResult<Option<SetRef>> {
    Ok(get_subsets_by_query(ctx, query)?.into_iter().next())
}

/// Path form: ids folded through the intersection operator in order.
/// Accepts `"a.b.c"` via [`get_subset_by_path_str`]-style splitting done
/// by the caller; any unknown id yields `None`.
pub fn get_subset_by_path<I, S>(ctx: &Arc<ScoringContext>, path: I) -> Option<SetRef>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let registry = ctx.registry();
    let sets = path
        .into_iter()
        .map(|id| registry.get(id.as_ref()))
        .collect::<Option<Vec<_>>>()?;
    intersect_chain(&sets)
}

/// Compute one column's selection list.
fn select_column(all: &[SetRef], column: &QueryColumn) -> Vec<SetRef> {
    let wheres = build_where_objects(column);
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for where_object in &wheres {
        for set in all {
            if match_all(set, where_object) && seen.insert(set.id().to_string()) {
                selected.push(set.clone());
            }
        }
    }
    selected
}

/// Multiply the primary and every `[…]` clause into flat where-objects.
/// Later occurrences of an attribute override earlier ones, as merge
/// semantics demand.
fn build_where_objects(column: &QueryColumn) -> Vec<Vec<Attr>> {
    let mut wheres: Vec<Vec<Attr>> = vec![Vec::new()];
    if let Some(primary) = &column.primary {
        let attr = match primary {
            Primary::Id(id) => Attr {
                name: "id".to_string(),
                value: Some(id.clone()),
            },
            Primary::Type(set_type) => Attr {
                name: "type".to_string(),
                value: Some(set_type.clone()),
            },
        };
        wheres[0].push(attr);
    }
    for clause in &column.selects {
        if clause.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(wheres.len() * clause.len());
        for existing in &wheres {
            for attr in clause {
                let mut merged: Vec<Attr> = existing
                    .iter()
                    .filter(|a| a.name != attr.name)
                    .cloned()
                    .collect();
                merged.push(attr.clone());
                next.push(merged);
            }
        }
        wheres = next;
    }
    wheres
}

/// All combinations, column-major order preserved.
fn cartesian(selections: &[Vec<SetRef>]) -> Vec<Vec<SetRef>> {
    let mut tuples: Vec<Vec<SetRef>> = vec![Vec::new()];
    for selection in selections {
        let mut next = Vec::with_capacity(tuples.len() * selection.len());
        for tuple in &tuples {
            for set in selection {
                let mut extended = tuple.clone();
                extended.push(set.clone());
                next.push(extended);
            }
        }
        tuples = next;
    }
    tuples
}

/// Fold one tuple via intersection, filtering intermediates. The result's
/// concrete type is the rightmost operand's; a failed column filter drops
/// the whole tuple.
fn fold_tuple(columns: &[QueryColumn], tuple: &[SetRef]) -> Option<SetRef> {
    let mut acc: Option<SetRef> = None;
    for (column, set) in columns.iter().zip(tuple) {
        let current = match acc {
            None => set.clone(),
            Some(parent) => set.clone_with_parent(parent),
        };
        if !column.filters.is_empty() && !match_all(&current, &column.filters) {
            return None;
        }
        acc = Some(current);
    }
    acc
}

fn path_signature(set: &SetRef) -> String {
    set.subset_path()
        .iter()
        .map(|ancestor| ancestor.id())
        .collect::<Vec<_>>()
        .join("\u{1}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::content::{ContentModel, ContentTree, ContentType, ModelFlag};
    use crate::offline::OfflineStorage;
    use crate::sets::{
        IntersectionSet, ModelScoringOptions, ModelScoringSet, ModelSet, SetOptions,
    };

    /// course → (a-1 → b-1 → q-1 q-2), (a-2 → b-2 → q-3 q-4); a wrapper
    /// set per model and one scoring set over all four questions.
    fn fixture() -> (Arc<ScoringContext>, Arc<ContentTree>) {
        let tree = Arc::new(ContentTree::new());
        tree.add(ContentModel::new("course", ContentType::Course), None)
            .unwrap();
        for (article, block, qs) in [
            ("a-1", "b-1", ["q-1", "q-2"]),
            ("a-2", "b-2", ["q-3", "q-4"]),
        ] {
            tree.add(ContentModel::new(article, ContentType::Article), Some("course"))
                .unwrap();
            tree.add(ContentModel::new(block, ContentType::Block), Some(article))
                .unwrap();
            for q in qs {
                tree.add(ContentModel::question(q, "mcq"), Some(block)).unwrap();
            }
        }
        let ctx = ScoringContext::new(
            Arc::clone(&tree),
            Arc::new(OfflineStorage::ready_now()),
            ScoringConfig::default(),
        );
        for model in tree.all() {
            ModelSet::create(&ctx, model).unwrap();
        }
        ModelScoringSet::create(
            &ctx,
            ModelScoringOptions::new().set_type("assessment").set(
                SetOptions::new().id("perf").models(
                    ["q-1", "q-2", "q-3", "q-4"]
                        .iter()
                        .map(|q| tree.find_by_id(q).unwrap())
                        .collect(),
                ),
            ),
        )
        .unwrap();
        (ctx, tree)
    }

    fn answer(tree: &ContentTree, id: &str, score: f64) {
        let q = tree.find_by_id(id).unwrap();
        q.set_score(score);
        q.set_flag(ModelFlag::IsCorrect, score > 0.0);
    }

    #[test]
    fn test_select_by_id() {
        let (ctx, _tree) = fixture();
        let results = get_subsets_by_query(&ctx, "#perf").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "perf");
        // A single-column id query hands back the root itself.
        assert!(!results[0].is_intersected_clone());
    }

    #[test]
    fn test_select_by_type() {
        let (ctx, _tree) = fixture();
        let results = get_subsets_by_query(&ctx, "assessment").unwrap();
        assert_eq!(results.len(), 1);
        let models = get_subsets_by_query(&ctx, "model").unwrap();
        assert_eq!(models.len(), 9);
    }

    #[test]
    fn test_intersection_restricts_scope() {
        let (ctx, tree) = fixture();
        answer(&tree, "q-1", 1.0);
        answer(&tree, "q-3", 1.0);
        ctx.bump_stamp();

        let result = get_subset_by_query(&ctx, "#a-1 #perf").unwrap().unwrap();
        assert!(result.is_intersected_clone());
        assert_eq!(result.set_type(), "assessment");
        let scoring = result.as_scoring().unwrap();
        // Only q-1/q-2 are inside a-1.
        assert_eq!(scoring.score(), 1.0);
        assert_eq!(scoring.max_score(), 2.0);
    }

    #[test]
    fn test_multiplication_yields_one_result_per_select() {
        let (ctx, tree) = fixture();
        answer(&tree, "q-1", 1.0);
        answer(&tree, "q-2", 1.0);
        answer(&tree, "q-3", 1.0);
        ctx.bump_stamp();

        let results =
            get_subsets_by_query(&ctx, "model[modelId=a-1,modelId=a-2] #perf").unwrap();
        assert_eq!(results.len(), 2);
        let scores: Vec<f64> = results
            .iter()
            .map(|set| set.as_scoring().unwrap().score())
            .collect();
        assert_eq!(scores, vec![2.0, 1.0]);
    }

    #[test]
    fn test_filters_apply_after_intersection() {
        let (ctx, tree) = fixture();
        tree.find_by_id("a-1")
            .unwrap()
            .set_flag(ModelFlag::IsComplete, true);
        ctx.bump_stamp();

        let results =
            get_subsets_by_query(&ctx, "model[modelType=article](isComplete)").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "a-1");

        let none = get_subsets_by_query(&ctx, "model[modelType=article](isFailed)").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_unknown_model_id_is_empty_not_error() {
        let (ctx, _tree) = fixture();
        let results = get_subsets_by_query(&ctx, "model[modelId=missing] #perf").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_unbalanced_brackets_are_an_error() {
        let (ctx, _tree) = fixture();
        assert!(get_subsets_by_query(&ctx, "model[modelId=a-1").is_err());
    }

    #[test]
    fn test_deduplication() {
        let (ctx, _tree) = fixture();
        // Both where-objects select the same set; it must come back once.
        let results = get_subsets_by_query(&ctx, "[#perf, id=perf]").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_path_fold() {
        let (ctx, tree) = fixture();
        answer(&tree, "q-1", 1.0);
        ctx.bump_stamp();

        let result = get_subset_by_path(&ctx, ["a-1", "b-1", "perf"]).unwrap();
        assert_eq!(result.set_type(), "assessment");
        assert_eq!(result.as_scoring().unwrap().max_score(), 2.0);

        assert!(get_subset_by_path(&ctx, ["a-1", "missing"]).is_none());
    }

    #[test]
    fn test_rightmost_type_wins() {
        let (ctx, _tree) = fixture();
        let forward = get_subset_by_query(&ctx, "#a-1 #perf").unwrap().unwrap();
        assert_eq!(forward.set_type(), "assessment");
        let reverse = get_subset_by_query(&ctx, "#perf #a-1").unwrap().unwrap();
        assert_eq!(reverse.set_type(), "model");
    }
}
