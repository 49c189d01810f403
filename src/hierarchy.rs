/// Hierarchy utilities over content models.
///
/// The set algebra is built on one relation: a model *overlaps* a model
/// list when it equals, is an ancestor of, or is a descendant of some
/// element of that list. This module provides that predicate plus the
/// subtree/ancestor walks and the availability check used by set views.
use crate::content::ContentModel;
use std::collections::HashSet;
use std::sync::Arc;

/// All descendants of `model`, depth first, excluding `model` itself.
pub fn descendants(model: &Arc<ContentModel>) -> Vec<Arc<ContentModel>> {
    let mut out = Vec::new();
    collect_descendants(model, &mut out);
    out
}

fn collect_descendants(model: &Arc<ContentModel>, out: &mut Vec<Arc<ContentModel>>) {
    for child in model.children() {
        collect_descendants(&child, out);
        out.push(child);
    }
}

/// Ids of every model equal to, above, or below any element of `models`.
///
/// This is the one-pass index behind [`filter_by_intersecting_hierarchy`]:
/// membership in the returned set is exactly the overlapping-hierarchy
/// relation against `models`.
pub fn hierarchy_ids(models: &[Arc<ContentModel>]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for model in models {
        for ancestor in model.ancestors(true) {
            ids.insert(ancestor.id().to_string());
        }
        for descendant in descendants(model) {
            ids.insert(descendant.id().to_string());
        }
    }
    ids
}

/// Does `model` overlap the hierarchy of any element of `others`?
pub fn intersects_hierarchy(model: &Arc<ContentModel>, others: &[Arc<ContentModel>]) -> bool {
    hierarchy_ids(others).contains(model.id())
}

/// Keep the elements of `a` that overlap the hierarchy of some element of
/// `b`: equal to, ancestor of, or descendant of it.
///
/// `b` is indexed once (its ids plus its ancestor and descendant ids), so
/// the pass is linear in `|a| + |b| + |descendants(b)|`. An empty `b`
/// imposes no restriction and returns `a` unchanged.
pub fn filter_by_intersecting_hierarchy(
    a: &[Arc<ContentModel>],
    b: &[Arc<ContentModel>],
) -> Vec<Arc<ContentModel>> {
    if b.is_empty() {
        return a.to_vec();
    }
    let index = hierarchy_ids(b);
    a.iter()
        .filter(|model| index.contains(model.id()))
        .cloned()
        .collect()
}

/// Remove duplicate models (by id), keeping first occurrences in order.
pub fn unique_models(models: Vec<Arc<ContentModel>>) -> Vec<Arc<ContentModel>> {
    let mut seen = HashSet::new();
    models
        .into_iter()
        .filter(|model| seen.insert(model.id().to_string()))
        .collect()
}

/// Is `model` attached and available all the way up its ancestor chain?
///
/// Detached models are never available in hierarchy, whatever their own
/// `isAvailable` says.
pub fn is_available_in_hierarchy(model: &Arc<ContentModel>) -> bool {
    if !model.is_attached() {
        return false;
    }
    model
        .ancestors(true)
        .iter()
        .all(|ancestor| ancestor.is_available())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentModel, ContentTree, ContentType, ModelFlag};

    /// course → p-1 → (a-1 → b-1 → [q-1 q-2]), (a-2 → b-2 → [q-3 q-4])
    fn fixture() -> ContentTree {
        let tree = ContentTree::new();
        tree.add(ContentModel::new("course", ContentType::Course), None)
            .unwrap();
        tree.add(ContentModel::new("p-1", ContentType::Page), Some("course"))
            .unwrap();
        for (article, block, qs) in [
            ("a-1", "b-1", ["q-1", "q-2"]),
            ("a-2", "b-2", ["q-3", "q-4"]),
        ] {
            tree.add(ContentModel::new(article, ContentType::Article), Some("p-1"))
                .unwrap();
            tree.add(ContentModel::new(block, ContentType::Block), Some(article))
                .unwrap();
            for q in qs {
                tree.add(ContentModel::question(q, "mcq"), Some(block)).unwrap();
            }
        }
        tree
    }

    fn ids(models: &[Arc<ContentModel>]) -> Vec<&str> {
        models.iter().map(|m| m.id()).collect()
    }

    #[test]
    fn test_descendants_depth_first() {
        let tree = fixture();
        let a1 = tree.find_by_id("a-1").unwrap();
        assert_eq!(ids(&descendants(&a1)), vec!["q-1", "q-2", "b-1"]);
    }

    #[test]
    fn test_intersects_by_equality_ancestor_descendant() {
        let tree = fixture();
        let a1 = tree.find_by_id("a-1").unwrap();
        let course = tree.find_by_id("course").unwrap();
        let q1 = tree.find_by_id("q-1").unwrap();
        let q3 = tree.find_by_id("q-3").unwrap();

        let list = vec![Arc::clone(&a1)];
        assert!(intersects_hierarchy(&a1, &list)); // equal
        assert!(intersects_hierarchy(&course, &list)); // ancestor
        assert!(intersects_hierarchy(&q1, &list)); // descendant
        assert!(!intersects_hierarchy(&q3, &list)); // sibling branch
    }

    #[test]
    fn test_filter_by_intersecting_hierarchy() {
        let tree = fixture();
        let questions: Vec<_> = ["q-1", "q-2", "q-3", "q-4"]
            .iter()
            .map(|id| tree.find_by_id(id).unwrap())
            .collect();
        let a1 = vec![tree.find_by_id("a-1").unwrap()];

        let kept = filter_by_intersecting_hierarchy(&questions, &a1);
        assert_eq!(ids(&kept), vec!["q-1", "q-2"]);
    }

    #[test]
    fn test_empty_restriction_returns_input() {
        let tree = fixture();
        let questions: Vec<_> = ["q-1", "q-2"]
            .iter()
            .map(|id| tree.find_by_id(id).unwrap())
            .collect();
        let kept = filter_by_intersecting_hierarchy(&questions, &[]);
        assert_eq!(ids(&kept), vec!["q-1", "q-2"]);
    }

    #[test]
    fn test_availability_walks_ancestors() {
        let tree = fixture();
        let q1 = tree.find_by_id("q-1").unwrap();
        assert!(is_available_in_hierarchy(&q1));

        let a1 = tree.find_by_id("a-1").unwrap();
        a1.set_flag(ModelFlag::IsAvailable, false);
        assert!(!is_available_in_hierarchy(&q1));
        // Sibling branch is unaffected.
        let q3 = tree.find_by_id("q-3").unwrap();
        assert!(is_available_in_hierarchy(&q3));
    }

    #[test]
    fn test_detached_is_never_available() {
        let tree = fixture();
        let q1 = tree.find_by_id("q-1").unwrap();
        tree.remove("b-1").unwrap();
        assert!(q1.is_available());
        assert!(!is_available_in_hierarchy(&q1));
    }

    #[test]
    fn test_unique_models() {
        let tree = fixture();
        let q1 = tree.find_by_id("q-1").unwrap();
        let q2 = tree.find_by_id("q-2").unwrap();
        let doubled = vec![Arc::clone(&q1), Arc::clone(&q2), q1.clone(), q2.clone()];
        assert_eq!(ids(&unique_models(doubled)), vec!["q-1", "q-2"]);
    }
}
