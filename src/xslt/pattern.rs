//! Template match patterns.

use super::{
    eval::{Context, Evaluator, Item},
    expr::{parse_pattern_paths, Axis, Expr, LocationPath, NodeTest, Step},
    TransformError,
};

/// One `|`-separated alternative of a pattern, with its default priority.
#[derive(Debug, Clone, PartialEq)]
struct Alternative {
    path: LocationPath,
    priority: f64,
}

/// A compiled `match` pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    alternatives: Vec<Alternative>,
}

impl Pattern {
    pub fn parse(source: &str) -> Result<Self, TransformError> {
        let alternatives = parse_pattern_paths(source)?
            .into_iter()
            .map(|path| {
                validate(source, &path)?;
                let priority = default_priority(&path);
                Ok(Alternative { path, priority })
            })
            .collect::<Result<Vec<_>, TransformError>>()?;
        Ok(Self { alternatives })
    }

    /// The highest default priority among the alternatives that match
    /// `item`, or `None` if none do.
    pub fn match_priority(
        &self,
        evaluator: &Evaluator<'_>,
        item: Item,
    ) -> Result<Option<f64>, TransformError> {
        let mut best: Option<f64> = None;
        for alternative in &self.alternatives {
            if matches_path(evaluator, &alternative.path, item)? {
                best = Some(best.map_or(alternative.priority, |b| b.max(alternative.priority)));
            }
        }
        Ok(best)
    }
}

fn validate(source: &str, path: &LocationPath) -> Result<(), TransformError> {
    let allowed = |step: &Step| {
        matches!(step.axis, Axis::Child | Axis::Attribute) || step.is_descendant_shortcut()
    };
    if path.steps.iter().all(allowed) && !path.steps.last().is_some_and(Step::is_descendant_shortcut)
    {
        Ok(())
    } else {
        Err(TransformError::Syntax {
            expression: source.to_string(),
            message: "patterns may only use the child and attribute axes".to_string(),
        })
    }
}

fn default_priority(path: &LocationPath) -> f64 {
    match path.steps.as_slice() {
        [step] if !path.absolute && step.predicates.is_empty() => match step.test {
            NodeTest::Name(_) => 0.0,
            _ => -0.5,
        },
        _ => 0.5,
    }
}

fn matches_path(
    evaluator: &Evaluator<'_>,
    path: &LocationPath,
    item: Item,
) -> Result<bool, TransformError> {
    if path.steps.is_empty() {
        return Ok(item == Item::Node(evaluator.document().root()));
    }
    matches_from(evaluator, path, path.steps.len() - 1, item)
}

/// Matches `steps[..=index]` right to left, with `item` standing at `index`.
fn matches_from(
    evaluator: &Evaluator<'_>,
    path: &LocationPath,
    index: usize,
    item: Item,
) -> Result<bool, TransformError> {
    let step = &path.steps[index];
    let Some(parent) = evaluator.parent(item) else {
        return Ok(false);
    };
    if !step_matches(evaluator, step, parent, item)? {
        return Ok(false);
    }

    if index == 0 {
        let root = Item::Node(evaluator.document().root());
        return Ok(!path.absolute || parent == root);
    }

    let previous = &path.steps[index - 1];
    if !previous.is_descendant_shortcut() {
        return matches_from(evaluator, path, index - 1, parent);
    }

    // `//`: any ancestor may match the step before the shortcut.
    if index == 1 {
        return Ok(true);
    }
    let mut ancestor = Some(parent);
    while let Some(candidate) = ancestor {
        if matches_from(evaluator, path, index - 2, candidate)? {
            return Ok(true);
        }
        ancestor = evaluator.parent(candidate);
    }
    Ok(false)
}

/// Whether `item` is selected by `step` when evaluated from `parent`.
fn step_matches(
    evaluator: &Evaluator<'_>,
    step: &Step,
    parent: Item,
    item: Item,
) -> Result<bool, TransformError> {
    let is_attribute = matches!(item, Item::Attribute(..));
    if is_attribute != (step.axis == Axis::Attribute) {
        return Ok(false);
    }
    if !evaluator.node_test(&step.test, step.axis, item) {
        return Ok(false);
    }
    if step.predicates.iter().all(Expr::is_position_free) {
        let ctx = Context::new(item);
        for predicate in &step.predicates {
            if !evaluator.predicate_holds(predicate, ctx)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    let selected = evaluator.apply_step(step, parent)?;
    Ok(selected.contains(&item))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::xml::Document;

    const USX: &str = r#"<usx><book code="GEN"/><para style="s1">Creation</para><para style="p"><verse number="1"/>text</para></usx>"#;

    fn priority_of(pattern: &str, select: &str) -> Option<f64> {
        let doc = Document::parse(USX).unwrap();
        let evaluator = Evaluator::new(&doc);
        let item = evaluator
            .select(
                &crate::xslt::expr::parse_expr(select).unwrap(),
                Context::new(Item::Node(doc.root())),
            )
            .unwrap()[0];
        Pattern::parse(pattern)
            .unwrap()
            .match_priority(&evaluator, item)
            .unwrap()
    }

    #[test_case("para", "//para", Some(0.0); "name")]
    #[test_case("*", "//para", Some(-0.5); "wildcard")]
    #[test_case("node()", "//para", Some(-0.5); "any node")]
    #[test_case("para[@style='s1']", "//para[1]", Some(0.5); "predicate")]
    #[test_case("para[@style='s1']", "//para[2]", None; "predicate mismatch")]
    #[test_case("usx/para", "//para", Some(0.5); "parent step")]
    #[test_case("/usx", "/usx", Some(0.5); "absolute")]
    #[test_case("/para", "//para", None; "absolute mismatch")]
    #[test_case("usx//verse", "//verse", Some(0.5); "descendant")]
    #[test_case("book//verse", "//verse", None; "descendant mismatch")]
    #[test_case("@style", "//para/@style", Some(0.0); "attribute")]
    #[test_case("@*", "//para/@style", Some(-0.5); "any attribute")]
    #[test_case("*", "//para/@style", None; "elements do not match attributes")]
    #[test_case("text()", "//para/text()", Some(-0.5); "text")]
    #[test_case("para|verse|*", "//verse", Some(0.0); "best alternative")]
    #[test_case("para[2]", "//para[2]", Some(0.5); "positional")]
    #[test_case("para[1]", "//para[2]", None; "positional mismatch")]
    #[test_case("para[last()]", "//para[2]", Some(0.5); "last")]
    #[test_case("para[last()]", "//para[1]", None; "not last")]
    #[test_case("para[verse][@style='p']", "//para[2]", Some(0.5); "stacked predicates")]
    fn matches(pattern: &str, select: &str, expected: Option<f64>) {
        assert_eq!(priority_of(pattern, select), expected);
    }

    #[test]
    fn root_pattern_matches_only_the_document() {
        let doc = Document::parse(USX).unwrap();
        let evaluator = Evaluator::new(&doc);
        let pattern = Pattern::parse("/").unwrap();

        assert_eq!(
            pattern
                .match_priority(&evaluator, Item::Node(doc.root()))
                .unwrap(),
            Some(0.5)
        );
        let usx = doc.document_element().unwrap();
        assert_eq!(
            pattern.match_priority(&evaluator, Item::Node(usx)).unwrap(),
            None
        );
    }

    #[test]
    fn rejects_other_axes() {
        assert!(Pattern::parse("ancestor::para").is_err());
        assert!(Pattern::parse("para//").is_err());
    }
}
