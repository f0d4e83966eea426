use std::{fmt, str::FromStr};

use super::{Document, NodeId};

/// An absolute path of element steps, such as `/biblicaDocument/scripture`.
///
/// Each step names a child element (or `*` for any element); the first
/// matching child is followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorPath {
    steps: Vec<String>,
}

impl AnchorPath {
    /// Finds the node this path points at.
    #[must_use]
    pub fn resolve(&self, document: &Document) -> Option<NodeId> {
        self.steps.iter().try_fold(document.root(), |node, step| {
            document
                .child_elements(node)
                .find(|&child| step == "*" || document.name(child) == Some(step.as_str()))
        })
    }
}

impl FromStr for AnchorPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| PathError(s.to_string()))?;
        let steps: Vec<String> = rest.split('/').map(str::to_string).collect();
        let valid = |step: &String| {
            step == "*"
                || (!step.is_empty()
                    && step
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        };
        if !steps.iter().all(valid) {
            return Err(PathError(s.to_string()));
        }
        Ok(Self { steps })
    }
}

impl fmt::Display for AnchorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// The string is not an absolute element path.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid anchor path '{0}': expected '/name/name...'")]
pub struct PathError(String);

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    const DOC: &str = "<biblicaDocument><header/><scripture><book/></scripture></biblicaDocument>";

    #[test_case("/biblicaDocument/scripture", Some("scripture"); "nested")]
    #[test_case("/biblicaDocument", Some("biblicaDocument"); "document element")]
    #[test_case("/*/scripture", Some("scripture"); "wildcard")]
    #[test_case("/usx", None; "wrong root")]
    #[test_case("/biblicaDocument/book", None; "not a direct child")]
    fn resolves(path: &str, expected: Option<&str>) {
        let doc = Document::parse(DOC).unwrap();
        let path: AnchorPath = path.parse().unwrap();

        let found = path.resolve(&doc).and_then(|node| doc.name(node));
        assert_eq!(found, expected);
    }

    #[test_case("usx"; "relative")]
    #[test_case("/"; "empty step")]
    #[test_case("/a//b"; "descendant step")]
    #[test_case("/a[1]"; "predicate")]
    fn rejects(path: &str) {
        assert!(path.parse::<AnchorPath>().is_err());
    }

    #[test]
    fn displays_as_written() {
        let path: AnchorPath = "/biblicaDocument/scripture".parse().unwrap();
        assert_eq!(path.to_string(), "/biblicaDocument/scripture");
    }
}
