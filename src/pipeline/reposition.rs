use std::collections::VecDeque;

use serde::Serialize;

use crate::{
    domain::Marker,
    xml::{Document, HierarchyError, NodeId},
};

/// What a repositioning pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositionReport {
    /// Marked nodes moved in front of a verse.
    pub moved: usize,
    /// Marked nodes left where they were.
    pub orphaned: usize,
}

/// Marked nodes waiting for the next verse, oldest first.
#[derive(Debug, Default)]
struct PendingQueue(VecDeque<NodeId>);

impl PendingQueue {
    fn push(&mut self, node: NodeId) {
        self.0.push_back(node);
    }

    fn drain(&mut self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.drain(..)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Moves every element carrying `marker` to sit immediately before the next
/// `verse_tag` element in document order, then strips the marker.
///
/// The tree is walked depth first. Marked elements are queued and still
/// descended into; each verse element takes the whole queue, in order, as
/// its preceding siblings, even when the marked elements started out under
/// a different parent. Marked elements with no later verse stay where they
/// are and keep their marker, as does a marked element that contains the
/// verse it would precede. A marked verse is already where it belongs, so it
/// only loses its marker. Running the pass again changes nothing.
///
/// # Errors
///
/// Returns a [`HierarchyError`] if the tree cannot be rearranged, which
/// indicates a corrupt document.
pub fn reposition(
    doc: &mut Document,
    marker: Marker,
    verse_tag: &str,
) -> Result<RepositionReport, HierarchyError> {
    let mut pass = Pass {
        marker,
        verse_tag,
        queue: PendingQueue::default(),
        report: RepositionReport::default(),
    };
    let root = doc.root();
    pass.visit(doc, root)?;

    pass.report.orphaned += pass.queue.len();
    for node in pass.queue.drain() {
        tracing::warn!(
            "No verse follows <{}>; leaving it in place",
            doc.name(node).unwrap_or_default()
        );
    }
    Ok(pass.report)
}

struct Pass<'a> {
    marker: Marker,
    verse_tag: &'a str,
    queue: PendingQueue,
    report: RepositionReport,
}

impl Pass<'_> {
    fn visit(&mut self, doc: &mut Document, node: NodeId) -> Result<(), HierarchyError> {
        // Nodes inserted before a verse land in a list that has already been
        // copied, so each element is visited once.
        let children = doc.children(node).to_vec();
        for child in children {
            let Some(element) = doc.element(child) else {
                continue;
            };
            let marked = element.attribute(self.marker.attribute) == Some(self.marker.value);
            let verse = element.local_name() == self.verse_tag;
            // A marked verse joins the queue and then takes it.
            if marked {
                self.queue.push(child);
            }
            if verse {
                self.place_before(doc, child)?;
            }
            self.visit(doc, child)?;
        }
        Ok(())
    }

    fn place_before(&mut self, doc: &mut Document, verse: NodeId) -> Result<(), HierarchyError> {
        let pending: Vec<NodeId> = self.queue.drain().collect();
        for node in pending {
            if node == verse {
                doc.remove_attribute(node, self.marker.attribute);
                self.report.moved += 1;
                continue;
            }
            if doc.is_ancestor_or_self(node, verse) {
                tracing::warn!(
                    "<{}> contains the verse it precedes; leaving it in place",
                    doc.name(node).unwrap_or_default()
                );
                self.report.orphaned += 1;
                continue;
            }
            doc.insert_before(verse, node)?;
            doc.remove_attribute(node, self.marker.attribute);
            self.report.moved += 1;
        }
        Ok(())
    }
}
