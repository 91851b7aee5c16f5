//! Boundary to whatever draws the graph.
//!
//! The editing core never draws. A [`Renderer`] is told which elements exist and
//! where the viewport sits; [`forward_changes`] adapts store notifications into
//! those calls so a renderer only has to be subscribed once.

use std::cell::RefCell;
use std::rc::Rc;

use crate::geometry::Viewport;
use crate::store::GraphChange;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    Node(String),
    Edge(String),
}

pub trait Renderer {
    /// Adds or redraws an element. Renderers treat repeated adds as updates.
    fn add_element(&mut self, element: &Element);

    fn remove_element(&mut self, element: &Element);

    /// Drops every element. Followed by a re-add of the current graph.
    fn clear(&mut self);

    fn apply_viewport(&mut self, viewport: Viewport);
}

/// Builds a store listener that replays changes onto `renderer`. A reload
/// clears the renderer and re-adds every element named in the `Reset`.
pub fn forward_changes<R>(renderer: Rc<RefCell<R>>) -> impl FnMut(&GraphChange) + 'static
where
    R: Renderer + 'static,
{
    move |change| {
        let mut renderer = renderer.borrow_mut();
        match change {
            GraphChange::NodeAdded(id) | GraphChange::NodeUpdated(id) => {
                renderer.add_element(&Element::Node(id.clone()))
            }
            GraphChange::NodeRemoved(id) => renderer.remove_element(&Element::Node(id.clone())),
            GraphChange::EdgeAdded(id) | GraphChange::EdgeUpdated(id) => {
                renderer.add_element(&Element::Edge(id.clone()))
            }
            GraphChange::EdgeRemoved(id) => renderer.remove_element(&Element::Edge(id.clone())),
            GraphChange::ViewportChanged(viewport) => renderer.apply_viewport(*viewport),
            GraphChange::Reset {
                nodes,
                edges,
                viewport,
            } => {
                renderer.clear();
                for id in nodes {
                    renderer.add_element(&Element::Node(id.clone()));
                }
                for id in edges {
                    renderer.add_element(&Element::Edge(id.clone()));
                }
                renderer.apply_viewport(*viewport);
            }
        }
    }
}
