//! Conversion between pointer (screen) coordinates and model coordinates.
//!
//! Screen space is what the renderer reports for pointer events, relative to the
//! top-left corner of the canvas element. Model space is where node positions
//! live and is what gets persisted. The [`Viewport`] is the affine map between
//! the two: `screen = model * zoom + (x, y)`.

use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn screen_to_flow(&self, screen: Point) -> Point {
        let zoom = self.effective_zoom();
        Point::new((screen.x - self.x) / zoom, (screen.y - self.y) / zoom)
    }

    pub fn flow_to_screen(&self, flow: Point) -> Point {
        let zoom = self.effective_zoom();
        Point::new(flow.x * zoom + self.x, flow.y * zoom + self.y)
    }

    /// Maps a pointer position given in client (window) coordinates, using the
    /// canvas element's top-left corner as `canvas_origin`.
    pub fn client_to_flow(&self, client: Point, canvas_origin: Point) -> Point {
        self.screen_to_flow(Point::new(
            client.x - canvas_origin.x,
            client.y - canvas_origin.y,
        ))
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Zooms by `factor` keeping the model point under `anchor` (screen space) fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let pinned = self.screen_to_flow(anchor);
        let zoom = (self.effective_zoom() * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (zoom - self.zoom).abs() <= f64::EPSILON {
            return;
        }
        self.zoom = zoom;
        self.x = anchor.x - pinned.x * zoom;
        self.y = anchor.y - pinned.y * zoom;
    }

    // Stored viewports come from clients; never divide by a degenerate zoom.
    fn effective_zoom(&self) -> f64 {
        if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_and_flow_are_inverse() {
        let viewport = Viewport {
            x: 120.0,
            y: -40.0,
            zoom: 1.5,
        };
        let flow = Point::new(33.0, 71.0);
        let screen = viewport.flow_to_screen(flow);
        let back = viewport.screen_to_flow(screen);
        assert!((back.x - flow.x).abs() < 1e-9);
        assert!((back.y - flow.y).abs() < 1e-9);
    }

    #[test]
    fn client_coordinates_subtract_canvas_origin() {
        let viewport = Viewport::default();
        let point = viewport.client_to_flow(Point::new(150.0, 90.0), Point::new(50.0, 40.0));
        assert_eq!(point, Point::new(100.0, 50.0));
    }

    #[test]
    fn zoom_keeps_anchor_fixed_and_clamps() {
        let mut viewport = Viewport::default();
        let anchor = Point::new(200.0, 100.0);
        let before = viewport.screen_to_flow(anchor);
        viewport.zoom_at(anchor, 1.5);
        let after = viewport.screen_to_flow(anchor);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);

        viewport.zoom_at(anchor, 100.0);
        assert_eq!(viewport.zoom, MAX_ZOOM);
        viewport.zoom_at(anchor, 0.0001);
        assert_eq!(viewport.zoom, MIN_ZOOM);
    }

    #[test]
    fn degenerate_zoom_is_treated_as_identity() {
        let viewport = Viewport {
            x: 10.0,
            y: 10.0,
            zoom: 0.0,
        };
        assert_eq!(viewport.screen_to_flow(Point::new(20.0, 30.0)), Point::new(10.0, 20.0));
    }
}
