//! Display Router
//!
//! Owns the numbered pages of components, renders the current page and
//! routes touches to it.
//!
//! # Dispatch
//!
//! Each page keeps its components in insertion order plus a per-cell index
//! of positions into that list. Drawing walks the list forwards, so later
//! components paint over earlier ones; touch dispatch walks the cell's stack
//! backwards, so the component on top gets the first chance to claim it.
//! Components without a position span the grid and sit in every cell's
//! stack.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use parking_lot::Mutex;

use crate::component::{Component, ComponentContext, Notice, VisualComponent};
use crate::config::{ConfigError, DeckConfig};
use crate::frame::Frame;
use crate::geometry::{Cell, GridGeometry};
use crate::overlay::Overlay;
use crate::render::RenderSignal;
use crate::system::{TrackInfo, VolumeLevel};

/// Router shared between the render loop and the event wiring
pub type SharedRouter = Arc<Mutex<DisplayRouter>>;

const BACKGROUND: Rgb888 = Rgb888::BLACK;
const GRID_LINES: Rgb888 = Rgb888::new(0x28, 0x28, 0x28);

/// One page: components in layering order and the cell index over them
#[derive(Debug, Default)]
pub struct Page {
    components: Vec<Component>,
    index: HashMap<Cell, Vec<usize>>,
}

impl Page {
    /// Components in insertion order
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Components at `cell`, topmost first
    pub fn stack_at(&self, cell: Cell) -> impl Iterator<Item = &Component> + '_ {
        self.index
            .get(&cell)
            .into_iter()
            .flat_map(|stack| stack.iter().rev())
            .map(|&idx| &self.components[idx])
    }

    fn add(&mut self, component: Component, geometry: &GridGeometry) {
        let idx = self.components.len();
        match component.position() {
            Some(cell) => self.index.entry(cell).or_default().push(idx),
            None => {
                for row in 0..geometry.rows() {
                    for col in 0..geometry.columns() {
                        self.index.entry(Cell::new(col, row)).or_default().push(idx);
                    }
                }
            }
        }
        self.components.push(component);
    }

    fn clear(&mut self) {
        for component in &self.components {
            component.cleanup();
        }
        self.components.clear();
        self.index.clear();
    }
}

/// Paged grid layout
pub struct DisplayRouter {
    geometry: GridGeometry,
    pages: BTreeMap<u32, Page>,
    current: u32,
    signal: RenderSignal,
}

impl DisplayRouter {
    /// Create a router with an empty page 1 as the current page
    #[must_use]
    pub fn new(geometry: GridGeometry, signal: RenderSignal) -> Self {
        let mut pages = BTreeMap::new();
        pages.insert(1, Page::default());
        Self {
            geometry,
            pages,
            current: 1,
            signal,
        }
    }

    /// Wrap for sharing
    #[must_use]
    pub fn shared(self) -> SharedRouter {
        Arc::new(Mutex::new(self))
    }

    /// Grid geometry
    #[must_use]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// The active page number
    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current
    }

    /// Known page numbers in ascending order
    #[must_use]
    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.keys().copied().collect()
    }

    /// A page, if it has been referenced
    #[must_use]
    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages.get(&number)
    }

    /// Register a component on top of `page`'s existing layers
    pub fn add_component(&mut self, component: Component, page: u32) {
        tracing::trace!(page, component = component.name(), "Component added");
        self.pages
            .entry(page)
            .or_default()
            .add(component, &self.geometry);
    }

    /// Draw the current page: background, grid lines, then components in
    /// insertion order.
    ///
    /// A failing component is logged and skipped.
    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
        D::Error: fmt::Debug,
    {
        target.clear(BACKGROUND)?;
        self.geometry.draw_grid(target, GRID_LINES)?;

        let Some(page) = self.pages.get(&self.current) else {
            return Ok(());
        };
        for component in &page.components {
            let area = component
                .position()
                .map_or_else(|| self.geometry.grid_area(), |cell| self.geometry.cell_rect(cell));
            if let Err(e) = component.draw(target, area) {
                tracing::warn!(
                    page = self.current,
                    component = component.name(),
                    error = ?e,
                    "Component failed to draw"
                );
            }
        }
        Ok(())
    }

    /// Render the current page into a fresh frame
    #[must_use]
    pub fn render(&self) -> Frame {
        let mut frame = Frame::new(self.geometry.screen_size());
        if let Err(never) = self.draw(&mut frame) {
            match never {}
        }
        frame
    }

    /// Dispatch a touch at `cell` topmost-first; true if a component claimed it
    pub fn handle_touch(&mut self, cell: Cell) -> bool {
        let Some(page) = self.pages.get_mut(&self.current) else {
            return false;
        };
        let Some(stack) = page.index.get(&cell) else {
            return false;
        };

        for &idx in stack.iter().rev() {
            let component = &mut page.components[idx];
            if component.handle_touch(cell) {
                tracing::debug!(
                    page = self.current,
                    %cell,
                    component = component.name(),
                    "Touch handled"
                );
                return true;
            }
        }
        false
    }

    /// Map a touch in screen pixels to a cell and dispatch it.
    ///
    /// Touches outside the grid are dropped without dispatching.
    pub fn handle_touch_at(&mut self, point: Point) -> bool {
        match self.geometry.cell_at(point) {
            Some(cell) => self.handle_touch(cell),
            None => {
                tracing::trace!(x = point.x, y = point.y, "Touch outside grid ignored");
                false
            }
        }
    }

    /// Make `page` current and request an immediate render.
    ///
    /// Returns false (and does nothing) if `page` is already current.
    pub fn switch_page(&mut self, page: u32) -> bool {
        if page == self.current {
            return false;
        }
        self.pages.entry(page).or_default();
        let previous = std::mem::replace(&mut self.current, page);
        tracing::info!(from = previous, to = page, "Switched page");
        self.signal.request();
        true
    }

    /// Remove every component of `page`, cancelling their overlay timers
    pub fn clear_page(&mut self, page: u32) {
        if let Some(p) = self.pages.get_mut(&page) {
            p.clear();
            if page == self.current {
                self.signal.request();
            }
        }
    }

    /// Replace all pages with freshly built ones.
    ///
    /// Old components' timers are cancelled first. The current page number
    /// is kept (as an empty page if the new set lacks it).
    pub fn rebuild(&mut self, pages: BTreeMap<u32, Vec<Component>>) {
        self.cleanup();
        self.pages.clear();
        self.pages.insert(1, Page::default());
        self.pages.entry(self.current).or_default();

        for (number, components) in pages {
            for component in components {
                self.add_component(component, number);
            }
        }
        tracing::info!(pages = self.pages.len(), current = self.current, "Pages rebuilt");
        self.signal.request();
    }

    /// Find a component by name on the current page
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Component> {
        self.find_on(self.current, name)
    }

    /// Find a component by name on a given page
    #[must_use]
    pub fn find_on(&self, page: u32, name: &str) -> Option<&Component> {
        self.pages
            .get(&page)?
            .components
            .iter()
            .find(|c| c.name() == name)
    }

    /// The first volume overlay on the current page
    #[must_use]
    pub fn volume_overlay(&self) -> Option<Overlay<VolumeLevel>> {
        self.first_on_current(Component::volume_overlay)
    }

    /// The first media overlay on the current page
    #[must_use]
    pub fn media_overlay(&self) -> Option<Overlay<TrackInfo>> {
        self.first_on_current(Component::media_overlay)
    }

    /// The first notification overlay on the current page
    #[must_use]
    pub fn notification_overlay(&self) -> Option<Overlay<Notice>> {
        self.first_on_current(Component::notification_overlay)
    }

    fn first_on_current<P: Send + Sync + 'static>(
        &self,
        pick: impl Fn(&Component) -> Option<&Overlay<P>>,
    ) -> Option<Overlay<P>> {
        self.pages
            .get(&self.current)?
            .components
            .iter()
            .find_map(|c| pick(c).cloned())
    }

    /// Cancel every overlay timer on every page
    pub fn cleanup(&self) {
        for page in self.pages.values() {
            for component in &page.components {
                component.cleanup();
            }
        }
    }
}

impl fmt::Debug for DisplayRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayRouter")
            .field("geometry", &self.geometry)
            .field("pages", &self.page_numbers())
            .field("current", &self.current)
            .finish()
    }
}

/// Build every configured page's components, in file order
///
/// # Errors
///
/// Returns the first descriptor that fails to build.
pub fn build_pages(
    config: &DeckConfig,
    ctx: &ComponentContext,
) -> Result<BTreeMap<u32, Vec<Component>>, ConfigError> {
    let mut pages = BTreeMap::new();
    for page in &config.pages {
        let components = page
            .components
            .iter()
            .map(|descriptor| Component::from_descriptor(descriptor, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        pages.insert(page.number, components);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Action, ActionSink};
    use crate::config::{ComponentDescriptor, ComponentKind, OverlayTimings};
    use crate::device::HapticPattern;
    use tokio::sync::mpsc;

    struct Fixture {
        router: DisplayRouter,
        ctx: ComponentContext,
        actions: mpsc::UnboundedReceiver<Action>,
        signal: RenderSignal,
    }

    impl Fixture {
        fn new() -> Self {
            let signal = RenderSignal::new();
            let (sink, actions) = ActionSink::channel();
            let ctx = ComponentContext {
                sink,
                signal: signal.clone(),
                overlays: OverlayTimings::default(),
            };
            let geometry = GridGeometry::new(90, 4, 2, Size::new(480, 180));
            Self {
                router: DisplayRouter::new(geometry, signal.clone()),
                ctx,
                actions,
                signal,
            }
        }

        fn component(&self, name: &str, kind: ComponentKind, position: Option<Cell>, options: &str) -> Component {
            let descriptor = ComponentDescriptor {
                name: name.into(),
                kind,
                position,
                options: toml::from_str(options).unwrap(),
                command: None,
            };
            Component::from_descriptor(&descriptor, &self.ctx).unwrap()
        }

        fn button(&self, name: &str, cell: Cell, action: Option<&str>) -> Component {
            let options = match action {
                Some(a) => format!("label = \"{name}\"\naction = \"{a}\""),
                None => format!("label = \"{name}\""),
            };
            self.component(name, ComponentKind::Button, Some(cell), &options)
        }

        /// Actions emitted so far, minus haptic pulses
        fn drain_actions(&mut self) -> Vec<Action> {
            let mut out = Vec::new();
            while let Ok(action) = self.actions.try_recv() {
                if action != Action::Haptic(HapticPattern::Short) {
                    out.push(action);
                }
            }
            out
        }
    }

    #[test]
    fn test_topmost_component_claims_first() {
        let mut fx = Fixture::new();
        let cell = Cell::new(0, 0);
        let below = fx.button("below", cell, Some("page:2"));
        let above = fx.button("above", cell, Some("page:3"));
        fx.router.add_component(below, 1);
        fx.router.add_component(above, 1);

        assert!(fx.router.handle_touch(cell));
        assert_eq!(fx.drain_actions(), vec![Action::SwitchPage(3)]);
    }

    #[test]
    fn test_declining_layer_falls_through() {
        let mut fx = Fixture::new();
        let cell = Cell::new(1, 1);
        let below = fx.button("below", cell, Some("mute"));
        let above = fx.button("inert", cell, None);
        fx.router.add_component(below, 1);
        fx.router.add_component(above, 1);

        assert!(fx.router.handle_touch(cell));
        assert_eq!(fx.drain_actions(), vec![Action::ToggleMute]);
    }

    #[test]
    fn test_unclaimed_touch_has_no_side_effects() {
        let mut fx = Fixture::new();
        let inert = fx.button("inert", Cell::new(0, 0), None);
        fx.router.add_component(inert, 1);

        assert!(!fx.router.handle_touch(Cell::new(0, 0)));
        assert!(!fx.router.handle_touch(Cell::new(3, 1)));
        assert!(fx.drain_actions().is_empty());
    }

    #[test]
    fn test_touch_only_reaches_current_page() {
        let mut fx = Fixture::new();
        let other = fx.button("other", Cell::new(0, 0), Some("mute"));
        fx.router.add_component(other, 2);

        assert!(!fx.router.handle_touch(Cell::new(0, 0)));
        fx.router.switch_page(2);
        assert!(fx.router.handle_touch(Cell::new(0, 0)));
    }

    #[test]
    fn test_touch_outside_grid_dispatches_nothing() {
        let mut fx = Fixture::new();
        let edge = fx.button("edge", Cell::new(0, 0), Some("mute"));
        fx.router.add_component(edge, 1);

        // Left margin is 60px wide
        assert!(!fx.router.handle_touch_at(Point::new(30, 10)));
        assert!(!fx.router.handle_touch_at(Point::new(70, 500)));
        assert!(fx.drain_actions().is_empty());

        assert!(fx.router.handle_touch_at(Point::new(70, 10)));
        assert_eq!(fx.drain_actions(), vec![Action::ToggleMute]);
    }

    #[test]
    fn test_switch_to_current_page_is_noop() {
        let mut fx = Fixture::new();
        let before = fx.signal.requests();
        assert!(!fx.router.switch_page(1));
        assert_eq!(fx.signal.requests(), before);
        assert_eq!(fx.router.page_numbers(), vec![1]);
    }

    #[test]
    fn test_switch_page_initializes_lazily_and_requests_render() {
        let mut fx = Fixture::new();
        assert!(fx.router.switch_page(4));
        assert_eq!(fx.router.current_page(), 4);
        assert_eq!(fx.router.page_numbers(), vec![1, 4]);
        assert_eq!(fx.signal.requests(), 1);
    }

    #[tokio::test]
    async fn test_unpositioned_overlay_covers_every_cell() {
        let mut fx = Fixture::new();
        let button = fx.button("btn", Cell::new(2, 1), Some("mute"));
        let volume = fx.component("vol", ComponentKind::Volume, None, "");
        fx.router.add_component(button, 1);
        fx.router.add_component(volume, 1);

        // Hidden overlay declines, the button beneath gets it
        assert!(fx.router.handle_touch(Cell::new(2, 1)));
        assert_eq!(fx.drain_actions(), vec![Action::ToggleMute]);

        // Visible overlay intercepts and dismisses
        let overlay = fx.router.volume_overlay().unwrap();
        overlay.show_temporarily(None);
        assert!(fx.router.handle_touch(Cell::new(2, 1)));
        assert!(!overlay.is_visible());
        assert!(fx.drain_actions().is_empty());

        let page = fx.router.page(1).unwrap();
        assert_eq!(page.stack_at(Cell::new(0, 0)).count(), 1);
        assert_eq!(page.stack_at(Cell::new(2, 1)).count(), 2);
    }

    #[tokio::test]
    async fn test_later_components_paint_on_top() {
        let mut fx = Fixture::new();
        let cell = Cell::new(0, 0);
        let below = fx.component("below", ComponentKind::Label, Some(cell), "text = \"\"\nbackground = \"#ff0000\"");
        let above = fx.component("above", ComponentKind::Label, Some(cell), "text = \"\"\nbackground = \"#0000ff\"");
        fx.router.add_component(below, 1);
        fx.router.add_component(above, 1);

        let frame = fx.router.render();
        let center = fx.router.geometry().cell_rect(cell).center();
        assert_eq!(frame.pixel(center), Some(Rgb888::new(0, 0, 255)));
        assert_eq!(frame.count_color(Rgb888::new(255, 0, 0)), 0);
    }

    #[tokio::test]
    async fn test_rebuild_cancels_old_timers() {
        let mut fx = Fixture::new();
        let volume = fx.component("vol", ComponentKind::Volume, None, "");
        fx.router.add_component(volume, 1);
        let old = fx.router.volume_overlay().unwrap();
        old.show_temporarily(None);
        assert!(old.has_pending_timer());

        let fresh = fx.button("fresh", Cell::new(0, 0), Some("mute"));
        let mut pages = BTreeMap::new();
        pages.insert(2, vec![fresh]);
        fx.router.rebuild(pages);

        assert!(!old.has_pending_timer());
        assert!(fx.router.find("vol").is_none());
        assert!(fx.router.find_on(2, "fresh").is_some());
        assert_eq!(fx.router.page_numbers(), vec![1, 2]);
        assert_eq!(fx.router.current_page(), 1);
    }

    #[test]
    fn test_clear_page_empties_index() {
        let mut fx = Fixture::new();
        let button = fx.button("btn", Cell::new(0, 0), Some("mute"));
        fx.router.add_component(button, 1);
        fx.router.clear_page(1);

        assert!(fx.router.page(1).unwrap().components().is_empty());
        assert!(!fx.router.handle_touch(Cell::new(0, 0)));
    }

    #[test]
    fn test_build_pages_from_config() {
        let fx = Fixture::new();
        let config = crate::config::parse_config(
            r#"
[[pages]]
number = 3
[[pages.components]]
name = "hello"
type = "label"
position = { col = 0, row = 0 }
options = { text = "hi" }
"#,
        )
        .unwrap();

        let pages = build_pages(&config, &fx.ctx).unwrap();
        assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(pages[&3][0].name(), "hello");
    }
}
