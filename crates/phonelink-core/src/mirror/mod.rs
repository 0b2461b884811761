//! Local mirror of the drawable entities on the display
//!
//! The display owns sprites, lines, the grid and its configuration. The
//! mirror is a best-effort copy updated from both outbound commands and
//! inbound notifications, so reads never need a round trip.

pub mod display;
pub mod grid;
pub mod sprite;

pub use display::{DisplayConfig, DisplayConfigUpdate};
pub use grid::{Cell, Grid, GridInput, GridTarget};
pub use sprite::{Entity, Line, Movement, Sprite, SpriteForm};

use crate::error::Result;

/// Records kept in insertion order, at most one per id.
#[derive(Debug, Clone)]
pub struct EntityStore<T> {
    items: Vec<T>,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> EntityStore<T> {
    /// Merge into the record with the same id, or append a new one.
    pub fn upsert(&mut self, record: &T) {
        match self.items.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => existing.merge_from(record),
            None => self.items.push(record.clone()),
        }
    }

    /// Remove by id, returning the record as it was before removal.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.items.iter().position(|r| r.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn all(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace the whole set.
    pub fn replace_all(&mut self, records: Vec<T>) {
        self.items.clear();
        for record in &records {
            self.upsert(record);
        }
    }
}

/// Sprites, lines, grid and display configuration as last known.
#[derive(Debug, Clone, Default)]
pub struct LocalMirror {
    pub sprites: EntityStore<Sprite>,
    pub lines: EntityStore<Line>,
    grid: Grid,
    display: DisplayConfig,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_sprite(&mut self, sprite: &Sprite) {
        self.sprites.upsert(sprite);
    }

    pub fn remove_sprite(&mut self, id: &str) -> Option<Sprite> {
        self.sprites.remove(id)
    }

    pub fn sprite(&self, id: &str) -> Option<&Sprite> {
        self.sprites.get(id)
    }

    pub fn upsert_line(&mut self, line: &Line) {
        self.lines.upsert(line);
    }

    pub fn remove_line(&mut self, id: &str) -> Option<Line> {
        self.lines.remove(id)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Replace the grid wholesale. Empty input leaves the current grid alone.
    pub fn set_grid(&mut self, input: &GridInput) {
        let grid = Grid::from_input(input);
        if grid.rows() > 0 {
            self.grid = grid;
        }
    }

    pub fn apply_grid_write(&mut self, target: GridTarget, cell: Cell) -> Result<(usize, usize)> {
        self.grid.write(target, cell)
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn configure_display(&mut self, update: &DisplayConfigUpdate) {
        self.display.apply(update);
    }

    /// Back to the default configuration with no sprites or lines.
    pub fn clear_display(&mut self) {
        self.display = DisplayConfig::default();
        self.sprites.clear();
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_is_fieldwise() {
        let mut mirror = LocalMirror::new();
        mirror.upsert_sprite(&Sprite {
            id: "a".into(),
            pos_x: Some(1.0),
            ..Default::default()
        });
        mirror.upsert_sprite(&Sprite {
            id: "a".into(),
            pos_y: Some(2.0),
            ..Default::default()
        });
        let sprite = mirror.sprite("a").unwrap();
        assert_eq!(sprite.pos_x, Some(1.0));
        assert_eq!(sprite.pos_y, Some(2.0));
        assert_eq!(mirror.sprites.len(), 1);
    }

    #[test]
    fn test_remove_returns_snapshot() {
        let mut mirror = LocalMirror::new();
        mirror.upsert_sprite(&Sprite::new("a").colored("red"));
        let removed = mirror.remove_sprite("a").unwrap();
        assert_eq!(removed.color.as_deref(), Some("red"));
        assert!(mirror.sprite("a").is_none());
        assert!(mirror.remove_sprite("a").is_none());
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut mirror = LocalMirror::new();
        mirror.upsert_sprite(&Sprite::new("b"));
        mirror.upsert_sprite(&Sprite::new("a"));
        mirror.upsert_sprite(&Sprite::new("b").colored("blue"));
        let ids: Vec<_> = mirror.sprites.all().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(mirror.sprites.first().map(|s| s.id.as_str()), Some("b"));
    }

    #[test]
    fn test_clear_display_resets_everything() {
        let mut mirror = LocalMirror::new();
        mirror.upsert_sprite(&Sprite::new("a"));
        mirror.upsert_line(&Line::new(0.0, 0.0, 1.0, 1.0).with_id("l"));
        mirror.configure_display(&DisplayConfigUpdate::sized(10.0, 10.0));
        mirror.clear_display();
        assert!(mirror.sprites.is_empty());
        assert!(mirror.lines.is_empty());
        assert_eq!(mirror.display(), &DisplayConfig::default());
    }

    #[test]
    fn test_empty_grid_input_keeps_grid() {
        let mut mirror = LocalMirror::new();
        mirror.set_grid(&GridInput::from("12"));
        mirror.set_grid(&GridInput::Rows(Vec::new()));
        assert_eq!(mirror.grid().columns(), 2);
    }
}
