//! Batch builders for sprites and lines
//!
//! A batch stages records and sends them as one `sprites` / `lines` message
//! on [`SpriteBatch::finish`]. Dropping a batch without finishing it sends
//! nothing and leaves the mirror untouched.

use phonelink_core::prelude::*;
use phonelink_core::{Line, Payload, Sprite};

use super::commands::generate_id;
use super::Connector;

/// Staged sprites; see [`Connector::add_sprites`].
#[derive(Debug)]
#[must_use = "a batch sends nothing until finish() is called"]
pub struct SpriteBatch<'a> {
    connector: &'a Connector,
    staged: Vec<Sprite>,
}

impl SpriteBatch<'_> {
    /// Stage a sprite; returns its id (generated when empty).
    pub fn add(&mut self, mut sprite: Sprite) -> String {
        if sprite.id.is_empty() {
            let state = self.connector.state();
            let staged = &self.staged;
            sprite.id = generate_id("sprite", |id| {
                state.mirror.sprites.contains(id) || staged.iter().any(|s| s.id == id)
            });
        }
        let id = sprite.id.clone();
        self.staged.push(sprite);
        id
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Mirror and send every staged sprite. Returns their ids in order.
    pub fn finish(self) -> Result<Vec<String>> {
        let ids = self.staged.iter().map(|s| s.id.clone()).collect();
        if !self.staged.is_empty() {
            self.connector.command(Payload::Sprites(self.staged))?;
        }
        Ok(ids)
    }
}

/// Staged lines; see [`Connector::add_lines`].
#[derive(Debug)]
#[must_use = "a batch sends nothing until finish() is called"]
pub struct LineBatch<'a> {
    connector: &'a Connector,
    staged: Vec<Line>,
}

impl LineBatch<'_> {
    pub fn add(&mut self, mut line: Line) -> String {
        if line.id.is_empty() {
            let state = self.connector.state();
            let staged = &self.staged;
            line.id = generate_id("line", |id| {
                state.mirror.lines.contains(id) || staged.iter().any(|l| l.id == id)
            });
        }
        let id = line.id.clone();
        self.staged.push(line);
        id
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn finish(self) -> Result<Vec<String>> {
        let ids = self.staged.iter().map(|l| l.id.clone()).collect();
        if !self.staged.is_empty() {
            self.connector.command(Payload::Lines(self.staged))?;
        }
        Ok(ids)
    }
}

impl Connector {
    /// Start a sprite batch.
    pub fn add_sprites(&self) -> SpriteBatch<'_> {
        SpriteBatch {
            connector: self,
            staged: Vec::new(),
        }
    }

    /// Start a line batch.
    pub fn add_lines(&self) -> LineBatch<'_> {
        LineBatch {
            connector: self,
            staged: Vec::new(),
        }
    }
}
