//! Color grid
//!
//! Callers describe grids in several shapes (text art, rows of strings,
//! explicit cells). [`GridInput::normalize`] turns any of them into the
//! rectangular matrix kept by [`Grid`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Brightness 0-9 of the grid's base color.
    Brightness(u8),
    /// Any CSS color string.
    Css(String),
    Rgb(u8, u8, u8),
    Rgba(u8, u8, u8, f64),
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Brightness(0)
    }
}

impl From<u8> for Cell {
    fn from(value: u8) -> Self {
        Cell::Brightness(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Css(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Css(value)
    }
}

impl From<(u8, u8, u8)> for Cell {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Cell::Rgb(r, g, b)
    }
}

/// Grid description as supplied by a caller or received on the wire.
///
/// Variant order matters for untagged decoding: a bare string is text art,
/// a list of strings is one text row per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridInput {
    Text(String),
    Rows(Vec<Vec<Cell>>),
    Lines(Vec<String>),
    Row(Vec<Cell>),
    Single(Cell),
}

impl GridInput {
    /// Canonical rectangular matrix for this input.
    pub fn normalize(&self) -> Vec<Vec<Cell>> {
        let rows = match self {
            GridInput::Text(text) => text_art_rows(text),
            GridInput::Lines(lines) => lines.iter().map(|l| chars_to_cells(l)).collect(),
            GridInput::Rows(rows) => rows.clone(),
            GridInput::Row(row) => vec![row.clone()],
            GridInput::Single(cell) => vec![vec![cell.clone()]],
        };
        pad_rectangular(rows)
    }
}

impl From<&str> for GridInput {
    fn from(value: &str) -> Self {
        GridInput::Text(value.to_string())
    }
}

impl From<Vec<Vec<Cell>>> for GridInput {
    fn from(value: Vec<Vec<Cell>>) -> Self {
        GridInput::Rows(value)
    }
}

/// Splits text art into cell rows.
///
/// Leading and trailing blank lines are dropped and the indentation shared
/// by all remaining lines is removed.
fn text_art_rows(text: &str) -> Vec<Vec<Cell>> {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return Vec::new();
    };
    let body = &lines[start..=end];

    let indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|l| chars_to_cells(l.get(indent..).unwrap_or("")))
        .collect()
}

fn chars_to_cells(line: &str) -> Vec<Cell> {
    line.chars()
        .map(|c| match c {
            ' ' => Cell::Brightness(0),
            c => match c.to_digit(10) {
                Some(d) => Cell::Brightness(d as u8),
                None => Cell::Brightness(9),
            },
        })
        .collect()
}

fn pad_rectangular(mut rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, Cell::default());
    }
    rows
}

/// Where a cell write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTarget {
    At { row: usize, column: usize },
    /// 1-indexed, counted left to right then top to bottom.
    CellNumber(usize),
}

/// Rectangular matrix of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    cells: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_input(input: &GridInput) -> Self {
        Self {
            cells: input.normalize(),
        }
    }

    /// `rows` × `columns` grid with every cell set to `cell`.
    pub fn filled(rows: usize, columns: usize, cell: Cell) -> Self {
        Self {
            cells: vec![vec![cell; columns]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.columns() == 0
    }

    pub fn cells(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(column))
    }

    /// Cell by 1-indexed number; `None` on an empty grid or out of range.
    pub fn get_cell_number(&self, number: usize) -> Option<&Cell> {
        let columns = self.columns();
        if number == 0 || columns == 0 {
            return None;
        }
        self.get((number - 1) / columns, (number - 1) % columns)
    }

    /// Row and column a target refers to.
    ///
    /// Cell numbers are resolved against the current column count (one
    /// column when the grid is still empty).
    pub fn resolve(&self, target: GridTarget) -> Result<(usize, usize)> {
        match target {
            GridTarget::At { row, column } => Ok((row, column)),
            GridTarget::CellNumber(0) => {
                Err(Error::invalid_grid_write("cell numbers start at 1"))
            }
            GridTarget::CellNumber(number) => {
                let columns = self.columns().max(1);
                Ok(((number - 1) / columns, (number - 1) % columns))
            }
        }
    }

    /// Writes one cell, growing the grid with default cells as needed.
    pub fn write(&mut self, target: GridTarget, cell: Cell) -> Result<(usize, usize)> {
        let (row, column) = self.resolve(target)?;

        let width = self.columns().max(column + 1);
        for r in &mut self.cells {
            if r.len() < width {
                r.resize(width, Cell::default());
            }
        }
        while self.cells.len() <= row {
            self.cells.push(vec![Cell::default(); width]);
        }

        self.cells[row][column] = cell;
        Ok((row, column))
    }
}
