use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::str::FromStr;

use crate::error::{SearchError, SearchResult};

/// Static obstacle grid. Rows index `y`, columns index `x`.
///
/// Anything outside `[0, rows) x [0, cols)` is reported as blocked, so
/// searches never need a separate bounds check before asking about a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleMap {
    rows: usize,
    cols: usize,
    blocked: Vec<bool>,
}

impl ObstacleMap {
    pub fn new(rows: usize, cols: usize) -> Self {
        ObstacleMap {
            rows,
            cols,
            blocked: vec![false; rows * cols],
        }
    }

    /// Builds a map from a list of blocked `(x, y)` cells.
    pub fn from_blocked(rows: usize, cols: usize, cells: &[(i32, i32)]) -> SearchResult<Self> {
        let mut map = ObstacleMap::new(rows, cols);
        for &(x, y) in cells {
            if !map.block_xy(x, y) {
                return Err(SearchError::OutOfBounds {
                    what: "obstacle",
                    x,
                    y,
                });
            }
        }
        Ok(map)
    }

    /// Loads a MovingAI `.map` file. `.`, `G` and `S` are passable.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open map file {path}"))?;
        let reader = BufReader::new(file);
        let mut text = String::new();
        for line in reader.lines() {
            text.push_str(&line?);
            text.push('\n');
        }
        text.parse()
            .with_context(|| format!("error with map file: {path}"))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn index(&self, row: i32, col: i32) -> Option<usize> {
        if self.vertex_exists(row, col) {
            Some(row as usize * self.cols + col as usize)
        } else {
            None
        }
    }

    /// Returns false if the cell is outside the map.
    pub fn block(&mut self, row: i32, col: i32) -> bool {
        match self.index(row, col) {
            Some(idx) => {
                self.blocked[idx] = true;
                true
            }
            None => false,
        }
    }

    pub fn unblock(&mut self, row: i32, col: i32) -> bool {
        match self.index(row, col) {
            Some(idx) => {
                self.blocked[idx] = false;
                true
            }
            None => false,
        }
    }

    pub fn block_xy(&mut self, x: i32, y: i32) -> bool {
        self.block(y, x)
    }

    pub fn is_blocked(&self, row: i32, col: i32) -> bool {
        self.index(row, col).map_or(true, |idx| self.blocked[idx])
    }

    pub fn is_blocked_xy(&self, x: i32, y: i32) -> bool {
        self.is_blocked(y, x)
    }

    pub fn vertex_exists(&self, row: i32, col: i32) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.cols
    }

    pub fn contains_xy(&self, x: i32, y: i32) -> bool {
        self.vertex_exists(y, x)
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|b| **b).count()
    }
}

impl FromStr for ObstacleMap {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> anyhow::Result<Self> {
        let mut lines = text.lines();

        let _type = lines.next().ok_or_else(|| anyhow!("missing map type line"))?;
        let height = parse_header(lines.next(), "height")?;
        let width = parse_header(lines.next(), "width")?;
        let _map = lines.next().ok_or_else(|| anyhow!("missing 'map' line"))?;

        let mut map = ObstacleMap::new(height, width);
        let mut row = 0;
        for line in lines.take(height) {
            let cells: Vec<char> = line.chars().collect();
            if cells.len() < width {
                return Err(anyhow!(
                    "row {row} has {} cells, expected {width}",
                    cells.len()
                ));
            }
            for (col, ch) in cells.into_iter().take(width).enumerate() {
                if !matches!(ch, '.' | 'G' | 'S') {
                    map.block(row as i32, col as i32);
                }
            }
            row += 1;
        }
        if row != height {
            return Err(anyhow!("expected {height} rows, found {row}"));
        }

        Ok(map)
    }
}

fn parse_header(line: Option<&str>, key: &str) -> anyhow::Result<usize> {
    let line = line.ok_or_else(|| anyhow!("missing '{key}' line"))?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(k), Some(v)) if k == key => v
            .parse::<usize>()
            .with_context(|| format!("invalid {key} value '{v}'")),
        _ => Err(anyhow!("expected '{key} <n>', got '{line}'")),
    }
}
