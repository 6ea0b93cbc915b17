// In-memory sheet grid, before any header detection.

/// One cell as the reader saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    /// Literal string cell.
    Text(String),
    /// Bare number with the default (General) format.
    Number(f64),
    /// Number that carries a display format. `rendered` is the text the
    /// spreadsheet would show, when the reader could produce it.
    Formatted {
        value: f64,
        format: String,
        rendered: Option<String>,
    },
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }
}

/// Row-major grid; rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}
