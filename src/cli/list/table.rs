use std::fmt::{self, Write};

/// A row of cells. Cells in a header must not contain whitespace so that the
/// output stays easy to split with `awk` or `cut`.
pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        !self
            .cells
            .iter()
            .any(|cell| cell.contains(char::is_whitespace))
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Row { cells }
    }
}

impl<const N: usize> From<[&str; N]> for Row {
    fn from(cells: [&str; N]) -> Self {
        Row {
            cells: cells.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A left-aligned table with two spaces between columns
pub(crate) struct Table {
    header: Row,
    body: Vec<Row>,
    print_header: bool,
}

impl Table {
    pub(crate) fn with_header(header: impl Into<Row>) -> Table {
        let header = header.into();

        debug_assert!(header.is_awk_safe(), "table header contains whitespace");

        Table {
            header,
            body: Vec::new(),
            print_header: true,
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    /// Appends a row, padding or truncating it to the width of the header
    pub(crate) fn add_row(&mut self, row: impl Into<Row>) {
        let mut row = row.into();

        row.cells.resize(self.header.cells.len(), String::new());

        self.body.push(row);
    }

    fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let header = self.print_header.then_some(&self.header);

        header.into_iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.header.cells.len()];

        for row in self.visible_rows() {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        for row in self.visible_rows() {
            let last = row.cells.len().saturating_sub(1);

            for (i, cell) in row.cells.iter().enumerate() {
                if i == last {
                    // No trailing padding
                    f.write_str(cell)?;
                } else {
                    write!(f, "{:<width$}  ", cell, width = widths[i])?;
                }
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::with_header(["MODEL", "CONTEXT"]);

        table.add_row(vec!["gpt-4".to_string(), "8192".to_string()]);
        table.add_row(vec!["claude-3-opus".to_string(), "200000".to_string()]);

        table
    }

    #[test]
    fn columns_are_aligned() {
        assert_eq!(
            sample().to_string(),
            "MODEL          CONTEXT\ngpt-4          8192\nclaude-3-opus  200000\n"
        );
    }

    #[test]
    fn header_can_be_hidden() {
        let mut table = sample();
        table.print_header(false);

        assert_eq!(table.to_string(), "gpt-4          8192\nclaude-3-opus  200000\n");
    }

    #[test]
    fn short_rows_are_padded() {
        let mut table = Table::with_header(["A", "B"]);
        table.add_row(vec!["x".to_string()]);

        assert_eq!(table.to_string(), "A  B\nx  \n");
    }
}
