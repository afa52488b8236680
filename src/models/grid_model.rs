use super::GeneratedImage;

/// Result of placing a batch of items into a [`GridModel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Items that found a free slot.
    pub placed: usize,
    /// Items discarded because the grid was already full.
    pub dropped: usize,
}

/// Fixed-capacity row/column store.
///
/// Items fill left-to-right, top-to-bottom in insertion order. Capacity is
/// fixed at construction; once every row holds `columns` items further
/// appends are dropped, never queued and never displacing what is shown.
#[derive(Debug, Clone)]
pub struct GridModel<T> {
    columns: usize,
    rows: Vec<Vec<T>>,
}

impl<T> GridModel<T> {
    pub fn new(rows: usize, columns: usize) -> Self {
        if rows == 0 || columns == 0 {
            tracing::warn!(rows, columns, "Degenerate grid size, clamping to 1");
        }
        let rows = rows.max(1);
        let columns = columns.max(1);
        Self {
            columns,
            rows: (0..rows).map(|_| Vec::with_capacity(columns)).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn capacity(&self) -> usize {
        self.rows.len() * self.columns
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Remove every item. Row containers are kept.
    pub fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        for row in &mut self.rows {
            row.clear();
        }
    }

    /// Place one item in the first row with room.
    ///
    /// Returns the `(row, column)` the item landed in, or `None` when the grid
    /// is full and the item was dropped.
    pub fn append_one(&mut self, item: T) -> Option<(usize, usize)> {
        let row_index = self.first_open_row()?;
        let row = &mut self.rows[row_index];
        row.push(item);
        Some((row_index, row.len() - 1))
    }

    /// Place every item in order, dropping whatever does not fit.
    pub fn append<I>(&mut self, items: I) -> AppendOutcome
    where
        I: IntoIterator<Item = T>,
    {
        let mut outcome = AppendOutcome::default();
        for item in items {
            if self.append_one(item).is_some() {
                outcome.placed += 1;
            } else {
                outcome.dropped += 1;
            }
        }
        if outcome.dropped > 0 {
            tracing::debug!(
                placed = outcome.placed,
                dropped = outcome.dropped,
                "Grid full, dropped items"
            );
        }
        outcome
    }

    pub fn row(&self, index: usize) -> Option<&[T]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub fn get(&self, row: usize, column: usize) -> Option<&T> {
        self.rows.get(row)?.get(column)
    }

    /// Items in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().flatten()
    }

    fn first_open_row(&self) -> Option<usize> {
        self.rows.iter().position(|row| row.len() < self.columns)
    }
}

/// Anything that displays generated images in a fixed grid.
pub trait ImageSink {
    /// Remove every image; safe on an empty grid.
    fn clear(&mut self);
    /// Place images in row-major order, dropping what does not fit.
    fn append(&mut self, images: Vec<GeneratedImage>) -> AppendOutcome;
}

impl ImageSink for GridModel<GeneratedImage> {
    fn clear(&mut self) {
        GridModel::clear(self);
    }

    fn append(&mut self, images: Vec<GeneratedImage>) -> AppendOutcome {
        GridModel::append(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_of(grid: &GridModel<char>) -> Vec<Vec<char>> {
        (0..grid.rows())
            .map(|i| grid.row(i).unwrap_or_default().to_vec())
            .collect()
    }

    #[test]
    fn test_two_by_two_drops_fifth_item() {
        let mut grid = GridModel::new(2, 2);
        let outcome = grid.append(['A', 'B', 'C', 'D', 'E']);

        assert_eq!(outcome, AppendOutcome { placed: 4, dropped: 1 });
        assert_eq!(rows_of(&grid), vec![vec!['A', 'B'], vec!['C', 'D']]);
        assert!(grid.is_full());
    }

    #[test]
    fn test_visible_count_is_min_of_n_and_capacity() {
        for (rows, columns) in [(1, 1), (2, 2), (3, 2), (1, 5), (4, 3)] {
            for n in 0..15 {
                let mut grid = GridModel::new(rows, columns);
                grid.append(0..n);
                assert_eq!(grid.len(), n.min(rows * columns), "{rows}x{columns} n={n}");
                let expected: Vec<usize> = (0..n.min(rows * columns)).collect();
                assert_eq!(grid.iter().copied().collect::<Vec<_>>(), expected);
            }
        }
    }

    #[test]
    fn test_row_major_placement() {
        let mut grid = GridModel::new(3, 2);
        assert_eq!(grid.append_one('a'), Some((0, 0)));
        assert_eq!(grid.append_one('b'), Some((0, 1)));
        assert_eq!(grid.append_one('c'), Some((1, 0)));
        assert_eq!(grid.get(1, 0), Some(&'c'));
        assert_eq!(grid.get(2, 0), None);
    }

    #[test]
    fn test_full_grid_never_displaces() {
        let mut grid = GridModel::new(1, 2);
        grid.append(['x', 'y']);
        let outcome = grid.append(['z', 'w']);

        assert_eq!(outcome, AppendOutcome { placed: 0, dropped: 2 });
        assert_eq!(rows_of(&grid), vec![vec!['x', 'y']]);
        assert_eq!(grid.append_one('q'), None);
    }

    #[test]
    fn test_clear_then_append_ignores_prior_contents() {
        let mut fresh = GridModel::new(2, 2);
        fresh.append(['p', 'q', 'r']);

        let mut reused = GridModel::new(2, 2);
        reused.append(['1', '2', '3', '4', '5']);
        reused.clear();
        reused.append(['p', 'q', 'r']);

        assert_eq!(rows_of(&fresh), rows_of(&reused));
    }

    #[test]
    fn test_clear_keeps_rows_and_is_idempotent() {
        let mut grid: GridModel<char> = GridModel::new(2, 3);
        grid.clear();
        assert!(grid.is_empty());
        assert_eq!(grid.rows(), 2);

        grid.append(['a']);
        grid.clear();
        grid.clear();
        assert!(grid.is_empty());
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.capacity(), 6);
    }

    #[test]
    fn test_degenerate_size_is_clamped() {
        let grid: GridModel<u8> = GridModel::new(0, 0);
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.columns(), 1);
    }
}
