//! Dense 2D and 3D grids.
//!
//! Both grids store their cells in one contiguous `Vec` and never change
//! dimensions after creation. Transforms such as [`Grid2D::rotated90`] and
//! [`Grid3D::slice_layer`] return new grids instead of mutating shared
//! buffers.
//!
//! Layout:
//! - `Grid2D`: `cells[y * width + x]`
//! - `Grid3D`: `cells[(layer * height + y) * width + x]`

use crate::error::{GridError, GridResult};

/// A fixed-size 2D grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid2D<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid2D<T> {
    /// Creates a grid with every cell set to `fill`.
    #[must_use]
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            cells: vec![fill; width * height],
        }
    }

    /// Returns a copy rotated 90 degrees clockwise.
    ///
    /// The result is `height` wide and `width` tall.
    #[must_use]
    pub fn rotated90(&self) -> Self {
        let (width, height) = (self.height, self.width);
        Self::from_fn(width, height, |x, y| {
            self.cells[(self.height - 1 - x) * self.width + y].clone()
        })
    }
}

impl<T> Grid2D<T> {
    /// Wraps existing row-major cells.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] if `cells.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, cells: Vec<T>) -> GridResult<Self> {
        if cells.len() != width * height {
            return Err(GridError::DimensionMismatch {
                expected: (width, height, 1),
                actual: (cells.len(), 1, 1),
            });
        }
        Ok(Self { width, height, cells })
    }

    /// Builds a grid by calling `f(x, y)` for every cell in row-major order.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self { width, height, cells }
    }

    /// Grid width (columns).
    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height (rows).
    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if the grid has no cells.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Linear index of `(x, y)`, or `None` if out of bounds.
    #[inline]
    #[must_use]
    pub const fn index_of(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// `(x, y)` of a linear index, or `None` if out of bounds.
    #[inline]
    #[must_use]
    pub const fn coords_of(&self, index: usize) -> Option<(usize, usize)> {
        if index < self.width * self.height {
            Some((index % self.width, index / self.width))
        } else {
            None
        }
    }

    /// Cell at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.index_of(x, y).map(|i| &self.cells[i])
    }

    /// Mutable cell at `(x, y)`.
    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        self.index_of(x, y).map(move |i| &mut self.cells[i])
    }

    /// Cell at a linear index.
    #[inline]
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.cells.get(index)
    }

    /// Overwrites the cell at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] if `(x, y)` is outside the grid.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> GridResult<()> {
        let index = self.index_of(x, y).ok_or(GridError::OutOfBounds {
            x,
            y,
            layer: 0,
            width: self.width,
            height: self.height,
            depth: 1,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Row-major cells.
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Iterates `(x, y, &cell)` in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i % width, i / width, cell))
    }

    /// Returns a new grid with `f` applied to every cell.
    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid2D<U> {
        Grid2D {
            width: self.width,
            height: self.height,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}

/// A fixed-size stack of equally sized 2D layers.
///
/// Indexed as `[layer][x][y]`; layer 0 is the bottom of the stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid3D<T> {
    width: usize,
    height: usize,
    depth: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid3D<T> {
    /// Creates a grid with every cell set to `fill`.
    #[must_use]
    pub fn new(depth: usize, width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            depth,
            cells: vec![fill; width * height * depth],
        }
    }

    /// Builds a grid from nested `[layer][x][y]` vectors.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidDimensions`] for an empty input and
    /// [`GridError::DimensionMismatch`] if the layers are ragged.
    pub fn from_nested(layers: &[Vec<Vec<T>>]) -> GridResult<Self> {
        let depth = layers.len();
        let width = layers.first().map_or(0, Vec::len);
        let height = layers
            .first()
            .and_then(|layer| layer.first())
            .map_or(0, Vec::len);
        if depth == 0 || width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height, depth });
        }

        let mut cells = Vec::with_capacity(width * height * depth);
        for layer in layers {
            if layer.len() != width || layer.iter().any(|column| column.len() != height) {
                return Err(GridError::DimensionMismatch {
                    expected: (width, height, depth),
                    actual: (layer.len(), layer.first().map_or(0, Vec::len), depth),
                });
            }
            for y in 0..height {
                for column in layer {
                    cells.push(column[y].clone());
                }
            }
        }
        Ok(Self { width, height, depth, cells })
    }

    /// Copies one layer out as a 2D grid.
    #[must_use]
    pub fn slice_layer(&self, layer: usize) -> Option<Grid2D<T>> {
        self.layer_cells(layer).map(|cells| Grid2D {
            width: self.width,
            height: self.height,
            cells: cells.to_vec(),
        })
    }

    /// Overwrites one layer with the contents of a 2D grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] for a missing layer and
    /// [`GridError::DimensionMismatch`] if the 2D grid has other dimensions.
    pub fn replace_layer(&mut self, layer: usize, grid: &Grid2D<T>) -> GridResult<()> {
        if layer >= self.depth {
            return Err(self.out_of_bounds(layer, 0, 0));
        }
        if grid.dimensions() != (self.width, self.height) {
            return Err(GridError::DimensionMismatch {
                expected: (self.width, self.height, 1),
                actual: (grid.width, grid.height, 1),
            });
        }
        let len = self.layer_len();
        let start = layer * len;
        self.cells[start..start + len].clone_from_slice(&grid.cells);
        Ok(())
    }
}

impl<T> Grid3D<T> {
    /// Builds a grid by calling `f(layer, x, y)` for every cell, layer by
    /// layer, each layer in row-major order.
    pub fn from_fn(
        depth: usize,
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize, usize) -> T,
    ) -> Self {
        let mut cells = Vec::with_capacity(width * height * depth);
        for layer in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    cells.push(f(layer, x, y));
                }
            }
        }
        Self { width, height, depth, cells }
    }

    /// Single-layer grid holding `grid`.
    #[must_use]
    pub fn from_layer(grid: Grid2D<T>) -> Self {
        Self {
            width: grid.width,
            height: grid.height,
            depth: 1,
            cells: grid.cells,
        }
    }

    /// Stacks 2D layers, bottom first.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidDimensions`] for no layers and
    /// [`GridError::DimensionMismatch`] if the layers differ in size.
    pub fn from_layers(layers: Vec<Grid2D<T>>) -> GridResult<Self> {
        let (width, height) = layers
            .first()
            .map(Grid2D::dimensions)
            .ok_or(GridError::InvalidDimensions { width: 0, height: 0, depth: 0 })?;
        let depth = layers.len();

        let mut cells = Vec::with_capacity(width * height * depth);
        for layer in layers {
            if layer.dimensions() != (width, height) {
                return Err(GridError::DimensionMismatch {
                    expected: (width, height, depth),
                    actual: (layer.width, layer.height, depth),
                });
            }
            cells.extend(layer.cells);
        }
        Ok(Self { width, height, depth, cells })
    }

    /// Width of every layer.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height of every layer.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Number of layers.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// `(width, height, depth)`.
    #[inline]
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    /// Cells per layer.
    #[inline]
    #[must_use]
    pub const fn layer_len(&self) -> usize {
        self.width * self.height
    }

    /// Linear index of `(layer, x, y)`, or `None` if out of bounds.
    #[inline]
    #[must_use]
    pub const fn index_of(&self, layer: usize, x: usize, y: usize) -> Option<usize> {
        if layer < self.depth && x < self.width && y < self.height {
            Some((layer * self.height + y) * self.width + x)
        } else {
            None
        }
    }

    /// Cell at `(layer, x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, layer: usize, x: usize, y: usize) -> Option<&T> {
        self.index_of(layer, x, y).map(|i| &self.cells[i])
    }

    /// Overwrites the cell at `(layer, x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] if the coordinate is outside the grid.
    pub fn set(&mut self, layer: usize, x: usize, y: usize, value: T) -> GridResult<()> {
        let index = self
            .index_of(layer, x, y)
            .ok_or_else(|| self.out_of_bounds(layer, x, y))?;
        self.cells[index] = value;
        Ok(())
    }

    /// Row-major cells of one layer.
    #[inline]
    #[must_use]
    pub fn layer_cells(&self, layer: usize) -> Option<&[T]> {
        if layer < self.depth {
            let start = layer * self.layer_len();
            Some(&self.cells[start..start + self.layer_len()])
        } else {
            None
        }
    }

    /// All cells, layer by layer.
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    fn out_of_bounds(&self, layer: usize, x: usize, y: usize) -> GridError {
        GridError::OutOfBounds {
            x,
            y,
            layer,
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }
}
