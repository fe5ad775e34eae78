//! Growable per-cell adjacency used while a coarse level is assembled.
//!
//! Each coarse cell gets an append-only list with an initial capacity guess;
//! lists grow by doubling. Once assembly is over the builder is frozen into a
//! compact CSR graph.

/// Per-cell append-only lists.
#[derive(Clone, Debug)]
pub struct AdjacencyBuilder {
    lists: Vec<Vec<usize>>,
}

impl AdjacencyBuilder {
    /// `n_cells` empty lists, each with room for `guess` entries.
    pub fn new(n_cells: usize, guess: usize) -> Self {
        Self {
            lists: (0..n_cells).map(|_| Vec::with_capacity(guess)).collect(),
        }
    }

    #[inline]
    pub fn entries(&self, cell: usize) -> &[usize] {
        &self.lists[cell]
    }

    #[inline]
    pub fn push(&mut self, cell: usize, value: usize) {
        self.lists[cell].push(value);
    }

    pub fn n_cells(&self) -> usize {
        self.lists.len()
    }

    /// Total number of stored entries.
    pub fn n_entries(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Freeze into CSR form, keeping per-cell insertion order.
    pub fn into_csr(self) -> CellAdjacency {
        let mut xadj = Vec::with_capacity(self.lists.len() + 1);
        let mut adjncy = Vec::with_capacity(self.n_entries());
        xadj.push(0);
        for list in self.lists {
            adjncy.extend(list);
            xadj.push(adjncy.len());
        }
        CellAdjacency { xadj, adjncy }
    }
}

/// CSR-style adjacency.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellAdjacency {
    /// CSR offsets into `adjncy` for each cell.
    pub xadj: Vec<usize>,
    /// Flattened per-cell entries.
    pub adjncy: Vec<usize>,
}

impl CellAdjacency {
    /// Entries of cell `i`.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.adjncy[self.xadj[i]..self.xadj[i + 1]]
    }

    pub fn n_cells(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }
}
