/**
 * File: /src/matrix.rs
 * Created Date: Tuesday, June 10th 2025
 * Author: Zihan
 * -----
 * Last Modified: Sunday, 13th July 2025 4:02:11 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::util;

/// A 2-D f64 table with an ordered list of named rows and named columns.
///
/// Used both for the expression matrix (genes × conditions) and for the
/// per-cluster score matrices (entities × clusters). Row names index into
/// the table through a lookup map that is rebuilt on deserialization, so
/// persisted matrices only carry names and values.
#[derive(Debug, Clone)]
pub struct NamedMatrix {
    row_names: Vec<String>,
    column_names: Vec<String>,
    values: Array2<f64>,
    row_index: HashMap<String, usize>,
}

impl NamedMatrix {
    pub fn new(row_names: Vec<String>, column_names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != row_names.len() {
            return Err(Error::DimensionMismatch {
                expected: row_names.len(),
                found: values.nrows(),
            });
        }
        if values.ncols() != column_names.len() {
            return Err(Error::DimensionMismatch {
                expected: column_names.len(),
                found: values.ncols(),
            });
        }
        let row_index = row_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(NamedMatrix {
            row_names,
            column_names,
            values,
            row_index,
        })
    }

    /// Constant-filled matrix with the given shape and names.
    pub fn filled(row_names: Vec<String>, column_names: Vec<String>, init: f64) -> Result<Self> {
        let values = Array2::from_elem((row_names.len(), column_names.len()), init);
        Self::new(row_names, column_names, values)
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.values.ncols()
    }

    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    /// Index of the named row, or a NotFound error.
    pub fn row_index_of(&self, name: &str) -> Result<usize> {
        self.row_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound {
                dimension: crate::error::Dimension::Row,
                name: name.to_string(),
            })
    }

    pub fn has_row(&self, name: &str) -> bool {
        self.row_index.contains_key(name)
    }

    pub fn row_values(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    pub fn column_values(&self, col: usize) -> ArrayView1<'_, f64> {
        self.values.column(col)
    }

    pub fn column_values_mut(&mut self, col: usize) -> ArrayViewMut1<'_, f64> {
        self.values.column_mut(col)
    }

    /// Copy of the rows/columns selected by name, in the given order.
    /// Unknown names are an error; an empty selection yields an empty
    /// matrix.
    pub fn submatrix_by_name(&self, row_names: &[String], column_names: &[String]) -> Result<NamedMatrix> {
        let row_idx: Vec<usize> = row_names
            .iter()
            .map(|n| self.row_index_of(n))
            .collect::<Result<_>>()?;
        let col_idx: Vec<usize> = column_names
            .iter()
            .map(|n| {
                self.column_names
                    .iter()
                    .position(|c| c == n)
                    .ok_or_else(|| Error::NotFound {
                        dimension: crate::error::Dimension::Column,
                        name: n.clone(),
                    })
            })
            .collect::<std::result::Result<_, _>>()?;

        let mut values = Array2::zeros((row_idx.len(), col_idx.len()));
        for (i, &r) in row_idx.iter().enumerate() {
            for (j, &c) in col_idx.iter().enumerate() {
                values[(i, j)] = self.values[(r, c)];
            }
        }
        NamedMatrix::new(row_names.to_vec(), column_names.to_vec(), values)
    }

    /// Smallest finite value; NaN for an all-non-finite matrix.
    pub fn min(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::min)
    }

    /// Largest finite value; NaN for an all-non-finite matrix.
    pub fn max(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max)
    }

    /// Quantile over the finite values of the whole table.
    pub fn quantile(&self, q: f64) -> f64 {
        let flat: Vec<f64> = self.values.iter().copied().collect();
        util::quantile(&flat, q)
    }

    /// Scales one column in place.
    pub fn multiply_column_by(&mut self, col: usize, factor: f64) {
        self.values.column_mut(col).mapv_inplace(|v| v * factor);
    }
}

impl Index<(usize, usize)> for NamedMatrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.values[index]
    }
}

impl IndexMut<(usize, usize)> for NamedMatrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.values[index]
    }
}

impl Serialize for NamedMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NamedMatrix", 3)?;
        state.serialize_field("row_names", &self.row_names)?;
        state.serialize_field("column_names", &self.column_names)?;
        state.serialize_field("values", &self.values)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for NamedMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            row_names: Vec<String>,
            column_names: Vec<String>,
            values: Array2<f64>,
        }
        let raw = Raw::deserialize(deserializer)?;
        NamedMatrix::new(raw.row_names, raw.column_names, raw.values)
            .map_err(serde::de::Error::custom)
    }
}

/// Convenience for tests and the demo binary: `g0..gN` / `c0..cN` names.
pub fn default_names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}
