//! Row representation.

use std::fmt;

use super::Value;

/// A single row of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row of integers. Handy in tests and benchmarks.
    pub fn ints(values: &[i32]) -> Self {
        Self {
            values: values.iter().copied().map(Value::Int).collect(),
        }
    }

    /// Returns the number of columns in this row.
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns the values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Projects this row to include only the specified columns.
    pub fn project(&self, indices: &[usize]) -> Row {
        let values = indices
            .iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
            .collect();
        Row { values }
    }

    /// Approximate in-memory footprint in bytes.
    pub fn estimated_size(&self) -> u64 {
        let values: u64 = self.values.iter().map(Value::estimated_size).sum();
        std::mem::size_of::<Row>() as u64 + values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_basics() {
        let row = Row::new(vec![Value::Int(1), Value::string("hello")]);
        assert_eq!(row.num_columns(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get(2), None);
        assert_eq!(row.to_string(), "(1, hello)");
    }

    #[test]
    fn test_row_project() {
        let row = Row::ints(&[5, 6, 7]);
        assert_eq!(row.project(&[2, 0]), Row::ints(&[7, 5]));
        assert_eq!(row.project(&[9]).get(0), Some(&Value::Null));
    }

    #[test]
    fn test_estimated_size_grows_with_columns() {
        assert!(Row::ints(&[1, 2, 3]).estimated_size() > Row::ints(&[1]).estimated_size());
    }
}
