//! utils — Python argument conversion for the PyO3 bindings.
//!
//! Everything here is compiled only with the `python-bindings` feature and
//! turns loosely typed Python inputs (numpy arrays, pandas Series, lists,
//! dicts) into the strongly typed `margins` inputs.
#[cfg(feature = "python-bindings")]
use ndarray::{Array1, Array2};

#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::{PyTypeError, PyValueError},
    prelude::*,
    types::{PyAny, PyDict},
};

#[cfg(feature = "python-bindings")]
use crate::margins::{
    data::{Column, Dataset, Value},
    grid::GridSpec,
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
    PyReadonlyArray2,
};

/// Borrow a contiguous 1-D float64 view from an ndarray, Series or sequence.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err("expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64")
    })?;
    Ok(vec.into_pyarray_bound(py).readonly())
}

/// Owned 1-D vector from any input accepted by [`extract_f64_array`].
#[cfg(feature = "python-bindings")]
pub fn extract_vector<'py>(py: Python<'py>, raw: &Bound<'py, PyAny>) -> PyResult<Array1<f64>> {
    let arr = extract_f64_array(py, raw)?;
    let slice = arr
        .as_slice()
        .map_err(|_| PyValueError::new_err("expected a contiguous 1-D float64 array"))?;
    Ok(Array1::from(slice.to_vec()))
}

/// Owned 2-D matrix from a 2-D ndarray or a rectangular nested sequence.
#[cfg(feature = "python-bindings")]
pub fn extract_matrix(raw: &Bound<'_, PyAny>) -> PyResult<Array2<f64>> {
    if let Ok(arr) = raw.extract::<PyReadonlyArray2<f64>>() {
        return Ok(arr.as_array().to_owned());
    }
    let rows: Vec<Vec<f64>> = raw.extract().map_err(|_| {
        PyTypeError::new_err("expected a 2-D numpy.ndarray or nested sequence of float64")
    })?;
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(PyValueError::new_err("matrix rows must all have the same length"));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let nrows = if ncols == 0 { 0 } else { flat.len() / ncols };
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| PyValueError::new_err(format!("invalid matrix shape: {e}")))
}

/// Numeric column when the input converts to float64, categorical when it
/// is a sequence of strings.
#[cfg(feature = "python-bindings")]
pub fn extract_column<'py>(py: Python<'py>, raw: &Bound<'py, PyAny>) -> PyResult<Column> {
    if let Ok(values) = extract_vector(py, raw) {
        return Ok(Column::Numeric(values.to_vec()));
    }
    let levels: Vec<String> = raw.extract().map_err(|_| {
        PyTypeError::new_err("columns must be sequences of floats or of strings")
    })?;
    Ok(Column::categorical(&levels))
}

/// Dataset from a `{name: column}` mapping, keeping the mapping's order.
#[cfg(feature = "python-bindings")]
pub fn extract_dataset<'py>(py: Python<'py>, raw: &Bound<'py, PyDict>) -> PyResult<Dataset> {
    let mut columns = Vec::with_capacity(raw.len());
    for (key, value) in raw.iter() {
        let name: String = key.extract()?;
        columns.push((name, extract_column(py, &value)?));
    }
    Ok(Dataset::from_columns(columns)?)
}

/// Grid specification from `{name: value | [values] | None}`.
///
/// `None` requests every observed value; a scalar fixes the predictor; a
/// sequence lists the values to cross.
#[cfg(feature = "python-bindings")]
pub fn extract_grid(raw: &Bound<'_, PyDict>) -> PyResult<GridSpec> {
    let mut spec = GridSpec::new();
    for (key, value) in raw.iter() {
        let name: String = key.extract()?;
        spec = if value.is_none() {
            spec.observed(name)
        } else if let Ok(x) = value.extract::<f64>() {
            spec.fixed(name, x)
        } else if let Ok(level) = value.extract::<String>() {
            spec.fixed(name, level)
        } else if let Ok(xs) = value.extract::<Vec<f64>>() {
            spec.values(name, xs)
        } else if let Ok(levels) = value.extract::<Vec<String>>() {
            spec.values(name, levels.into_iter().map(Value::Level).collect::<Vec<_>>())
        } else {
            return Err(PyTypeError::new_err(format!(
                "grid entry {name:?} must be None, a float, a string, or a sequence of either"
            )));
        };
    }
    Ok(spec)
}
