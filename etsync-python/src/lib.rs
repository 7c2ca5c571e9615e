//! Python bindings for the eye-tracker / EEG synchronization core.
//!
//! This module exposes ASC parsing, saccade detection and synchronization
//! to Python using PyO3, with numpy arrays for all per-sample data.

use etsync_core::saccade::{as_position_matrix, EngbertMergenthaler, SaccadeDetector};
use etsync_core::types::EYELINK_CLOCK_HZ;
use etsync_core::{
    AscDecoder, AscRecording, DetectorConfig, DetectorKind, EegTriggerChannel, FormatKind,
    Synchronizer,
};
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Decoded ASC recording with columnar numpy access.
///
/// Sample columns are stored separately (time, x, y, pupil per eye) so each
/// getter hands out one contiguous array.
#[pyclass]
pub struct Recording {
    inner: AscRecording,
}

#[pymethods]
impl Recording {
    /// Returns the number of samples.
    fn __len__(&self) -> usize {
        self.inner.samples.len()
    }

    /// Returns a string representation.
    fn __repr__(&self) -> String {
        format!(
            "Recording(name={:?}, format={}, samples={}, triggers={})",
            self.inner.name,
            self.inner.format,
            self.inner.samples.len(),
            self.inner.triggers.len()
        )
    }

    #[getter]
    fn name(&self) -> &str {
        &self.inner.name
    }

    /// Sample timestamps in eye-tracker clock ticks (ms).
    #[getter]
    fn time<'py>(&self, py: Python<'py>) -> &'py PyArray1<i64> {
        self.inner.sample_times().into_pyarray(py)
    }

    #[getter]
    fn left_x<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.left_x)
    }

    #[getter]
    fn left_y<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.left_y)
    }

    #[getter]
    fn left_pupil<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.left_pupil)
    }

    #[getter]
    fn right_x<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.right_x)
    }

    #[getter]
    fn right_y<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.right_y)
    }

    #[getter]
    fn right_pupil<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.column(py, |s| s.right_pupil)
    }

    /// Trigger timestamps.
    #[getter]
    fn trigger_time<'py>(&self, py: Python<'py>) -> &'py PyArray1<i64> {
        let times: Vec<i64> = self.inner.triggers.iter().map(|t| t.time).collect();
        times.into_pyarray(py)
    }

    /// Trigger codes.
    #[getter]
    fn trigger_code<'py>(&self, py: Python<'py>) -> &'py PyArray1<i32> {
        let codes: Vec<i32> = self.inner.triggers.iter().map(|t| t.code).collect();
        codes.into_pyarray(py)
    }

    /// Messages as a list of (time, body) tuples.
    #[getter]
    fn messages(&self) -> Vec<(i64, String)> {
        self.inner
            .messages
            .iter()
            .map(|m| (m.time, m.body.clone()))
            .collect()
    }

    /// Sampling frequency in Hz, `None` with fewer than two samples.
    #[getter]
    fn sampling_rate(&self) -> Option<f64> {
        self.inner.sampling_rate(EYELINK_CLOCK_HZ)
    }

    /// Counts of skipped lines keyed by their leading token.
    #[getter]
    fn skipped<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        for (token, count) in &self.inner.skipped {
            dict.set_item(token, *count)?;
        }
        Ok(dict)
    }

    /// Runs the saccade detector on every recorded eye and returns the
    /// combined onset vector.
    #[pyo3(signature = (lambda_=5.0))]
    fn detect_saccades<'py>(&self, py: Python<'py>, lambda_: f64) -> PyResult<&'py PyArray1<bool>> {
        let config = DetectorConfig {
            lambda: lambda_,
            ..DetectorConfig::default()
        };
        let detected = self
            .inner
            .detect_saccades(DetectorKind::EngbertMergenthaler, &config)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(detected.onsets.into_pyarray(py))
    }

    /// Returns the sample columns as a dictionary.
    ///
    /// This is useful for creating a pandas DataFrame.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        dict.set_item("time", self.time(py))?;
        dict.set_item("left x", self.left_x(py))?;
        dict.set_item("left y", self.left_y(py))?;
        dict.set_item("left pupil size", self.left_pupil(py))?;
        dict.set_item("right x", self.right_x(py))?;
        dict.set_item("right y", self.right_y(py))?;
        dict.set_item("right pupil size", self.right_pupil(py))?;
        Ok(dict.into())
    }
}

impl Recording {
    fn column<'py, F>(&self, py: Python<'py>, f: F) -> &'py PyArray1<f64>
    where
        F: Fn(&etsync_core::Sample) -> f64,
    {
        let values: Vec<f64> = self.inner.samples.iter().map(f).collect();
        values.into_pyarray(py)
    }
}

fn parse_format(format: &str) -> PyResult<FormatKind> {
    format
        .parse()
        .map_err(|e: etsync_core::format::UnknownFormat| PyValueError::new_err(e.to_string()))
}

fn decode(path: &str, format: &str) -> PyResult<AscRecording> {
    AscDecoder::new(parse_format(format)?)
        .decode_file(path)
        .map_err(|e| PyIOError::new_err(format!("Failed to decode file: {}", e)))
}

/// Parses an EyeLink ASC file.
///
/// Args:
///     path: Path to the .asc file
///     format: "binocular", "monocular-left" or "monocular-right"
///
/// Returns:
///     Recording: Container with sample, trigger and message data
///
/// Example:
///     >>> import etsync
///     >>> rec = etsync.parse_file("s01.asc")
///     >>> print(f"{len(rec)} samples at {rec.sampling_rate} Hz")
#[pyfunction]
#[pyo3(signature = (path, format="binocular"))]
fn parse_file(py: Python<'_>, path: &str, format: &str) -> PyResult<Py<Recording>> {
    let inner = decode(path, format)?;
    Py::new(py, Recording { inner })
}

/// Detects saccade onsets in an (n, 2) array of gaze positions.
///
/// Args:
///     positions: float64 array with x and y columns
///     sf: Sampling frequency in Hz
///     lambda_: Threshold in median-based SD units (default: 5.0)
///
/// Returns:
///     numpy.ndarray: bool array of length n, True at saccade onsets
#[pyfunction]
#[pyo3(signature = (positions, sf, lambda_=5.0))]
fn detect_saccades<'py>(
    py: Python<'py>,
    positions: PyReadonlyArrayDyn<'py, f64>,
    sf: f64,
    lambda_: f64,
) -> PyResult<&'py PyArray1<bool>> {
    let view = as_position_matrix(positions.as_array())
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let detector = EngbertMergenthaler::new(DetectorConfig {
        lambda: lambda_,
        ..DetectorConfig::default()
    });
    let onsets = detector
        .detect(view, sf)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(onsets.into_pyarray(py))
}

/// Maps every eye-tracker sample of an ASC file to an EEG sample.
///
/// Args:
///     path: Path to the .asc file
///     eeg_codes: int32 array of EEG trigger codes, one per EEG sample
///     eeg_sf: EEG sampling frequency in Hz
///     format: ASC layout (default: "binocular")
///
/// Returns:
///     numpy.ndarray: int64 EEG sample index per eye-tracker sample, -1 where
///     the sample could not be synchronized
#[pyfunction]
#[pyo3(signature = (path, eeg_codes, eeg_sf, format="binocular"))]
fn synchronize<'py>(
    py: Python<'py>,
    path: &str,
    eeg_codes: PyReadonlyArray1<'py, i32>,
    eeg_sf: f64,
    format: &str,
) -> PyResult<&'py PyArray1<i64>> {
    let recording = decode(path, format)?;
    let eeg = EegTriggerChannel::new(eeg_codes.as_array().to_vec(), eeg_sf);
    let result = Synchronizer::default()
        .synchronize(&recording, &eeg)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(result.index.to_sentinel_vec().into_pyarray(py))
}

/// Eye-tracker / EEG synchronization module for Python.
#[pymodule]
fn _etsync(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_file, m)?)?;
    m.add_function(wrap_pyfunction!(detect_saccades, m)?)?;
    m.add_function(wrap_pyfunction!(synchronize, m)?)?;
    m.add_class::<Recording>()?;
    Ok(())
}
