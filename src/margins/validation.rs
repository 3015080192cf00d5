//! margins::validation — shared input guards.
//!
//! Small, allocation-free checks reused by option constructors, the grid
//! builder and the effect engine. Each returns `MarginsResult<()>` (or the
//! validated value) so callers can chain them with `?`.
use crate::margins::{
    data::CovariateRow,
    errors::{MarginsError, MarginsResult},
};

/// Confidence level must lie strictly inside `(0, 1)`.
pub fn verify_confidence(level: f64) -> MarginsResult<()> {
    if !level.is_finite() || level <= 0.0 || level >= 1.0 {
        return Err(MarginsError::InvalidConfidence { value: level });
    }
    Ok(())
}

/// Degrees of freedom must be finite and positive.
pub fn verify_df(df: f64) -> MarginsResult<()> {
    if !df.is_finite() || df <= 0.0 {
        return Err(MarginsError::InvalidDf { value: df });
    }
    Ok(())
}

/// Finite-difference step must be finite and positive.
pub fn verify_step(predictor: &str, step: f64) -> MarginsResult<f64> {
    if !step.is_finite() || step <= 0.0 {
        return Err(MarginsError::InvalidStep { predictor: predictor.to_string(), step });
    }
    Ok(step)
}

/// `name` must be one of `known`.
pub fn verify_known_predictor(
    name: &str, known: &[String], operation: &'static str,
) -> MarginsResult<()> {
    if !known.iter().any(|k| k == name) {
        return Err(MarginsError::UnknownPredictor { name: name.to_string(), operation });
    }
    Ok(())
}

/// Every row must carry every predictor in `required`.
///
/// Reports the first missing `(row, predictor)` pair in row order.
pub fn verify_rows_complete(rows: &[CovariateRow], required: &[String]) -> MarginsResult<()> {
    for (index, row) in rows.iter().enumerate() {
        for name in required {
            row.require(name, index)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Accept/reject boundaries of each guard.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Check confidence and df boundaries.
    //
    // Given
    // -----
    // - Confidence in {0, 0.95, 1, NaN}; df in {0, 12, inf}.
    //
    // Expect
    // ------
    // - Only 0.95 and 12 pass.
    fn confidence_and_df_boundaries() {
        assert!(verify_confidence(0.95).is_ok());
        assert!(verify_confidence(0.0).is_err());
        assert!(verify_confidence(1.0).is_err());
        assert!(verify_confidence(f64::NAN).is_err());
        assert!(verify_df(12.0).is_ok());
        assert!(verify_df(0.0).is_err());
        assert!(verify_df(f64::INFINITY).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Check that non-positive steps are rejected with the predictor name.
    //
    // Given
    // -----
    // - Steps 1e-4, 0 and -1 for predictor "x".
    //
    // Expect
    // ------
    // - 1e-4 passes; the others return `InvalidStep` naming "x".
    fn step_must_be_positive() {
        assert_eq!(verify_step("x", 1e-4).unwrap(), 1e-4);
        assert_eq!(
            verify_step("x", 0.0).unwrap_err(),
            MarginsError::InvalidStep { predictor: "x".to_string(), step: 0.0 }
        );
        assert!(verify_step("x", -1.0).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Check row completeness reports the first gap.
    //
    // Given
    // -----
    // - Row 0 complete, row 1 missing "w".
    //
    // Expect
    // ------
    // - `MissingPredictor { name: "w", row: 1 }`.
    fn rows_complete_reports_first_missing() {
        let rows = vec![
            CovariateRow::new().with("x", 1.0).with("w", 2.0),
            CovariateRow::new().with("x", 1.0),
        ];
        let required = vec!["x".to_string(), "w".to_string()];

        let err = verify_rows_complete(&rows, &required).unwrap_err();

        assert_eq!(err, MarginsError::MissingPredictor { name: "w".to_string(), row: 1 });
        assert!(verify_known_predictor("x", &required, "test").is_ok());
        assert!(verify_known_predictor("z", &required, "test").is_err());
    }
}
