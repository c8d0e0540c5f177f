use crate::error::{MsmError, Result};

/// Coefficient of determination between transformed and reference maps.
///
/// Each row is one contrast map over mesh vertices. R² is computed per map
/// across vertices, treating `y_true` as the observed values, then averaged
/// uniformly over maps. A map whose observed values are constant scores 1.0
/// when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &[Vec<f32>], y_pred: &[Vec<f32>]) -> Result<f64> {
    if y_true.is_empty() {
        return Err(MsmError::EmptyInput("transformed"));
    }
    if y_true.len() != y_pred.len() {
        return Err(MsmError::LengthMismatch {
            n_source: y_true.len(),
            n_reference: y_pred.len(),
        });
    }

    let mut total = 0.0;
    for (index, (truth, pred)) in y_true.iter().zip(y_pred).enumerate() {
        if truth.len() != pred.len() {
            return Err(MsmError::VertexCountMismatch {
                index,
                expected: truth.len(),
                got: pred.len(),
            });
        }
        if truth.len() < 2 {
            log::warn!("R² is not well-defined with fewer than two vertices");
            return Ok(f64::NAN);
        }
        total += r2_single(truth, pred);
    }
    Ok(total / y_true.len() as f64)
}

fn r2_single(truth: &[f32], pred: &[f32]) -> f64 {
    let mean = truth.iter().map(|&v| v as f64).sum::<f64>() / truth.len() as f64;
    let (ss_res, ss_tot) = truth
        .iter()
        .zip(pred)
        .fold((0.0, 0.0), |(res, tot), (&t, &p)| {
            let t = t as f64;
            let p = p as f64;
            (res + (t - p).powi(2), tot + (t - mean).powi(2))
        });

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Pearson correlation of two equally long maps. NaN when either is constant.
pub fn pearson_r(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(MsmError::VertexCountMismatch {
            index: 0,
            expected: a.len(),
            got: b.len(),
        });
    }
    if a.is_empty() {
        return Err(MsmError::EmptyInput("correlation"));
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(cov / (var_a.sqrt() * var_b.sqrt()))
}
