use crate::errors::ExplainError;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), ExplainError> {
    if value.is_nan() || value <= 0.0 || value.is_infinite() {
        Err(ExplainError::InvalidParameter(
            parameter.to_string(),
            "a finite real value greater than 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ExplainError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(ExplainError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_count_parameter(value: usize, min: usize, parameter: &str) -> Result<(), ExplainError> {
    if value < min {
        Err(ExplainError::InvalidParameter(
            parameter.to_string(),
            format!("an integer of at least {}", min),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Indices of `v` sorted by value, largest first. Ties keep index order.
pub fn argsort_desc(v: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_by(|a, b| v[*b].partial_cmp(&v[*a]).unwrap_or(Ordering::Equal));
    idx
}

pub fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().sum::<f64>() / v.len() as f64
    }
}

/// Population standard deviation.
pub fn std_dev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    (v.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / v.len() as f64).sqrt()
}

/// Naive weighted percentiles calculation.
///
/// * `v` - A slice of which to find percentiles for.
/// * `sample_weight` - Sample weights for the instances of the vector.
/// * `percentiles` - Percentiles to look for in the data. This should be
///   values from 0 to 1, and in sorted order.
pub fn percentiles(v: &[f64], sample_weight: &[f64], percentiles: &[f64]) -> Vec<f64> {
    if v.is_empty() || percentiles.is_empty() {
        return Vec::new();
    }
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_unstable_by(|a, b| v[*a].partial_cmp(&v[*b]).unwrap_or(Ordering::Equal));

    let mut pcts = VecDeque::from_iter(percentiles.iter());
    let mut current_pct = match pcts.pop_front() {
        Some(p) => *p,
        None => return Vec::new(),
    };

    let mut p = Vec::new();
    let mut cuml_pct = 0.0;
    let total_values: f64 = sample_weight.iter().sum();

    for i in idx.iter() {
        let current_value = v[*i];
        cuml_pct += sample_weight[*i] / total_values;
        // The same value can satisfy several percentiles.
        while cuml_pct >= current_pct {
            p.push(current_value);
            match pcts.pop_front() {
                Some(p_) => current_pct = *p_,
                None => return p,
            }
        }
    }
    // Floating point rounding can leave the top percentiles unfilled.
    if let Some(last) = idx.last() {
        while p.len() < percentiles.len() {
            p.push(v[*last]);
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let v = vec![4.0, 1.0, 3.0, 2.0];
        let w = vec![1.0; 4];
        let p = percentiles(&v, &w, &[0.25, 0.5, 0.75, 1.0]);
        assert_eq!(p, vec![1.0, 2.0, 3.0, 4.0]);
        let heavy = percentiles(&v, &[1.0, 1.0, 1.0, 9.0], &[0.5]);
        assert_eq!(heavy, vec![2.0]);
    }

    #[test]
    fn test_validation() {
        assert!(validate_float_parameter(0.5, 0.0, 1.0, "rate").is_ok());
        assert!(validate_float_parameter(1.5, 0.0, 1.0, "rate").is_err());
        assert!(validate_float_parameter(f64::NAN, 0.0, 1.0, "rate").is_err());
        assert!(validate_positive_float_parameter(0.0, "width").is_err());
        assert!(validate_positive_float_parameter(0.1, "width").is_ok());
        assert!(validate_count_parameter(0, 1, "n").is_err());
    }

    #[test]
    fn test_stats_helpers() {
        assert_eq!(argsort_desc(&[0.1, 0.5, 0.5, 0.2]), vec![1, 2, 3, 0]);
        assert_eq!(mean(&[]), 0.0);
        assert!((std_dev(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(fmt_vec_output(&[1.0, 2.5]), "1.0000, 2.5000");
        assert_eq!(items_to_strings(vec!["a", "b"]), "a, b, ");
    }
}
