/// Rounded percentage of `correct` over `total`; 0 for an empty test.
pub fn score_percent(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * 100.0).round() as u32
}

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_percent() {
        assert_eq!(score_percent(5, 5), 100);
        assert_eq!(score_percent(0, 5), 0);
        assert_eq!(score_percent(1, 3), 33);
        assert_eq!(score_percent(2, 3), 67);
    }

    #[test]
    fn test_score_percent_rounds_half_up() {
        assert_eq!(score_percent(1, 8), 13);
    }

    #[test]
    fn test_score_percent_empty_test() {
        assert_eq!(score_percent(0, 0), 0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
    }

    #[test]
    fn test_mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }
}
