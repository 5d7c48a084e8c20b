//! 隨機抽樣
//!
//! 所有抽樣都透過呼叫端傳入的 RNG 進行，不使用全域或以系統熵初始化的 RNG。

use linesim_core::ProcessTime;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};

/// 以平均值 `mean` 抽樣指數分佈；`mean` 無限大時回傳無限大
pub fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> f64 {
    if !mean.is_finite() {
        return f64::INFINITY;
    }
    if mean <= 0.0 {
        return 0.0;
    }
    match Exp::new(1.0 / mean) {
        Ok(exp) => exp.sample(rng),
        Err(_) => mean,
    }
}

/// 抽樣一次加工時間（秒，>= 0）
pub fn sample_process_time<R: Rng + ?Sized>(rng: &mut R, process_time: &ProcessTime) -> f64 {
    match *process_time {
        ProcessTime::Constant(value) => value,
        ProcessTime::Uniform { min, max } => {
            if min < max {
                rng.gen_range(min..max)
            } else {
                min
            }
        }
        ProcessTime::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
            Ok(normal) => normal.sample(rng).max(0.0),
            Err(_) => mean,
        },
        ProcessTime::Exponential { mean } => sample_exponential(rng, mean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;

    fn sample_mean(process_time: ProcessTime, n: usize) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        (0..n)
            .map(|_| sample_process_time(&mut rng, &process_time))
            .sum::<f64>()
            / n as f64
    }

    #[rstest]
    #[case(ProcessTime::Constant(5.0), 5.0, 1e-12)]
    #[case(ProcessTime::Uniform { min: 10.0, max: 20.0 }, 15.0, 0.2)]
    #[case(ProcessTime::Normal { mean: 30.0, std_dev: 2.0 }, 30.0, 0.2)]
    #[case(ProcessTime::Exponential { mean: 8.0 }, 8.0, 0.3)]
    fn test_sample_mean(#[case] process_time: ProcessTime, #[case] expected: f64, #[case] tol: f64) {
        let mean = sample_mean(process_time, 20_000);
        assert!((mean - expected).abs() < tol, "mean {} vs {}", mean, expected);
    }

    #[test]
    fn test_normal_is_truncated_at_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let wide = ProcessTime::Normal { mean: 1.0, std_dev: 10.0 };
        for _ in 0..1_000 {
            assert!(sample_process_time(&mut rng, &wide) >= 0.0);
        }
    }

    #[test]
    fn test_exponential_infinite_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(sample_exponential(&mut rng, f64::INFINITY).is_infinite());
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(sample_exponential(&mut a, 720.0), sample_exponential(&mut b, 720.0));
        }
    }
}
