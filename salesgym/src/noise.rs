// src/noise.rs
//
// Bounded stochastic perturbations for reset jitter and per-step effects.
//
// Noise is off by default. When enabled, every draw comes from the episode's
// seeded ChaCha8 stream, so a (seed, persona, action sequence) triple always
// reproduces the same trajectory.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default clip for Gaussian noise, in standard deviations.
const DEFAULT_GAUSSIAN_CLIP_SIGMAS: f64 = 3.0;

/// Distribution of a single noise draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum NoiseSpec {
    /// Deterministic: every draw is 0.0.
    #[default]
    None,
    /// Uniform on `[-half_width, +half_width]`.
    Uniform { half_width: f64 },
    /// Zero-mean Gaussian, clipped to `[-clip, +clip]`.
    ///
    /// `clip` defaults to three standard deviations.
    Gaussian {
        std: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clip: Option<f64>,
    },
}

impl NoiseSpec {
    /// True if draws are always zero.
    pub fn is_none(&self) -> bool {
        match *self {
            NoiseSpec::None => true,
            NoiseSpec::Uniform { half_width } => half_width == 0.0,
            NoiseSpec::Gaussian { std, .. } => std == 0.0,
        }
    }

    /// Largest absolute value a draw can take.
    pub fn bound(&self) -> f64 {
        match *self {
            NoiseSpec::None => 0.0,
            NoiseSpec::Uniform { half_width } => half_width,
            NoiseSpec::Gaussian { std, clip } => {
                clip.unwrap_or(std * DEFAULT_GAUSSIAN_CLIP_SIGMAS)
            }
        }
    }

    /// Draw one value.
    ///
    /// `NoiseSpec::None` consumes no randomness.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.is_none() {
            return 0.0;
        }
        match *self {
            NoiseSpec::None => 0.0,
            NoiseSpec::Uniform { half_width } => rng.gen_range(-half_width..=half_width),
            NoiseSpec::Gaussian { std, .. } => {
                let bound = self.bound();
                (std * standard_normal(rng)).clamp(-bound, bound)
            }
        }
    }

    /// Fill `out` with independent draws.
    pub fn sample_into<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [f64]) {
        for slot in out.iter_mut() {
            *slot = self.sample(rng);
        }
    }

    /// Check parameters: all magnitudes finite and within [0, 1].
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        match *self {
            NoiseSpec::None => Ok(()),
            NoiseSpec::Uniform { half_width } => {
                check_magnitude(&format!("{field}.half_width"), half_width)
            }
            NoiseSpec::Gaussian { std, clip } => {
                check_magnitude(&format!("{field}.std"), std)?;
                if let Some(clip) = clip {
                    check_magnitude(&format!("{field}.clip"), clip)?;
                }
                Ok(())
            }
        }
    }
}

/// Noise applied at reset (jitter around the persona base) and at every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseConfig {
    #[serde(default)]
    pub initial: NoiseSpec,
    #[serde(default)]
    pub step: NoiseSpec,
}

impl NoiseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.initial.validate("noise.initial")?;
        self.step.validate("noise.step")
    }
}

fn check_magnitude(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    Distribution::<f64>::sample(&StandardNormal, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn none_is_zero_and_consumes_nothing() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(7);
        let mut rng2 = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(NoiseSpec::None.sample(&mut rng1), 0.0);
        assert_eq!(rng1.gen::<u64>(), rng2.gen::<u64>());
    }

    #[test]
    fn gaussian_respects_clip() {
        let spec = NoiseSpec::Gaussian {
            std: 0.5,
            clip: Some(0.1),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..1000 {
            let x = spec.sample(&mut rng);
            assert!(x.abs() <= 0.1 + 1e-12);
        }
    }

    #[test]
    fn gaussian_default_clip_is_three_sigma() {
        let spec = NoiseSpec::Gaussian {
            std: 0.01,
            clip: None,
        };
        assert!((spec.bound() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn uniform_stays_in_range() {
        let spec = NoiseSpec::Uniform { half_width: 0.05 };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut out = vec![0.0; 256];
        spec.sample_into(&mut rng, &mut out);
        assert!(out.iter().all(|x| x.abs() <= 0.05));
        assert!(out.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn same_seed_same_draws() {
        let spec = NoiseSpec::Gaussian {
            std: 0.1,
            clip: None,
        };
        let mut a = ChaCha8Rng::seed_from_u64(99);
        let mut b = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..32 {
            assert_eq!(spec.sample(&mut a), spec.sample(&mut b));
        }
    }

    #[test]
    fn validate_rejects_negative_and_nan() {
        assert!(NoiseSpec::Uniform { half_width: -0.1 }
            .validate("noise.step")
            .is_err());
        assert!(NoiseSpec::Gaussian {
            std: f64::NAN,
            clip: None
        }
        .validate("noise.step")
        .is_err());
        assert!(NoiseSpec::Gaussian {
            std: 0.01,
            clip: Some(2.0)
        }
        .validate("noise.step")
        .is_err());
    }

    #[test]
    fn parses_tagged_yaml() {
        let cfg: NoiseConfig = serde_yaml::from_str(
            "initial:\n  kind: gaussian\n  std: 0.1\nstep:\n  kind: uniform\n  half_width: 0.02\n",
        )
        .unwrap();
        assert_eq!(
            cfg.initial,
            NoiseSpec::Gaussian {
                std: 0.1,
                clip: None
            }
        );
        assert_eq!(cfg.step, NoiseSpec::Uniform { half_width: 0.02 });
    }
}
