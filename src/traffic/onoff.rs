use crate::engine::SimTime;
use crate::error::{ScenarioError, ScenarioResult};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

/// How a sending application alternates between bursts and silence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OnOffModel {
    /// On for the whole window
    #[default]
    AlwaysOn,
    Exponential { mean_on_s: f64, mean_off_s: f64 },
}

impl OnOffModel {
    pub fn validate(&self) -> ScenarioResult<()> {
        match *self {
            OnOffModel::AlwaysOn => Ok(()),
            OnOffModel::Exponential { mean_on_s, mean_off_s } => {
                let ok = |v: f64| v.is_finite() && v > 0.0;
                if ok(mean_on_s) && ok(mean_off_s) {
                    Ok(())
                } else {
                    Err(ScenarioError::InvalidFlow(format!(
                        "on/off means must be positive, got {mean_on_s}/{mean_off_s}"
                    )))
                }
            }
        }
    }
}

pub struct OnOffSampler {
    rng: StdRng,
    on: Option<Exp<f64>>,
    off: Option<Exp<f64>>,
}

impl OnOffSampler {
    pub fn new(model: OnOffModel, seed: u64) -> Self {
        let (on, off) = match model {
            OnOffModel::AlwaysOn => (None, None),
            OnOffModel::Exponential { mean_on_s, mean_off_s } => {
                (Exp::new(1.0 / mean_on_s).ok(), Exp::new(1.0 / mean_off_s).ok())
            }
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            on,
            off,
        }
    }

    pub fn next_on(&mut self) -> SimTime {
        match &self.on {
            Some(dist) => SimTime::from_secs_f64(dist.sample(&mut self.rng)),
            None => SimTime::MAX,
        }
    }

    pub fn next_off(&mut self) -> SimTime {
        match &self.off {
            Some(dist) => SimTime::from_secs_f64(dist.sample(&mut self.rng)),
            None => SimTime::ZERO,
        }
    }
}
