// salesgym_env/src/lib.rs
//
// Python bindings for the salesgym conversation environment.
//
// Gymnasium-style API:
// - Env: reset(seed, persona) -> (obs, info); step(action) -> (obs, reward,
//   terminated, truncated, info)
// - VecEnv: batched reset_all / step over independent environments
// - TrajectoryCollector: dataset generation with a built-in baseline policy
//
// Observations are flat float lists; info values are plain dicts. Errors
// raise ConfigError / InvalidActionError / EpisodeEndedError, all subclasses
// of SalesGymError.

use std::sync::Arc;

use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use salesgym::config::{resolve_effective_preset, EnvConfig, Preset};
use salesgym::error::{ConfigError as RustConfigError, EnvError as RustEnvError};
use salesgym::rl::observation::{feature_names, TraitObservation};
use salesgym::rl::trajectory::{TrajectoryMetadata, TrajectoryRecord};
use salesgym::rl::{
    ConversationEnv, Policy, RandomPolicy, ReadinessPolicy, ResetResult, StepResult,
    TrajectoryCollector as RustTrajectoryCollector, VecEnv as RustVecEnv, OBS_VERSION,
    TRAJECTORY_VERSION,
};
use salesgym::store::ConfigStore;

create_exception!(salesgym_env, SalesGymError, PyException);
create_exception!(salesgym_env, ConfigError, SalesGymError);
create_exception!(salesgym_env, EnvError, SalesGymError);
create_exception!(salesgym_env, InvalidActionError, EnvError);
create_exception!(salesgym_env, EpisodeEndedError, EnvError);

fn config_err(e: RustConfigError) -> PyErr {
    ConfigError::new_err(e.to_string())
}

fn env_err(e: RustEnvError) -> PyErr {
    match e {
        RustEnvError::InvalidAction { .. } | RustEnvError::BatchSize { .. } => {
            InvalidActionError::new_err(e.to_string())
        }
        RustEnvError::EpisodeEnded { .. } => EpisodeEndedError::new_err(e.to_string()),
        RustEnvError::UnknownPersona(_) => PyValueError::new_err(e.to_string()),
        RustEnvError::NumericInvariantViolation { .. } => EnvError::new_err(e.to_string()),
    }
}

/// Resolve a store from an explicit file, a preset name, or SALESGYM_PRESET.
fn load_store(preset: Option<&str>, config_path: Option<&str>) -> PyResult<Arc<ConfigStore>> {
    let mut cfg = match (config_path, preset) {
        (Some(path), _) => EnvConfig::load(path).map_err(config_err)?,
        (None, Some(name)) => Preset::parse(name)
            .ok_or_else(|| PyValueError::new_err(format!("unknown preset: {name}")))?
            .config(),
        (None, None) => resolve_effective_preset(None).preset.config(),
    };
    cfg.apply_env_overrides();
    ConfigStore::new(cfg).map(Arc::new).map_err(config_err)
}

fn traits_to_dict(py: Python<'_>, traits: &[TraitObservation]) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    for t in traits {
        dict.set_item(&t.id, t.value)?;
    }
    Ok(dict.into())
}

fn reset_info_to_dict(py: Python<'_>, r: &ResetResult) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("seed", r.info.seed)?;
    dict.set_item("persona_index", r.info.persona_index)?;
    dict.set_item("persona_id", &r.info.persona_id)?;
    dict.set_item("traits", traits_to_dict(py, &r.info.traits)?)?;
    dict.set_item("readiness", r.info.readiness)?;
    dict.set_item("booking_probability", r.info.booking_probability)?;
    Ok(dict.into())
}

fn step_info_to_dict(py: Python<'_>, r: &StepResult) -> PyResult<Py<PyDict>> {
    let info = &r.info;
    let dict = PyDict::new_bound(py);
    dict.set_item("turn", info.turn)?;
    dict.set_item("last_action", info.last_action)?;
    dict.set_item("last_action_id", &info.last_action_id)?;
    dict.set_item("persona_id", &info.persona_id)?;
    dict.set_item("stage_id", info.stage_id.as_deref())?;
    dict.set_item("traits", traits_to_dict(py, &info.traits)?)?;
    dict.set_item("readiness", info.readiness)?;
    dict.set_item("booking_probability", info.booking_probability)?;
    dict.set_item("ready", info.ready)?;
    dict.set_item("outcome", info.outcome.as_str())?;
    Ok(dict.into())
}

type StepTuple = (Vec<f32>, f64, bool, bool, Py<PyDict>);

fn step_tuple(py: Python<'_>, r: StepResult) -> PyResult<StepTuple> {
    let info = step_info_to_dict(py, &r)?;
    Ok((r.features, r.reward, r.terminated, r.truncated, info))
}

/// Single conversation environment.
#[pyclass]
pub struct Env {
    inner: ConversationEnv,
}

#[pymethods]
impl Env {
    /// Create an environment.
    ///
    /// Args:
    ///     preset: "appointment" or "prompt" (default: SALESGYM_PRESET, then appointment)
    ///     config_path: YAML/JSON config file; takes precedence over preset
    ///     seed: base seed for episodes reset without an explicit seed
    #[new]
    #[pyo3(signature = (preset=None, config_path=None, seed=0))]
    fn new(preset: Option<&str>, config_path: Option<&str>, seed: u64) -> PyResult<Self> {
        let store = load_store(preset, config_path)?;
        Ok(Self {
            inner: ConversationEnv::new(store, seed),
        })
    }

    /// Start a new episode. Returns (observation, info).
    #[pyo3(signature = (seed=None, persona=None))]
    fn reset(
        &mut self,
        py: Python<'_>,
        seed: Option<u64>,
        persona: Option<&str>,
    ) -> PyResult<(Vec<f32>, Py<PyDict>)> {
        let r = self.inner.reset(seed, persona).map_err(env_err)?;
        let info = reset_info_to_dict(py, &r)?;
        Ok((r.features, info))
    }

    /// Take one action. Returns (observation, reward, terminated, truncated, info).
    fn step(&mut self, py: Python<'_>, action: usize) -> PyResult<StepTuple> {
        let r = self.inner.step(action).map_err(env_err)?;
        step_tuple(py, r)
    }

    #[getter]
    fn action_space_size(&self) -> usize {
        self.inner.action_space_size()
    }

    #[getter]
    fn observation_shape(&self) -> (usize,) {
        (self.inner.observation_shape()[0],)
    }

    #[getter]
    fn turn(&self) -> u32 {
        self.inner.turn()
    }

    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }

    #[getter]
    fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    fn action_ids(&self) -> Vec<String> {
        self.inner.store().actions().iter().map(|a| a.id.clone()).collect()
    }

    fn trait_names(&self) -> Vec<String> {
        self.inner.store().traits().iter().map(|t| t.id.clone()).collect()
    }

    fn persona_ids(&self) -> Vec<String> {
        self.inner.store().personas().iter().map(|p| p.id.clone()).collect()
    }

    fn feature_names(&self) -> Vec<String> {
        feature_names(self.inner.store())
    }

    fn config_fingerprint(&self) -> String {
        self.inner.store().fingerprint().to_string()
    }

    /// Transcript of the current episode as plain text.
    fn render(&self) -> String {
        self.inner.transcript().render_text()
    }

    /// Transcript of the current episode as a dict.
    fn transcript(&self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let t = self.inner.transcript();
        let dict = PyDict::new_bound(py);
        dict.set_item("config_name", &t.config_name)?;
        dict.set_item("seed", t.seed)?;
        dict.set_item("persona_id", &t.persona_id)?;
        dict.set_item("actions", t.action_ids())?;
        dict.set_item("final_traits", traits_to_dict(py, &t.final_traits)?)?;
        dict.set_item("outcome", t.outcome.as_str())?;
        dict.set_item("turn", t.turn)?;
        Ok(dict.into())
    }
}

/// Independent environments stepped as a batch.
#[pyclass]
pub struct VecEnv {
    inner: RustVecEnv,
}

#[pymethods]
impl VecEnv {
    #[new]
    #[pyo3(signature = (n, preset=None, config_path=None, seed=0))]
    fn new(n: usize, preset: Option<&str>, config_path: Option<&str>, seed: u64) -> PyResult<Self> {
        if n == 0 {
            return Err(PyValueError::new_err("n must be > 0"));
        }
        let store = load_store(preset, config_path)?;
        Ok(Self {
            inner: RustVecEnv::new(store, n, seed),
        })
    }

    /// Reset every environment. Returns (observations, infos).
    #[pyo3(signature = (seeds=None))]
    fn reset_all(
        &mut self,
        py: Python<'_>,
        seeds: Option<Vec<u64>>,
    ) -> PyResult<(Vec<Vec<f32>>, Vec<Py<PyDict>>)> {
        let results = self.inner.reset_all(seeds.as_deref()).map_err(env_err)?;
        let infos = results
            .iter()
            .map(|r| reset_info_to_dict(py, r))
            .collect::<PyResult<Vec<_>>>()?;
        Ok((results.into_iter().map(|r| r.features).collect(), infos))
    }

    /// Step every environment. Rejects the whole batch if any action is invalid.
    #[allow(clippy::type_complexity)]
    fn step(
        &mut self,
        py: Python<'_>,
        actions: Vec<usize>,
    ) -> PyResult<(Vec<Vec<f32>>, Vec<f64>, Vec<bool>, Vec<bool>, Vec<Py<PyDict>>)> {
        let results = self.inner.step(&actions).map_err(env_err)?;
        let n = results.len();
        let (mut obs, mut rewards, mut terminated, mut truncated, mut infos) = (
            Vec::with_capacity(n),
            Vec::with_capacity(n),
            Vec::with_capacity(n),
            Vec::with_capacity(n),
            Vec::with_capacity(n),
        );
        for r in results {
            let (o, reward, term, trunc, info) = step_tuple(py, r)?;
            obs.push(o);
            rewards.push(reward);
            terminated.push(term);
            truncated.push(trunc);
            infos.push(info);
        }
        Ok((obs, rewards, terminated, truncated, infos))
    }

    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn seeds(&self) -> Vec<u64> {
        self.inner.envs().iter().map(|e| e.seed()).collect()
    }

    fn dones(&self) -> Vec<bool> {
        self.inner.envs().iter().map(|e| e.is_done()).collect()
    }
}

fn trajectory_record_to_dict(py: Python<'_>, record: &TrajectoryRecord) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("obs_features", record.obs_features.clone())?;
    dict.set_item("action", record.action)?;
    dict.set_item("reward", record.reward)?;
    dict.set_item("terminated", record.terminated)?;
    dict.set_item("truncated", record.truncated)?;
    dict.set_item("episode_idx", record.episode_idx)?;
    dict.set_item("step_idx", record.step_idx)?;
    dict.set_item("seed", record.seed)?;
    Ok(dict.into())
}

fn trajectory_metadata_to_dict(py: Python<'_>, m: &TrajectoryMetadata) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("trajectory_version", m.trajectory_version)?;
    dict.set_item("obs_version", m.obs_version)?;
    dict.set_item("policy_version", &m.policy_version)?;
    dict.set_item("config_name", &m.config_name)?;
    dict.set_item("config_fingerprint", &m.config_fingerprint)?;
    dict.set_item("base_seed", m.base_seed)?;
    dict.set_item("num_episodes", m.num_episodes)?;
    dict.set_item("num_transitions", m.num_transitions)?;
    dict.set_item("obs_dim", m.obs_dim)?;
    dict.set_item("action_dim", m.action_dim)?;
    dict.set_item("feature_names", m.feature_names.clone())?;
    dict.set_item("action_ids", m.action_ids.clone())?;
    dict.set_item("max_turns", m.max_turns)?;
    dict.set_item("collected_at", m.collected_at)?;
    dict.set_item("success_rate", m.success_rate)?;
    dict.set_item("mean_episode_length", m.mean_episode_length)?;
    dict.set_item("mean_reward", m.mean_reward)?;
    Ok(dict.into())
}

/// Dataset generation with a built-in baseline policy.
#[pyclass]
pub struct TrajectoryCollector {
    inner: RustTrajectoryCollector,
    policy: String,
    policy_seed: u64,
}

#[pymethods]
impl TrajectoryCollector {
    /// Args:
    ///     num_envs: parallel environments (default: 4)
    ///     preset / config_path: as for Env
    ///     base_seed: seed of episode 0 (default: 42)
    ///     policy: "readiness" or "random" (default: "readiness")
    #[new]
    #[pyo3(signature = (num_envs=4, preset=None, config_path=None, base_seed=42, policy="readiness", policy_seed=0))]
    fn new(
        num_envs: usize,
        preset: Option<&str>,
        config_path: Option<&str>,
        base_seed: u64,
        policy: &str,
        policy_seed: u64,
    ) -> PyResult<Self> {
        if num_envs == 0 {
            return Err(PyValueError::new_err("num_envs must be > 0"));
        }
        if !matches!(policy, "readiness" | "random") {
            return Err(PyValueError::new_err(format!(
                "unknown policy: {policy}. Use 'readiness' or 'random'"
            )));
        }
        let store = load_store(preset, config_path)?;
        Ok(Self {
            inner: RustTrajectoryCollector::new(store, num_envs, base_seed),
            policy: policy.to_string(),
            policy_seed,
        })
    }

    /// Collect `num_episodes` episodes. Returns (records, metadata).
    fn collect(&self, py: Python<'_>, num_episodes: u32) -> PyResult<(Vec<Py<PyDict>>, Py<PyDict>)> {
        let seed = self.policy_seed;
        let random = self.policy == "random";
        let make = move || -> Box<dyn Policy> {
            if random {
                Box::new(RandomPolicy::new(seed))
            } else {
                Box::new(ReadinessPolicy::new())
            }
        };
        let (records, metadata) = self.inner.collect(num_episodes, make).map_err(env_err)?;
        let py_records = records
            .iter()
            .map(|r| trajectory_record_to_dict(py, r))
            .collect::<PyResult<Vec<_>>>()?;
        Ok((py_records, trajectory_metadata_to_dict(py, &metadata)?))
    }
}

#[pyfunction]
fn obs_version() -> u32 {
    OBS_VERSION
}

#[pyfunction]
fn trajectory_version() -> u32 {
    TRAJECTORY_VERSION
}

#[pyfunction]
fn presets() -> Vec<&'static str> {
    Preset::ALL.iter().map(|p| p.as_str()).collect()
}

#[pymodule]
fn salesgym_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add_class::<Env>()?;
    m.add_class::<VecEnv>()?;
    m.add_class::<TrajectoryCollector>()?;
    m.add("SalesGymError", py.get_type_bound::<SalesGymError>())?;
    m.add("ConfigError", py.get_type_bound::<ConfigError>())?;
    m.add("EnvError", py.get_type_bound::<EnvError>())?;
    m.add("InvalidActionError", py.get_type_bound::<InvalidActionError>())?;
    m.add("EpisodeEndedError", py.get_type_bound::<EpisodeEndedError>())?;
    m.add_function(wrap_pyfunction!(obs_version, m)?)?;
    m.add_function(wrap_pyfunction!(trajectory_version, m)?)?;
    m.add_function(wrap_pyfunction!(presets, m)?)?;
    Ok(())
}
