//! Run configuration, read from TOML, and project directory layout.
//!
//! A complete configuration file looks like
//! ```toml
//! [data]
//! input_file = "RoyCoord.xyz"
//! output_file = "cce_result.npz"
//!
//! [center_spin]
//! name = "NV"
//! coordinate = [0.0, 0.0, 0.89175]
//! state_index0 = 1
//! state_index1 = 2
//!
//! [spin_bath]
//! method = "file"
//! cut_off_dist = 4.0
//! bath_state_seed = 1
//!
//! [lattice]
//! lattice_const = 3.57
//! isotope = "13C"
//! full_range = 20
//! root_range = 8
//!
//! [cce]
//! max_order = 4
//! variant = "ensemble"
//! workers = 4
//! tolerance = 1e-12
//! kernel = "pade"
//!
//! [dynamics]
//! n_time = 101
//! t0 = 0.0
//! t1 = 1.0
//!
//! [condition]
//! pulse_name = "CPMG"
//! pulse_number = 2
//! magnetic_field = [0.0, 0.0, 100.0]
//! ```
//! Every section and field may be omitted in favor of its default.

use std::{
    env,
    path::{ Path, PathBuf },
};
use serde::{ Deserialize, Serialize };
use crate::{
    error::{ CceError, CceResult },
    physics::{ CenterSpin, Dynamics, KernelMethod, PulseSequence },
    reduce::DEFAULT_TOLERANCE,
    spin::{ GAMMA_E, Isotope, SpinTotal },
};

/// Environment variable naming the project root.
pub const PROJECT_PATH_VAR: &str = "CCE_PROJ_PATH";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Bath coordinate file, relative to the input directory.
    pub input_file: Option<String>,
    /// Output archive, relative to the output directory.
    pub output_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { input_file: None, output_file: "cce_result.npz".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterSpinConfig {
    pub name: String,
    /// Position, in angstroms.
    pub coordinate: [f64; 3],
    /// Total spin quantum number.
    pub spin: f64,
    /// Gyromagnetic ratio, in rad ms^-1 G^-1.
    pub gamma: f64,
    pub state_index0: usize,
    pub state_index1: usize,
}

impl Default for CenterSpinConfig {
    fn default() -> Self {
        Self {
            name: "NV".to_string(),
            coordinate: [0.0; 3],
            spin: 1.0,
            gamma: GAMMA_E,
            state_index0: 1,
            state_index1: 2,
        }
    }
}

/// Source of bath spins.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BathMethod {
    /// Read coordinates from `data.input_file`; clusters by depth-first path
    /// tracing.
    #[default]
    File,
    /// Generate a 2D face-centered lattice; clusters rooted near the origin.
    Lattice,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinBathConfig {
    pub method: BathMethod,
    /// Connection cutoff, in angstroms.
    pub cut_off_dist: f64,
    /// Seed for single-sample bath states.
    pub bath_state_seed: u64,
}

impl Default for SpinBathConfig {
    fn default() -> Self {
        Self { method: BathMethod::File, cut_off_dist: 4.0, bath_state_seed: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    /// Lattice constant, in angstroms.
    pub lattice_const: f64,
    pub isotope: String,
    /// Half-width of the generated lattice, in unit cells.
    pub full_range: i64,
    /// Half-width of the root region, in unit cells.
    pub root_range: i64,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            lattice_const: 3.57,
            isotope: "13C".to_string(),
            full_range: 20,
            root_range: 8,
        }
    }
}

/// Which coherence model to evolve clusters with.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CceVariant {
    #[default]
    Ensemble,
    SingleSample,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CceSection {
    pub max_order: usize,
    pub variant: CceVariant,
    /// Number of cooperating ranks.
    pub workers: usize,
    /// Divisor magnitude below which reduction records an instability.
    pub tolerance: f64,
    pub kernel: KernelMethod,
}

impl Default for CceSection {
    fn default() -> Self {
        Self {
            max_order: 4,
            variant: CceVariant::Ensemble,
            workers: 1,
            tolerance: DEFAULT_TOLERANCE,
            kernel: KernelMethod::Pade,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    pub n_time: usize,
    /// Start time, in milliseconds.
    pub t0: f64,
    /// End time, in milliseconds.
    pub t1: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self { Self { n_time: 101, t0: 0.0, t1: 1.0 } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// One of `FID`, `Hahn`, or `CPMG`.
    pub pulse_name: String,
    pub pulse_number: usize,
    /// Static field, in gauss.
    pub magnetic_field: [f64; 3],
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            pulse_name: "Hahn".to_string(),
            pulse_number: 1,
            magnetic_field: [0.0, 0.0, 100.0],
        }
    }
}

/// Complete run configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CceConfig {
    pub data: DataConfig,
    pub center_spin: CenterSpinConfig,
    pub spin_bath: SpinBathConfig,
    pub lattice: LatticeConfig,
    pub cce: CceSection,
    pub dynamics: DynamicsConfig,
    pub condition: ConditionConfig,
}

impl CceConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> CceResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> CceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Check every parameter consumed by a run.
    pub fn validate(&self) -> CceResult<()> {
        if self.cce.max_order == 0 {
            return Err(CceError::config("cce.max_order must be positive"));
        }
        if self.cce.workers == 0 {
            return Err(CceError::config("cce.workers must be positive"));
        }
        if !(self.cce.tolerance > 0.0 && self.cce.tolerance.is_finite()) {
            return Err(CceError::config("cce.tolerance must be positive and finite"));
        }
        if !(self.spin_bath.cut_off_dist > 0.0) {
            return Err(CceError::config("spin_bath.cut_off_dist must be positive"));
        }
        match self.spin_bath.method {
            BathMethod::File if self.data.input_file.is_none() => {
                return Err(CceError::config(
                    "data.input_file is required for a file bath"));
            },
            BathMethod::Lattice => {
                if !(self.lattice.lattice_const > 0.0) {
                    return Err(CceError::config("lattice.lattice_const must be positive"));
                }
                if Isotope::lookup(&self.lattice.isotope).is_none() {
                    return Err(CceError::config(format!(
                        "unknown isotope '{}'", self.lattice.isotope)));
                }
                if self.lattice.full_range < 0 || self.lattice.root_range < 0 {
                    return Err(CceError::config("lattice ranges must be non-negative"));
                }
            },
            _ => { },
        }
        self.center_spin()?.projections()?;
        self.pulse_sequence()?;
        self.dynamics()?;
        Ok(())
    }

    /// The configured dynamical decoupling sequence.
    pub fn pulse_sequence(&self) -> CceResult<PulseSequence> {
        PulseSequence::from_name(&self.condition.pulse_name, self.condition.pulse_number)
    }

    /// Sample times, field, sequence, and kernel.
    pub fn dynamics(&self) -> CceResult<Dynamics> {
        Dynamics::new(
            self.condition.magnetic_field,
            self.pulse_sequence()?,
            self.cce.kernel,
            self.dynamics.t0,
            self.dynamics.t1,
            self.dynamics.n_time,
        )
    }

    /// The configured central spin.
    pub fn center_spin(&self) -> CceResult<CenterSpin> {
        let c = &self.center_spin;
        if c.spin <= 0.0 || (2.0 * c.spin).fract() != 0.0 {
            return Err(CceError::config(format!(
                "center spin must be a positive half-integer; got {}", c.spin)));
        }
        Ok(CenterSpin::new(
            &c.name,
            c.coordinate,
            SpinTotal::from_f64(c.spin),
            c.gamma,
            [c.state_index0, c.state_index1],
        ))
    }
}

/// Standard directories beneath a project root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
}

impl ProjectPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let dat = root.join("dat");
        Self {
            input: dat.join("input"),
            output: dat.join("output"),
            config: dat.join("config"),
            log: dat.join("log"),
            root,
        }
    }

    /// Use `$CCE_PROJ_PATH` if set, otherwise the working directory.
    pub fn from_env() -> CceResult<Self> {
        match env::var_os(PROJECT_PATH_VAR) {
            Some(root) => Ok(Self::new(root)),
            None => Ok(Self::new(env::current_dir()?)),
        }
    }

    /// Resolve a configuration file name against the config directory, unless
    /// it is already a path that exists.
    pub fn config_file<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        let name = name.as_ref();
        if name.exists() { name.to_path_buf() } else { self.config.join(name) }
    }

    pub fn input_file<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.input.join(name)
    }

    pub fn output_file<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.output.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = CceConfig::from_toml(r#"
            [data]
            input_file = "bath.xyz"

            [cce]
            max_order = 3
            variant = "single_sample"

            [condition]
            pulse_name = "CPMG"
            pulse_number = 4
        "#).unwrap();
        assert_eq!(cfg.cce.max_order, 3);
        assert_eq!(cfg.cce.variant, CceVariant::SingleSample);
        assert_eq!(cfg.cce.workers, 1);
        assert_eq!(cfg.cce.kernel, KernelMethod::Pade);
        assert_eq!(cfg.spin_bath.method, BathMethod::File);
        assert_eq!(cfg.pulse_sequence().unwrap(), PulseSequence::Cpmg(4));
        assert_eq!(cfg.dynamics().unwrap().time.len(), 101);
        cfg.validate().unwrap();
    }

    #[test]
    fn invalid_parameters_rejected() {
        let mut cfg = CceConfig::default();
        cfg.data.input_file = Some("bath.xyz".to_string());
        cfg.validate().unwrap();

        let mut bad = cfg.clone();
        bad.cce.max_order = 0;
        assert!(matches!(bad.validate(), Err(CceError::Config(_))));

        let mut bad = cfg.clone();
        bad.spin_bath.cut_off_dist = -1.0;
        assert!(bad.validate().is_err());

        let mut bad = cfg.clone();
        bad.cce.workers = 0;
        assert!(bad.validate().is_err());

        let mut bad = cfg.clone();
        bad.data.input_file = None;
        assert!(bad.validate().is_err());

        let mut bad = cfg.clone();
        bad.condition.pulse_name = "ramsey".to_string();
        assert!(bad.validate().is_err());

        let mut bad = cfg.clone();
        bad.center_spin.state_index1 = 3;
        assert!(bad.validate().is_err());

        for tol in [0.0, -1e-12, f64::NAN, f64::INFINITY] {
            let mut bad = cfg.clone();
            bad.cce.tolerance = tol;
            assert!(matches!(bad.validate(), Err(CceError::Config(_))));
        }
    }

    #[test]
    fn unknown_field_values_fail_to_parse() {
        assert!(matches!(
            CceConfig::from_toml("[cce]\nvariant = \"quantum\"\n"),
            Err(CceError::Toml(_)),
        ));
    }

    #[test]
    fn project_layout() {
        let paths = ProjectPaths::new("/tmp/cce");
        assert_eq!(paths.input, PathBuf::from("/tmp/cce/dat/input"));
        assert_eq!(paths.output_file("r.npz"), PathBuf::from("/tmp/cce/dat/output/r.npz"));
        assert_eq!(paths.config_file("run.toml"), PathBuf::from("/tmp/cce/dat/config/run.toml"));
    }
}
