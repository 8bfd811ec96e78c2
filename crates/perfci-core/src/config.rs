//! Pipeline configuration.
//!
//! [`ProcessConfig`] is immutable and can only be obtained from
//! [`ProcessConfigBuilder::build`], which rejects invalid combinations before
//! any remote work is dispatched. [`ProcessConfigFile`] loads the same
//! settings from a `perfci.toml` file.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{Revision, RevisionPair};
use crate::error::{PerfCiError, Result};

/// Default significance level used when none (or `0.0`) is configured.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.01;
/// Fixed type-2 error of the measurement.
pub const DEFAULT_TYPE2_ERROR: f64 = 0.01;
/// Default per-test measurement timeout in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 5;
/// Default wall-clock budget for the whole Measure dispatch (6 hours).
pub const DEFAULT_MEASURE_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Root-cause analysis strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RcaStrategy {
    /// Measure the whole call tree at once.
    Complete,
    /// Descend the call tree level by level.
    Levelwise,
    /// Reserved, not implemented.
    UntilSourceChange,
    /// Reserved, not implemented.
    UntilStructureChange,
}

impl RcaStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RcaStrategy::Complete => "COMPLETE",
            RcaStrategy::Levelwise => "LEVELWISE",
            RcaStrategy::UntilSourceChange => "UNTIL_SOURCE_CHANGE",
            RcaStrategy::UntilStructureChange => "UNTIL_STRUCTURE_CHANGE",
        }
    }

    pub fn is_implemented(&self) -> bool {
        matches!(self, RcaStrategy::Complete | RcaStrategy::Levelwise)
    }
}

impl std::fmt::Display for RcaStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RcaStrategy {
    type Err = PerfCiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "COMPLETE" => Ok(RcaStrategy::Complete),
            "LEVELWISE" => Ok(RcaStrategy::Levelwise),
            "UNTIL_SOURCE_CHANGE" => Ok(RcaStrategy::UntilSourceChange),
            "UNTIL_STRUCTURE_CHANGE" => Ok(RcaStrategy::UntilStructureChange),
            other => Err(PerfCiError::config(format!("unknown RCA strategy: {}", other))),
        }
    }
}

/// How VM runs of the two revisions are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStrategy {
    Sequential,
    Parallel,
}

/// Monitoring record written by the instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    OperationExecution,
    ReducedOperationExecution,
}

/// Measurement parameters forwarded to the measurement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub vms: u32,
    pub iterations: u32,
    pub warmup: u32,
    pub repetitions: u32,
    /// Per-test timeout in milliseconds.
    pub timeout_ms: u64,
    pub significance_level: f64,
    pub type2_error: f64,
    pub use_gc: bool,
    pub early_stop: bool,
    pub strategy: MeasurementStrategy,
    pub use_source_instrumentation: bool,
    pub use_selective_instrumentation: bool,
    pub use_circular_queue: bool,
    pub use_sampling: bool,
    pub record: RecordType,
    pub execute_before_class_in_measurement: bool,
    pub revisions: RevisionPair,
    pub includes: Vec<String>,
}

impl MeasurementConfig {
    /// The changed revision.
    pub fn version(&self) -> &Revision {
        &self.revisions.new
    }

    /// The baseline revision.
    pub fn version_old(&self) -> &Revision {
        &self.revisions.old
    }
}

/// Dependency-analysis (test selection) parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub threads: u32,
    pub do_not_update_dependencies: bool,
    pub generate_coverage_selection: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            do_not_update_dependencies: false,
            generate_coverage_selection: true,
        }
    }
}

/// Environment variables passed to the measured processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentVariables {
    vars: BTreeMap<String, String>,
}

impl EnvironmentVariables {
    /// Parse whitespace-separated `KEY=VALUE` tokens. Tokens without `=` are
    /// ignored.
    pub fn parse(properties: &str) -> Self {
        let vars = properties
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self { vars }
    }

    /// Merge `vars` over the current entries.
    pub fn merge<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.vars.insert(key.into(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Parameters of the root-cause search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseSearcherConfig {
    pub use_aggregation: bool,
    pub save_all: bool,
    /// Call-tree nodes faster than this (ms) are not measured further.
    pub min_time: f64,
    pub split_aggregated: bool,
    pub ignore_eois: bool,
    pub strategy: RcaStrategy,
    pub levels: u32,
}

impl CauseSearcherConfig {
    pub fn new(strategy: RcaStrategy) -> Self {
        Self {
            use_aggregation: true,
            save_all: true,
            min_time: 0.01,
            split_aggregated: false,
            ignore_eois: true,
            strategy,
            levels: 1,
        }
    }
}

/// Immutable configuration of one pipeline run.
///
/// Deserialization runs the same checks as [`ProcessConfigBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrozenConfig")]
pub struct ProcessConfig {
    job_name: String,
    update_snapshot_dependencies: bool,
    measurement: MeasurementConfig,
    dependency: DependencyConfig,
    env_vars: EnvironmentVariables,
    execute_rca: bool,
    rca_strategy: RcaStrategy,
    measure_timeout_secs: u64,
    display_rts_logs: bool,
    display_logs: bool,
    display_rca_logs: bool,
}

impl ProcessConfig {
    pub fn builder(job_name: impl Into<String>) -> ProcessConfigBuilder {
        ProcessConfigBuilder::new(job_name)
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn update_snapshot_dependencies(&self) -> bool {
        self.update_snapshot_dependencies
    }

    pub fn measurement(&self) -> &MeasurementConfig {
        &self.measurement
    }

    pub fn dependency(&self) -> &DependencyConfig {
        &self.dependency
    }

    pub fn env_vars(&self) -> &EnvironmentVariables {
        &self.env_vars
    }

    pub fn revisions(&self) -> &RevisionPair {
        &self.measurement.revisions
    }

    pub fn execute_rca(&self) -> bool {
        self.execute_rca
    }

    pub fn rca_strategy(&self) -> RcaStrategy {
        self.rca_strategy
    }

    pub fn cause_searcher_config(&self) -> CauseSearcherConfig {
        CauseSearcherConfig::new(self.rca_strategy)
    }

    /// Wall-clock budget of the Measure dispatch; `None` means unbounded.
    pub fn measure_timeout(&self) -> Option<Duration> {
        (self.measure_timeout_secs > 0).then(|| Duration::from_secs(self.measure_timeout_secs))
    }

    pub fn display_rts_logs(&self) -> bool {
        self.display_rts_logs
    }

    pub fn display_logs(&self) -> bool {
        self.display_logs
    }

    pub fn display_rca_logs(&self) -> bool {
        self.display_rca_logs
    }

    /// Checks that must hold for every frozen configuration, however it was
    /// obtained.
    fn validate(self) -> Result<Self> {
        if self.job_name.trim().is_empty() {
            return Err(PerfCiError::config("job_name cannot be empty"));
        }
        let measurement = &self.measurement;
        if measurement.revisions.new == measurement.revisions.old {
            return Err(PerfCiError::config(format!(
                "the revision difference should be at least 1, but both revisions are {}",
                measurement.revisions.new
            )));
        }
        if measurement.use_sampling && !measurement.use_source_instrumentation {
            return Err(PerfCiError::config(
                "sampling may only be used together with source instrumentation",
            ));
        }
        if measurement.vms == 0 {
            return Err(PerfCiError::config("vms must be > 0"));
        }
        if measurement.iterations == 0 {
            return Err(PerfCiError::config("iterations must be > 0"));
        }
        if !(measurement.significance_level > 0.0 && measurement.significance_level < 1.0) {
            return Err(PerfCiError::config(format!(
                "significance_level must be in (0, 1), was {}",
                measurement.significance_level
            )));
        }
        if self.execute_rca && !self.rca_strategy.is_implemented() {
            return Err(PerfCiError::config(format!(
                "RCA strategy {} is not implemented",
                self.rca_strategy
            )));
        }
        Ok(self)
    }

    /// Stable SHA-256 of the measurement-relevant settings.
    ///
    /// Environment variables are excluded because CI hosts inject per-run
    /// values.
    pub fn digest(&self) -> Result<String> {
        let canonical = serde_json::json!({
            "measurement": &self.measurement,
            "dependency": &self.dependency,
            "execute_rca": self.execute_rca,
            "rca_strategy": self.rca_strategy,
        });
        let bytes = serde_json::to_vec(&canonical)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Wire form of [`ProcessConfig`]; only reachable through `validate`.
#[derive(Deserialize)]
struct FrozenConfig {
    job_name: String,
    update_snapshot_dependencies: bool,
    measurement: MeasurementConfig,
    dependency: DependencyConfig,
    env_vars: EnvironmentVariables,
    execute_rca: bool,
    rca_strategy: RcaStrategy,
    measure_timeout_secs: u64,
    display_rts_logs: bool,
    display_logs: bool,
    display_rca_logs: bool,
}

impl TryFrom<FrozenConfig> for ProcessConfig {
    type Error = PerfCiError;

    fn try_from(frozen: FrozenConfig) -> Result<Self> {
        ProcessConfig {
            job_name: frozen.job_name,
            update_snapshot_dependencies: frozen.update_snapshot_dependencies,
            measurement: frozen.measurement,
            dependency: frozen.dependency,
            env_vars: frozen.env_vars,
            execute_rca: frozen.execute_rca,
            rca_strategy: frozen.rca_strategy,
            measure_timeout_secs: frozen.measure_timeout_secs,
            display_rts_logs: frozen.display_rts_logs,
            display_logs: frozen.display_logs,
            display_rca_logs: frozen.display_rca_logs,
        }
        .validate()
    }
}

/// Validating builder for [`ProcessConfig`].
#[derive(Debug, Clone)]
pub struct ProcessConfigBuilder {
    job_name: String,
    vms: u32,
    iterations: u32,
    warmup: u32,
    repetitions: u32,
    timeout_minutes: u64,
    significance_level: f64,
    revision_diff: u32,
    use_gc: bool,
    includes: String,
    properties: String,
    ci_env: Vec<(String, String)>,
    execute_rca: bool,
    rca_strategy: RcaStrategy,
    execute_parallel: bool,
    execute_before_class_in_measurement: bool,
    use_source_instrumentation: bool,
    use_sampling: bool,
    update_snapshot_dependencies: bool,
    dependency: DependencyConfig,
    measure_timeout_secs: u64,
    display_rts_logs: bool,
    display_logs: bool,
    display_rca_logs: bool,
}

impl ProcessConfigBuilder {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            vms: 30,
            iterations: 5,
            warmup: 5,
            repetitions: 1000,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            revision_diff: 1,
            use_gc: false,
            includes: String::new(),
            properties: String::new(),
            ci_env: Vec::new(),
            execute_rca: true,
            rca_strategy: RcaStrategy::Levelwise,
            execute_parallel: false,
            execute_before_class_in_measurement: false,
            use_source_instrumentation: true,
            use_sampling: true,
            update_snapshot_dependencies: true,
            dependency: DependencyConfig::default(),
            measure_timeout_secs: DEFAULT_MEASURE_TIMEOUT_SECS,
            display_rts_logs: false,
            display_logs: true,
            display_rca_logs: false,
        }
    }

    pub fn vms(mut self, vms: u32) -> Self {
        self.vms = vms;
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn warmup(mut self, warmup: u32) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = minutes;
        self
    }

    pub fn significance_level(mut self, level: f64) -> Self {
        self.significance_level = level;
        self
    }

    pub fn revision_diff(mut self, diff: u32) -> Self {
        self.revision_diff = diff;
        self
    }

    pub fn use_gc(mut self, use_gc: bool) -> Self {
        self.use_gc = use_gc;
        self
    }

    /// Semicolon-separated include patterns; whitespace is stripped.
    pub fn includes(mut self, includes: impl Into<String>) -> Self {
        self.includes = includes.into();
        self
    }

    /// Whitespace-separated `KEY=VALUE` properties for the measured processes.
    pub fn properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = properties.into();
        self
    }

    /// Environment of the CI host, merged over `properties`.
    pub fn ci_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.ci_env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn execute_rca(mut self, execute_rca: bool) -> Self {
        self.execute_rca = execute_rca;
        self
    }

    pub fn rca_strategy(mut self, strategy: RcaStrategy) -> Self {
        self.rca_strategy = strategy;
        self
    }

    pub fn execute_parallel(mut self, parallel: bool) -> Self {
        self.execute_parallel = parallel;
        self
    }

    pub fn execute_before_class_in_measurement(mut self, value: bool) -> Self {
        self.execute_before_class_in_measurement = value;
        self
    }

    pub fn use_source_instrumentation(mut self, value: bool) -> Self {
        self.use_source_instrumentation = value;
        self
    }

    pub fn use_sampling(mut self, value: bool) -> Self {
        self.use_sampling = value;
        self
    }

    pub fn update_snapshot_dependencies(mut self, value: bool) -> Self {
        self.update_snapshot_dependencies = value;
        self
    }

    pub fn dependency(mut self, dependency: DependencyConfig) -> Self {
        self.dependency = dependency;
        self
    }

    /// Wall-clock budget of the Measure dispatch in seconds; `0` disables it.
    pub fn measure_timeout_secs(mut self, secs: u64) -> Self {
        self.measure_timeout_secs = secs;
        self
    }

    pub fn display_logs(mut self, rts: bool, measurement: bool, rca: bool) -> Self {
        self.display_rts_logs = rts;
        self.display_logs = measurement;
        self.display_rca_logs = rca;
        self
    }

    fn include_list(&self) -> Vec<String> {
        let stripped: String = self.includes.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.is_empty() {
            return Vec::new();
        }
        stripped
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<ProcessConfig> {
        if self.revision_diff == 0 {
            return Err(PerfCiError::config(format!(
                "the revision difference should be at least 1, but was {}",
                self.revision_diff
            )));
        }
        let timeout_ms = self.timeout_minutes.checked_mul(60_000).ok_or_else(|| {
            PerfCiError::config(format!(
                "timeout of {} minutes is out of range",
                self.timeout_minutes
            ))
        })?;

        let significance_level = if self.significance_level == 0.0 {
            DEFAULT_SIGNIFICANCE_LEVEL
        } else {
            self.significance_level
        };

        let includes = self.include_list();
        let env_vars = EnvironmentVariables::parse(&self.properties).merge(self.ci_env);

        let measurement = MeasurementConfig {
            vms: self.vms,
            iterations: self.iterations,
            warmup: self.warmup,
            repetitions: self.repetitions,
            timeout_ms,
            significance_level,
            type2_error: DEFAULT_TYPE2_ERROR,
            use_gc: self.use_gc,
            early_stop: false,
            strategy: if self.execute_parallel {
                MeasurementStrategy::Parallel
            } else {
                MeasurementStrategy::Sequential
            },
            use_source_instrumentation: self.use_source_instrumentation,
            use_selective_instrumentation: self.use_source_instrumentation,
            use_circular_queue: self.use_source_instrumentation,
            use_sampling: self.use_sampling,
            record: if self.use_sampling {
                RecordType::ReducedOperationExecution
            } else {
                RecordType::OperationExecution
            },
            execute_before_class_in_measurement: self.execute_before_class_in_measurement,
            revisions: RevisionPair::new(Revision::head(), Revision::head_minus(self.revision_diff)),
            includes,
        };

        ProcessConfig {
            job_name: self.job_name,
            update_snapshot_dependencies: self.update_snapshot_dependencies,
            measurement,
            dependency: self.dependency,
            env_vars,
            execute_rca: self.execute_rca,
            rca_strategy: self.rca_strategy,
            measure_timeout_secs: self.measure_timeout_secs,
            display_rts_logs: self.display_rts_logs,
            display_logs: self.display_logs,
            display_rca_logs: self.display_rca_logs,
        }
        .validate()
    }
}

/// Settings read from a `perfci.toml` file. Every field is optional; unset
/// fields keep the builder defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfigFile {
    pub job_name: Option<String>,
    pub vms: Option<u32>,
    pub iterations: Option<u32>,
    pub warmup: Option<u32>,
    pub repetitions: Option<u32>,
    pub timeout_minutes: Option<u64>,
    pub significance_level: Option<f64>,
    pub revision_diff: Option<u32>,
    pub use_gc: Option<bool>,
    pub includes: Option<String>,
    pub properties: Option<String>,
    pub execute_parallel: Option<bool>,
    pub use_source_instrumentation: Option<bool>,
    pub use_sampling: Option<bool>,
    pub measure_timeout_secs: Option<u64>,
    pub rca: RcaSection,
    pub dependency: Option<DependencyConfig>,
}

/// `[rca]` table of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaSection {
    pub enabled: Option<bool>,
    pub strategy: Option<RcaStrategy>,
}

impl ProcessConfigFile {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Turn the file into a builder. `job_name` wins over the file's value
    /// when given.
    pub fn into_builder(self, job_name: Option<String>) -> ProcessConfigBuilder {
        let name = job_name.or(self.job_name).unwrap_or_default();
        let mut builder = ProcessConfigBuilder::new(name);
        if let Some(v) = self.vms {
            builder = builder.vms(v);
        }
        if let Some(v) = self.iterations {
            builder = builder.iterations(v);
        }
        if let Some(v) = self.warmup {
            builder = builder.warmup(v);
        }
        if let Some(v) = self.repetitions {
            builder = builder.repetitions(v);
        }
        if let Some(v) = self.timeout_minutes {
            builder = builder.timeout_minutes(v);
        }
        if let Some(v) = self.significance_level {
            builder = builder.significance_level(v);
        }
        if let Some(v) = self.revision_diff {
            builder = builder.revision_diff(v);
        }
        if let Some(v) = self.use_gc {
            builder = builder.use_gc(v);
        }
        if let Some(v) = self.includes {
            builder = builder.includes(v);
        }
        if let Some(v) = self.properties {
            builder = builder.properties(v);
        }
        if let Some(v) = self.execute_parallel {
            builder = builder.execute_parallel(v);
        }
        if let Some(v) = self.use_source_instrumentation {
            builder = builder.use_source_instrumentation(v);
        }
        if let Some(v) = self.use_sampling {
            builder = builder.use_sampling(v);
        }
        if let Some(v) = self.measure_timeout_secs {
            builder = builder.measure_timeout_secs(v);
        }
        if let Some(v) = self.rca.enabled {
            builder = builder.execute_rca(v);
        }
        if let Some(v) = self.rca.strategy {
            builder = builder.rca_strategy(v);
        }
        if let Some(v) = self.dependency {
            builder = builder.dependency(v);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = ProcessConfig::builder("demo").build().expect("build");
        assert_eq!(config.job_name(), "demo");
        assert_eq!(config.revisions().new.as_str(), "HEAD");
        assert_eq!(config.revisions().old.as_str(), "HEAD~1");
        assert_eq!(config.measurement().timeout_ms, 5 * 60 * 1000);
        assert!(config.execute_rca());
        assert_eq!(config.rca_strategy(), RcaStrategy::Levelwise);
        assert!(!config.measurement().early_stop);
    }

    #[test]
    fn test_revision_diff_zero_rejected() {
        let err = ProcessConfig::builder("demo").revision_diff(0).build().unwrap_err();
        assert!(matches!(err, PerfCiError::Config(_)));
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_sampling_without_instrumentation_rejected() {
        let err = ProcessConfig::builder("demo")
            .use_source_instrumentation(false)
            .use_sampling(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("sampling"));
    }

    #[test]
    fn test_no_instrumentation_without_sampling_ok() {
        let config = ProcessConfig::builder("demo")
            .use_source_instrumentation(false)
            .use_sampling(false)
            .build()
            .expect("build");
        assert!(!config.measurement().use_selective_instrumentation);
        assert!(!config.measurement().use_circular_queue);
        assert_eq!(config.measurement().record, RecordType::OperationExecution);
    }

    #[test]
    fn test_sampling_selects_reduced_record() {
        let config = ProcessConfig::builder("demo").build().expect("build");
        assert!(config.measurement().use_selective_instrumentation);
        assert_eq!(
            config.measurement().record,
            RecordType::ReducedOperationExecution
        );
    }

    #[test]
    fn test_empty_job_name_rejected() {
        assert!(ProcessConfig::builder("  ").build().is_err());
    }

    #[test]
    fn test_reserved_rca_strategies_rejected() {
        for strategy in [RcaStrategy::UntilSourceChange, RcaStrategy::UntilStructureChange] {
            let result = ProcessConfig::builder("demo").rca_strategy(strategy).build();
            assert!(result.is_err(), "{} should be rejected", strategy);
        }
        // Without RCA the strategy is never used.
        let config = ProcessConfig::builder("demo")
            .execute_rca(false)
            .rca_strategy(RcaStrategy::UntilSourceChange)
            .build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_zero_significance_level_normalised() {
        let config = ProcessConfig::builder("demo")
            .significance_level(0.0)
            .build()
            .expect("build");
        assert_eq!(config.measurement().significance_level, DEFAULT_SIGNIFICANCE_LEVEL);
        assert!(ProcessConfig::builder("demo").significance_level(1.5).build().is_err());
    }

    #[test]
    fn test_include_list_strips_whitespace() {
        let config = ProcessConfig::builder("demo")
            .includes(" com.foo.* ; com.bar.BarTest#test ;")
            .build()
            .expect("build");
        assert_eq!(
            config.measurement().includes,
            vec!["com.foo.*".to_string(), "com.bar.BarTest#test".to_string()]
        );

        let empty = ProcessConfig::builder("demo").includes("   ").build().unwrap();
        assert!(empty.measurement().includes.is_empty());
    }

    #[test]
    fn test_parallel_strategy() {
        let config = ProcessConfig::builder("demo").execute_parallel(true).build().unwrap();
        assert_eq!(config.measurement().strategy, MeasurementStrategy::Parallel);
    }

    #[test]
    fn test_env_vars_ci_env_overrides_properties() {
        let config = ProcessConfig::builder("demo")
            .properties("MAVEN_OPTS=-Xmx1g JAVA_HOME=/opt/jdk broken")
            .ci_env(vec![("JAVA_HOME", "/usr/lib/jvm"), ("BUILD_NUMBER", "7")])
            .build()
            .unwrap();
        let env = config.env_vars();
        assert_eq!(env.get("MAVEN_OPTS"), Some("-Xmx1g"));
        assert_eq!(env.get("JAVA_HOME"), Some("/usr/lib/jvm"));
        assert_eq!(env.get("BUILD_NUMBER"), Some("7"));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_digest_ignores_env_vars() {
        let a = ProcessConfig::builder("demo")
            .ci_env(vec![("BUILD_NUMBER", "1")])
            .build()
            .unwrap();
        let b = ProcessConfig::builder("demo")
            .ci_env(vec![("BUILD_NUMBER", "2")])
            .build()
            .unwrap();
        let c = ProcessConfig::builder("demo").vms(5).build().unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn test_measure_timeout_zero_is_unbounded() {
        let config = ProcessConfig::builder("demo").measure_timeout_secs(0).build().unwrap();
        assert!(config.measure_timeout().is_none());
        let config = ProcessConfig::builder("demo").measure_timeout_secs(90).build().unwrap();
        assert_eq!(config.measure_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_rca_strategy_from_str() {
        assert_eq!("levelwise".parse::<RcaStrategy>().unwrap(), RcaStrategy::Levelwise);
        assert_eq!("COMPLETE".parse::<RcaStrategy>().unwrap(), RcaStrategy::Complete);
        assert_eq!(
            "until-source-change".parse::<RcaStrategy>().unwrap(),
            RcaStrategy::UntilSourceChange
        );
        assert!("CONSTANT_LEVELS".parse::<RcaStrategy>().is_err());
    }

    #[test]
    fn test_config_file_into_builder() {
        let file = ProcessConfigFile::parse(
            r#"
            job_name = "from-file"
            vms = 10
            revision_diff = 2
            includes = "a.*;b.*"

            [rca]
            enabled = false
            strategy = "COMPLETE"
            "#,
        )
        .expect("parse");
        let config = file.into_builder(None).build().expect("build");
        assert_eq!(config.job_name(), "from-file");
        assert_eq!(config.measurement().vms, 10);
        assert_eq!(config.revisions().old.as_str(), "HEAD~2");
        assert!(!config.execute_rca());
        assert_eq!(config.rca_strategy(), RcaStrategy::Complete);
        assert_eq!(config.measurement().includes.len(), 2);
    }

    #[test]
    fn test_config_file_job_name_override() {
        let file = ProcessConfigFile::parse("job_name = \"file\"").unwrap();
        let config = file.into_builder(Some("cli".to_string())).build().unwrap();
        assert_eq!(config.job_name(), "cli");
    }

    #[test]
    fn test_config_file_rejects_unknown_strategy() {
        assert!(ProcessConfigFile::parse("[rca]\nstrategy = \"SOMETIMES\"").is_err());
    }

    #[test]
    fn test_timeout_minutes_overflow_rejected() {
        let err = ProcessConfig::builder("demo")
            .timeout_minutes(u64::MAX / 1000)
            .build()
            .unwrap_err();
        assert!(matches!(err, PerfCiError::Config(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_deserialize_round_trips_valid_config() {
        let config = ProcessConfig::builder("demo").vms(3).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProcessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_deserialize_rejects_what_builder_rejects() {
        let config = ProcessConfig::builder("demo").build().unwrap();
        let valid = serde_json::to_value(&config).unwrap();

        let mut same_revisions = valid.clone();
        same_revisions["measurement"]["revisions"]["old"] = serde_json::json!("HEAD");
        let mut sampling_only = valid.clone();
        sampling_only["measurement"]["use_source_instrumentation"] = serde_json::json!(false);
        let mut no_vms = valid.clone();
        no_vms["measurement"]["vms"] = serde_json::json!(0);
        let mut no_iterations = valid.clone();
        no_iterations["measurement"]["iterations"] = serde_json::json!(0);
        let mut bad_level = valid.clone();
        bad_level["measurement"]["significance_level"] = serde_json::json!(1.5);
        let mut reserved_strategy = valid.clone();
        reserved_strategy["rca_strategy"] = serde_json::json!("UNTIL_SOURCE_CHANGE");

        for invalid in [
            same_revisions,
            sampling_only,
            no_vms,
            no_iterations,
            bad_level,
            reserved_strategy,
        ] {
            let err = serde_json::from_value::<ProcessConfig>(invalid).unwrap_err();
            assert!(err.to_string().contains("invalid configuration"), "{}", err);
        }
    }

    #[test]
    fn test_cause_searcher_defaults() {
        let config = ProcessConfig::builder("demo")
            .rca_strategy(RcaStrategy::Complete)
            .build()
            .unwrap();
        let cause = config.cause_searcher_config();
        assert!(cause.use_aggregation);
        assert!(cause.save_all);
        assert!(!cause.split_aggregated);
        assert!(cause.ignore_eois);
        assert_eq!(cause.levels, 1);
        assert_eq!(cause.strategy, RcaStrategy::Complete);
    }
}
