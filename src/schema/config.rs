//! Configuration types for NEAT populations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for an evolving population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    /// Number of networks alive in every generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of sensor (input) neurons.
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    /// Number of action (output) neurons.
    #[serde(default = "default_output_size")]
    pub output_size: usize,
    /// Genome encoding and mutation parameters.
    #[serde(default)]
    pub genome: GenomeConfig,
    /// Compatibility distance parameters.
    #[serde(default)]
    pub speciation: SpeciationConfig,
    /// Selection and offspring allocation parameters.
    #[serde(default)]
    pub reproduction: ReproductionConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Directory holding one snapshot per generation.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            input_size: default_input_size(),
            output_size: default_output_size(),
            genome: GenomeConfig::default(),
            speciation: SpeciationConfig::default(),
            reproduction: ReproductionConfig::default(),
            random_seed: None,
            save_path: None,
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_input_size() -> usize {
    9
}
fn default_output_size() -> usize {
    4
}

/// Genome encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeConfig {
    /// Fresh weights are drawn uniformly from `[-weight_bound, weight_bound]`.
    #[serde(default = "default_weight_bound")]
    pub weight_bound: f64,
    /// Disable the gene split by an add-neuron mutation.
    #[serde(default)]
    pub disable_split_gene: bool,
    /// Chance that a gene disabled in either parent stays disabled in the child.
    #[serde(default = "default_disabled_gene_inheritance")]
    pub disabled_gene_inheritance: f64,
    /// Initial adaptive mutation rates for new genomes.
    #[serde(default)]
    pub mutation_rates: MutationRates,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            weight_bound: default_weight_bound(),
            disable_split_gene: false,
            disabled_gene_inheritance: default_disabled_gene_inheritance(),
            mutation_rates: MutationRates::default(),
        }
    }
}

fn default_weight_bound() -> f64 {
    2.0
}
fn default_disabled_gene_inheritance() -> f64 {
    0.75
}

/// Per-genome adaptive mutation rates.
///
/// Every genome carries its own copy; [`NeatRng::jitter_rates`] nudges each
/// entry up or down before the genome mutates, so rates drift with lineage.
///
/// [`NeatRng::jitter_rates`]: crate::compute::NeatRng::jitter_rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    /// Chance of running the weight mutation at all.
    pub mutate_weight: f64,
    /// Per-gene chance of perturbing (instead of replacing) a weight.
    pub perturb: f64,
    /// Magnitude bound of a weight perturbation.
    pub perturb_bias: f64,
    /// Chance of adding a connection gene.
    pub mutate_gene: f64,
    /// Chance of splitting a gene with a new hidden neuron.
    pub mutate_neuron: f64,
    /// Chance of enabling a disabled gene.
    pub enable: f64,
    /// Chance of disabling an enabled gene.
    pub disable: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            mutate_weight: 0.5,
            perturb: 0.9,
            perturb_bias: 0.1,
            mutate_gene: 1.0,
            mutate_neuron: 0.5,
            enable: 0.2,
            disable: 0.4,
        }
    }
}

impl MutationRates {
    /// Multiplier applied when a rate shrinks.
    pub const DECAY: f64 = 0.95;
    /// Multiplier applied when a rate grows (inverse of `DECAY`).
    pub const GROWTH: f64 = 1.05263;

    /// All rates in their fixed iteration order.
    pub fn values_mut(&mut self) -> [&mut f64; 7] {
        [
            &mut self.mutate_weight,
            &mut self.perturb,
            &mut self.perturb_bias,
            &mut self.mutate_gene,
            &mut self.mutate_neuron,
            &mut self.enable,
            &mut self.disable,
        ]
    }
}

/// Compatibility distance parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciationConfig {
    /// Coefficient for disjoint and excess genes (C1).
    #[serde(default = "default_disjoint_coefficient")]
    pub disjoint_coefficient: f64,
    /// Coefficient for the mean weight difference of matching genes (C3).
    #[serde(default = "default_weight_coefficient")]
    pub weight_coefficient: f64,
    /// Networks closer than this share a species.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            disjoint_coefficient: default_disjoint_coefficient(),
            weight_coefficient: default_weight_coefficient(),
            threshold: default_threshold(),
        }
    }
}

fn default_disjoint_coefficient() -> f64 {
    1.5
}
fn default_weight_coefficient() -> f64 {
    0.4
}
fn default_threshold() -> f64 {
    1.7
}

/// Selection and offspring allocation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproductionConfig {
    /// Chance a child is bred by crossover instead of cloning.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Chance a crossover child takes its second parent from another species.
    #[serde(default = "default_interspecies_crossover_rate")]
    pub interspecies_crossover_rate: f64,
    /// Generations without improvement before a species goes extinct.
    #[serde(default = "default_stale_limit")]
    pub stale_limit: u32,
    /// Fraction of each species kept (by rank) before breeding.
    #[serde(default = "default_survival_fraction")]
    pub survival_fraction: f64,
    /// How networks are ranked before culling.
    #[serde(default)]
    pub ranking: RankingMode,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            crossover_rate: default_crossover_rate(),
            interspecies_crossover_rate: default_interspecies_crossover_rate(),
            stale_limit: default_stale_limit(),
            survival_fraction: default_survival_fraction(),
            ranking: RankingMode::default(),
        }
    }
}

fn default_crossover_rate() -> f64 {
    0.75
}
fn default_interspecies_crossover_rate() -> f64 {
    0.01
}
fn default_stale_limit() -> u32 {
    15
}
fn default_survival_fraction() -> f64 {
    0.5
}

/// Fitness ranking scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingMode {
    /// Rank every network against the whole population.
    #[default]
    Global,
    /// Rank networks only against their own species.
    PerSpecies,
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 1")]
    PopulationTooSmall,
    #[error("Input and output sizes must be non-zero")]
    EmptyInterface,
    #[error("Weight bound must be positive")]
    InvalidWeightBound,
    #[error("Speciation threshold must be positive")]
    InvalidThreshold,
    #[error("Stale limit must be non-zero")]
    InvalidStaleLimit,
    #[error("Probability {name} = {value} outside [0, 1]")]
    InvalidProbability { name: &'static str, value: f64 },
}

impl NeatConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.input_size == 0 || self.output_size == 0 {
            return Err(ConfigError::EmptyInterface);
        }
        if self.genome.weight_bound <= 0.0 || !self.genome.weight_bound.is_finite() {
            return Err(ConfigError::InvalidWeightBound);
        }
        if self.speciation.threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.reproduction.stale_limit == 0 {
            return Err(ConfigError::InvalidStaleLimit);
        }

        let check = |name: &'static str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability { name, value })
            }
        };

        check(
            "disabled_gene_inheritance",
            self.genome.disabled_gene_inheritance,
        )?;
        check("crossover_rate", self.reproduction.crossover_rate)?;
        check(
            "interspecies_crossover_rate",
            self.reproduction.interspecies_crossover_rate,
        )?;
        check("survival_fraction", self.reproduction.survival_fraction)?;

        Ok(())
    }
}
