//! Versioned snapshot schema for population state.

use serde::{Deserialize, Serialize};

use crate::compute::{Gene, GenomeError, Network, NeuronId, Species};
use crate::schema::{MutationRates, NeatConfig};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
    #[error("Invalid genome in snapshot: {0}")]
    Genome(#[from] GenomeError),
    #[error("No snapshot for generation {0}")]
    Missing(u32),
}

/// One generation of a population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub version: u32,
    pub generation: u32,
    /// Last innovation id handed out.
    pub innovation_counter: u64,
    /// Best fitness of the generation that bred this one.
    pub best_fitness: f64,
    pub population_size: usize,
    pub input_size: usize,
    pub output_size: usize,
    pub species: Vec<SpeciesSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSnapshot {
    pub best_fitness_ever: f64,
    pub stale_generations: u32,
    pub adjusted_fitness: f64,
    pub networks: Vec<NetworkSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub fitness: f64,
    pub ranking: u32,
    pub input_size: usize,
    pub output_size: usize,
    pub next_neuron_id: NeuronId,
    pub mutation_rates: MutationRates,
    pub genes: Vec<Gene>,
}

impl PopulationSnapshot {
    /// Capture population state.
    pub fn capture(
        generation: u32,
        innovation_counter: u64,
        best_fitness: f64,
        config: &NeatConfig,
        species: &[Species],
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            generation,
            innovation_counter,
            best_fitness,
            population_size: config.population_size,
            input_size: config.input_size,
            output_size: config.output_size,
            species: species.iter().map(SpeciesSnapshot::from).collect(),
        }
    }

    /// Serialize to JSON.
    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse JSON, rejecting missing fields and unknown versions.
    pub fn decode(text: &str) -> Result<Self, StoreError> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Validate and convert into live species.
    pub fn into_species(self) -> Result<Vec<Species>, StoreError> {
        if self.species.is_empty() {
            return Err(StoreError::Inconsistent("no species".into()));
        }

        let networks: usize = self.species.iter().map(|s| s.networks.len()).sum();
        if networks != self.population_size {
            return Err(StoreError::Inconsistent(format!(
                "{networks} networks stored for population of {}",
                self.population_size
            )));
        }

        let interface = (self.input_size, self.output_size);
        if let Some(network) = self
            .species
            .iter()
            .flat_map(|s| &s.networks)
            .find(|n| (n.input_size, n.output_size) != interface)
        {
            return Err(StoreError::Inconsistent(format!(
                "network with {} inputs and {} outputs in a {}x{} population",
                network.input_size, network.output_size, interface.0, interface.1
            )));
        }

        self.species.into_iter().map(Species::try_from).collect()
    }
}

impl From<&Network> for NetworkSnapshot {
    fn from(network: &Network) -> Self {
        Self {
            fitness: network.fitness(),
            ranking: network.rank(),
            input_size: network.input_size(),
            output_size: network.output_size(),
            next_neuron_id: network.next_neuron_id(),
            mutation_rates: *network.mutation_rates(),
            genes: network.genes().to_vec(),
        }
    }
}

impl TryFrom<NetworkSnapshot> for Network {
    type Error = GenomeError;

    fn try_from(snapshot: NetworkSnapshot) -> Result<Self, Self::Error> {
        Network::from_parts(
            snapshot.genes,
            snapshot.input_size,
            snapshot.output_size,
            snapshot.next_neuron_id,
            snapshot.mutation_rates,
            snapshot.fitness,
            snapshot.ranking,
        )
    }
}

impl From<&Species> for SpeciesSnapshot {
    fn from(species: &Species) -> Self {
        Self {
            best_fitness_ever: species.best_fitness_ever(),
            stale_generations: species.stale_generations(),
            adjusted_fitness: species.adjusted_fitness(),
            networks: species.members().iter().map(NetworkSnapshot::from).collect(),
        }
    }
}

impl TryFrom<SpeciesSnapshot> for Species {
    type Error = StoreError;

    fn try_from(snapshot: SpeciesSnapshot) -> Result<Self, Self::Error> {
        if snapshot.networks.is_empty() {
            return Err(StoreError::Inconsistent("species without networks".into()));
        }
        let members = snapshot
            .networks
            .into_iter()
            .map(Network::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Species::from_parts(
            members,
            snapshot.best_fitness_ever,
            snapshot.stale_generations,
            snapshot.adjusted_fitness,
        ))
    }
}
