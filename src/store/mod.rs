//! Snapshot persistence for evolving populations.
//!
//! One record is written per generation, keyed by generation number. On
//! startup the record with the highest generation wins.
//!
//! # Record format
//!
//! ```text
//! {
//!   version, generation, innovation_counter, best_fitness,
//!   population_size, input_size, output_size,
//!   species: [{
//!     best_fitness_ever, stale_generations, adjusted_fitness,
//!     networks: [{
//!       fitness, ranking, input_size, output_size, next_neuron_id,
//!       mutation_rates: { mutate_weight, perturb, ... },
//!       genes: [{ into, out, weight, enabled, innovation }]
//!     }]
//!   }]
//! }
//! ```

mod directory;
mod memory;
mod snapshot;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;
pub use snapshot::{
    NetworkSnapshot, PopulationSnapshot, SNAPSHOT_VERSION, SpeciesSnapshot, StoreError,
};

/// Storage for per-generation snapshots.
pub trait SnapshotStore {
    /// Persist a record, replacing any record for the same generation.
    fn save(&mut self, snapshot: &PopulationSnapshot) -> Result<(), StoreError>;

    /// Stored generation numbers, ascending.
    fn generations(&self) -> Result<Vec<u32>, StoreError>;

    /// Load the record for `generation`.
    fn load(&self, generation: u32) -> Result<PopulationSnapshot, StoreError>;

    /// Load the record with the highest generation number, if any.
    fn load_latest(&self) -> Result<Option<PopulationSnapshot>, StoreError> {
        match self.generations()?.last() {
            Some(&generation) => self.load(generation).map(Some),
            None => Ok(None),
        }
    }

    /// `(generation, best fitness)` for every stored record.
    fn fitness_history(&self) -> Result<Vec<(u32, f64)>, StoreError> {
        self.generations()?
            .into_iter()
            .map(|generation| Ok((generation, self.load(generation)?.best_fitness)))
            .collect()
    }
}
