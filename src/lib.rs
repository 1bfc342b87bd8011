//! NEAT neuroevolution - evolving variable topology networks.
//!
//! A population of networks is evolved by genetic encoding with historical
//! markings (innovation ids), clustered into species to protect topological
//! novelty, and advanced generation over generation by fitness-driven
//! reproduction.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration types
//! - `compute`: Genomes, neuron graphs, species and the population loop
//! - `store`: Versioned snapshots, one per generation
//!
//! # Example
//!
//! ```rust,no_run
//! use neat_lineage::{
//!     compute::Population,
//!     schema::NeatConfig,
//!     store::DirectoryStore,
//! };
//!
//! let config = NeatConfig {
//!     input_size: 3,
//!     output_size: 2,
//!     ..Default::default()
//! };
//! let store = DirectoryStore::new("./save");
//! let mut population = Population::open(config, Box::new(store)).unwrap();
//!
//! // The harness drives evaluation one network at a time.
//! loop {
//!     let action = population.evaluate(&[0.0, 1.0, 0.5]).unwrap();
//!     population.add_fitness(if action == 1 { 1.0 } else { -1.0 });
//!     population.advance().unwrap();
//!
//!     if population.generation() > 100 {
//!         break;
//!     }
//! }
//! ```

pub mod compute;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use compute::{Network, Population, PopulationError};
pub use schema::NeatConfig;
pub use store::{DirectoryStore, SnapshotStore};
