//! Compute module - Genome encoding, evaluation and the evolutionary loop.
//!
//! # Overview
//!
//! - **Genes** (`gene`): connections tagged with innovation ids
//! - **Networks** (`network`): genomes and their genetic operators
//! - **Graphs** (`graph`): evaluable neuron graphs built from a genome
//! - **Species** (`species`): compatibility distance, clustering, stagnation
//! - **Population** (`population`): evaluation cursor and generation cycle

mod gene;
mod graph;
mod network;
mod population;
mod rng;
mod species;

pub use gene::{Gene, InnovationCounter, NeuronId};
pub use graph::{Edge, Neuron, NeuronGraph, sigmoid};
pub use network::{GenomeError, Network};
pub use population::{Cursor, Population, PopulationError};
pub use rng::NeatRng;
pub use species::{Species, distance, same_species, speciate};
