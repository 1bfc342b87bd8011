//! Connection genes and historical markings.

use serde::{Deserialize, Serialize};

use super::rng::NeatRng;

/// Neuron identifier: inputs first, then outputs, then hidden neurons.
pub type NeuronId = usize;

/// Allocator for innovation ids.
///
/// Ids start at 1 and only ever grow. Owned by the population and passed into
/// every call site that mints a gene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InnovationCounter {
    last: u64,
}

impl InnovationCounter {
    /// Resume from the last id handed out.
    pub fn starting_after(last: u64) -> Self {
        Self { last }
    }

    /// Mint a fresh id.
    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last id handed out (0 if none).
    pub fn current(&self) -> u64 {
        self.last
    }

    /// Make sure `id` is never handed out again.
    pub fn observe(&mut self, id: u64) {
        self.last = self.last.max(id);
    }
}

/// A directed, weighted connection between two neurons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub into: NeuronId,
    pub out: NeuronId,
    pub weight: f64,
    pub enabled: bool,
    pub innovation: u64,
}

impl Gene {
    /// New enabled gene with a random weight and a fresh innovation id.
    pub fn create(
        into: NeuronId,
        out: NeuronId,
        weight_bound: f64,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Self {
        Self {
            into,
            out,
            weight: rng.weight(weight_bound),
            enabled: true,
            innovation: innovations.next(),
        }
    }

    /// Duplicate this gene.
    ///
    /// Inherited genes keep their innovation id so they still align in later
    /// crossovers; structural mutations mint a new one.
    pub fn copy(&self, preserve_innovation: bool, innovations: &mut InnovationCounter) -> Self {
        let innovation = if preserve_innovation {
            self.innovation
        } else {
            innovations.next()
        };
        Self {
            innovation,
            ..self.clone()
        }
    }

    /// The `(into, out)` pair identifying this edge in the topology.
    pub fn link(&self) -> (NeuronId, NeuronId) {
        (self.into, self.out)
    }
}
