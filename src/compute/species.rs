//! Species: clusters of structurally similar networks.

use std::collections::{HashMap, HashSet};

use crate::schema::{GenomeConfig, SpeciationConfig};

use super::gene::{Gene, InnovationCounter};
use super::network::{GenomeError, Network};
use super::rng::NeatRng;

/// Gene sets smaller than this are not normalised by their size.
const SMALL_GENOME: usize = 10;

/// Compatibility distance between two gene sets.
///
/// `C1 * disjoint / N + C3 * mean |w_a - w_b|`, where disjoint counts innovation
/// ids present in exactly one set and `N` is the larger set size (1 for sets
/// under ten genes). Excess genes are counted as disjoint. The weight term
/// walks `b` looking up matches in `a`.
pub fn distance(a: &[Gene], b: &[Gene], config: &SpeciationConfig) -> f64 {
    let a_ids: HashSet<u64> = a.iter().map(|g| g.innovation).collect();
    let b_ids: HashSet<u64> = b.iter().map(|g| g.innovation).collect();

    let size = a.len().max(b.len());
    let norm = if size < SMALL_GENOME { 1 } else { size };
    let disjoint = a_ids.symmetric_difference(&b_ids).count() as f64 / norm as f64;

    let a_weights: HashMap<u64, f64> = a.iter().map(|g| (g.innovation, g.weight)).collect();
    let (sum, matching) = b
        .iter()
        .filter_map(|g| a_weights.get(&g.innovation).map(|w| (g.weight - w).abs()))
        .fold((0.0, 0usize), |(sum, n), diff| (sum + diff, n + 1));
    let weight_diff = if matching == 0 {
        0.0
    } else {
        sum / matching as f64
    };

    config.disjoint_coefficient * disjoint + config.weight_coefficient * weight_diff
}

/// Whether two networks are close enough to share a species.
pub fn same_species(a: &Network, b: &Network, config: &SpeciationConfig) -> bool {
    distance(a.genes(), b.genes(), config) < config.threshold
}

/// Place `network` into the first species whose sampled member is compatible,
/// founding a new species when none is.
///
/// One member per species is drawn at random, in species order, until a
/// match is found.
pub fn speciate(
    species: &mut Vec<Species>,
    network: Network,
    config: &SpeciationConfig,
    rng: &mut NeatRng,
) {
    for (idx, candidate) in species.iter_mut().enumerate() {
        if let Some(representative) = candidate.random_member(rng)
            && same_species(&network, representative, config)
        {
            log::trace!("network joins species {idx}");
            candidate.add(network);
            return;
        }
    }

    log::debug!("founding species {}", species.len());
    species.push(Species::new(network));
}

/// A cluster of networks sharing fitness and stagnation bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    members: Vec<Network>,
    best_fitness_ever: f64,
    stale_generations: u32,
    adjusted_fitness: f64,
}

impl Species {
    /// New species with a single founding member.
    pub fn new(founder: Network) -> Self {
        Self {
            members: vec![founder],
            best_fitness_ever: 0.0,
            stale_generations: 0,
            adjusted_fitness: 0.0,
        }
    }

    /// Restore a species from stored parts.
    pub fn from_parts(
        members: Vec<Network>,
        best_fitness_ever: f64,
        stale_generations: u32,
        adjusted_fitness: f64,
    ) -> Self {
        Self {
            members,
            best_fitness_ever,
            stale_generations,
            adjusted_fitness,
        }
    }

    pub fn members(&self) -> &[Network] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Network] {
        &mut self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn best_fitness_ever(&self) -> f64 {
        self.best_fitness_ever
    }

    pub fn stale_generations(&self) -> u32 {
        self.stale_generations
    }

    pub fn adjusted_fitness(&self) -> f64 {
        self.adjusted_fitness
    }

    pub fn add(&mut self, network: Network) {
        self.members.push(network);
    }

    /// Uniformly random member, `None` for an empty species.
    pub fn random_member(&self, rng: &mut NeatRng) -> Option<&Network> {
        if self.members.is_empty() {
            None
        } else {
            Some(&self.members[rng.index(self.members.len())])
        }
    }

    /// Best fitness among current members.
    pub fn generation_best(&self) -> Option<f64> {
        self.members.iter().map(Network::fitness).reduce(f64::max)
    }

    /// Update best-ever fitness and the stagnation counter from this
    /// generation's results. Returns the new counter.
    pub fn record_generation_result(&mut self) -> u32 {
        match self.generation_best() {
            Some(best) if best > self.best_fitness_ever => {
                self.best_fitness_ever = best;
                self.stale_generations = 0;
            }
            _ => self.stale_generations += 1,
        }
        self.stale_generations
    }

    /// Whether the species has stagnated for `limit` generations.
    pub fn is_stale(&self, limit: u32) -> bool {
        self.stale_generations >= limit
    }

    /// Mean member rank, stored as the species' offspring share weight.
    pub fn compute_adjusted_fitness(&mut self) -> f64 {
        self.adjusted_fitness = if self.members.is_empty() {
            0.0
        } else {
            let total: f64 = self.members.iter().map(|n| n.rank() as f64).sum();
            total / self.members.len() as f64
        };
        self.adjusted_fitness
    }

    /// Sort members best rank first.
    pub fn sort_by_rank(&mut self) {
        self.members.sort_by(|a, b| b.rank().cmp(&a.rank()));
    }

    /// Keep the `keep` best-ranked members, returning the rest.
    pub fn cull(&mut self, keep: usize) -> Vec<Network> {
        self.sort_by_rank();
        if keep >= self.members.len() {
            return Vec::new();
        }
        self.members.split_off(keep)
    }

    /// Breed one child from this species.
    ///
    /// With probability `crossover_rate` (and at least two members) two random
    /// members are crossed, otherwise a random member is cloned. The child is
    /// always mutated.
    pub fn make_child(
        &self,
        crossover_rate: f64,
        config: &GenomeConfig,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<Network, GenomeError> {
        let mut child = if self.members.len() > 1 && rng.chance(crossover_rate) {
            let mom = &self.members[rng.index(self.members.len())];
            let dad = &self.members[rng.index(self.members.len())];
            Network::crossover(mom, dad, config, rng)?
        } else {
            self.members[rng.index(self.members.len())].offspring()
        };

        child.mutate(config, rng, innovations)?;
        Ok(child)
    }
}
