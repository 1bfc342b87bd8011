//! Genome representation and genetic operators.
//!
//! A [`Network`] is an ordered list of [`Gene`]s plus the bookkeeping needed to
//! grow it: interface sizes, the next free hidden neuron id, the genome's own
//! adaptive mutation rates, and the fitness/rank written by the population.

use std::collections::{HashMap, HashSet};

use crate::schema::{GenomeConfig, MutationRates};

use super::gene::{Gene, InnovationCounter, NeuronId};
use super::graph::NeuronGraph;
use super::rng::NeatRng;

/// Genome invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenomeError {
    #[error("Gene {innovation} connects neuron {neuron} to itself")]
    SelfLoop { innovation: u64, neuron: NeuronId },
    #[error("Link {into} -> {out} appears more than once")]
    DuplicateLink { into: NeuronId, out: NeuronId },
    #[error("Gene {innovation} references neuron {neuron} but next free id is {next_neuron_id}")]
    NeuronOutOfRange {
        innovation: u64,
        neuron: NeuronId,
        next_neuron_id: NeuronId,
    },
    #[error("Next neuron id {next_neuron_id} is below interface size {interface}")]
    InvalidNeuronCount {
        next_neuron_id: NeuronId,
        interface: usize,
    },
    #[error("Expected {expected} sensor values, got {got}")]
    SensorCount { expected: usize, got: usize },
}

/// One candidate neural network.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    genes: Vec<Gene>,
    input_size: usize,
    output_size: usize,
    next_neuron_id: NeuronId,
    mutation_rates: MutationRates,
    fitness: f64,
    rank: u32,
}

impl Network {
    /// Network with only input and output neurons and no connections.
    pub fn basic(input_size: usize, output_size: usize, mutation_rates: MutationRates) -> Self {
        Self {
            genes: Vec::new(),
            input_size,
            output_size,
            next_neuron_id: input_size + output_size,
            mutation_rates,
            fitness: 0.0,
            rank: 0,
        }
    }

    /// Assemble a network from stored parts, rejecting invalid genomes.
    pub fn from_parts(
        genes: Vec<Gene>,
        input_size: usize,
        output_size: usize,
        next_neuron_id: NeuronId,
        mutation_rates: MutationRates,
        fitness: f64,
        rank: u32,
    ) -> Result<Self, GenomeError> {
        let network = Self {
            genes,
            input_size,
            output_size,
            next_neuron_id,
            mutation_rates,
            fitness,
            rank,
        };
        network.validate()?;
        Ok(network)
    }

    /// Check every genome invariant.
    pub fn validate(&self) -> Result<(), GenomeError> {
        let interface = self.input_size + self.output_size;
        if self.next_neuron_id < interface {
            return Err(GenomeError::InvalidNeuronCount {
                next_neuron_id: self.next_neuron_id,
                interface,
            });
        }

        let mut links = HashSet::with_capacity(self.genes.len());
        for gene in &self.genes {
            self.check_gene(gene)?;
            if !links.insert(gene.link()) {
                return Err(GenomeError::DuplicateLink {
                    into: gene.into,
                    out: gene.out,
                });
            }
        }
        Ok(())
    }

    /// Per-gene checks that do not depend on the rest of the genome.
    fn check_gene(&self, gene: &Gene) -> Result<(), GenomeError> {
        if gene.into == gene.out {
            return Err(GenomeError::SelfLoop {
                innovation: gene.innovation,
                neuron: gene.into,
            });
        }
        // Disabled genes too: enabling one must leave a valid genome.
        let neuron = gene.into.max(gene.out);
        if neuron >= self.next_neuron_id {
            return Err(GenomeError::NeuronOutOfRange {
                innovation: gene.innovation,
                neuron,
                next_neuron_id: self.next_neuron_id,
            });
        }
        Ok(())
    }

    /// Append a gene after checking it against the genome invariants.
    fn push_gene(&mut self, gene: Gene) -> Result<(), GenomeError> {
        self.check_gene(&gene)?;
        if self.has_link(gene.into, gene.out) {
            return Err(GenomeError::DuplicateLink {
                into: gene.into,
                out: gene.out,
            });
        }
        self.genes.push(gene);
        Ok(())
    }

    /// Append a gene without any checks, for building corrupt genomes.
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, gene: Gene) {
        self.genes.push(gene);
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn next_neuron_id(&self) -> NeuronId {
        self.next_neuron_id
    }

    pub fn mutation_rates(&self) -> &MutationRates {
        &self.mutation_rates
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Accumulate a fitness delta, returning the new total.
    ///
    /// The total saturates at the finite `f64` range and NaN deltas are
    /// ignored, so fitness always survives a snapshot.
    pub fn add_fitness(&mut self, delta: f64) -> f64 {
        if delta.is_nan() {
            log::warn!("Ignoring NaN fitness delta");
            return self.fitness;
        }
        self.fitness = (self.fitness + delta).clamp(f64::MIN, f64::MAX);
        self.fitness
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn set_rank(&mut self, rank: u32) {
        self.rank = rank;
    }

    /// Forget this generation's evaluation results.
    pub fn reset_evaluation(&mut self) {
        self.fitness = 0.0;
        self.rank = 0;
    }

    /// Convert an output neuron id into an action index.
    pub fn action(&self, neuron: NeuronId) -> usize {
        neuron - self.input_size
    }

    /// Whether any gene (enabled or not) already connects `into -> out`.
    pub fn has_link(&self, into: NeuronId, out: NeuronId) -> bool {
        self.genes.iter().any(|g| g.link() == (into, out))
    }

    /// Build the evaluable neuron graph for this genome.
    pub fn build_graph(&self, rng: &mut NeatRng) -> NeuronGraph {
        NeuronGraph::build(self, rng)
    }

    /// Copy this genome as the starting point of a child.
    pub fn offspring(&self) -> Self {
        let mut child = self.clone();
        child.reset_evaluation();
        child
    }

    /// Perturb or replace every weight.
    ///
    /// With probability `perturb_prob` a gene's weight is nudged by at most
    /// `perturb_bias` in either direction, otherwise it is redrawn.
    pub fn mutate_weight(&mut self, perturb_prob: f64, weight_bound: f64, rng: &mut NeatRng) {
        let perturb_bias = self.mutation_rates.perturb_bias;
        for gene in &mut self.genes {
            if rng.chance(perturb_prob) {
                gene.weight += rng.signed_unit() * perturb_bias;
            } else {
                gene.weight = rng.weight(weight_bound);
            }
        }
    }

    /// Try to connect two random neurons. Returns whether a gene was added.
    ///
    /// A single attempt: picking a self loop or an existing link is a no-op.
    pub fn mutate_add_gene(
        &mut self,
        weight_bound: f64,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<bool, GenomeError> {
        let into = rng.index(self.next_neuron_id);
        let out = rng.range(self.input_size, self.next_neuron_id);

        if into == out || self.has_link(into, out) {
            return Ok(false);
        }

        let gene = Gene::create(into, out, weight_bound, rng, innovations);
        self.push_gene(gene)?;
        Ok(true)
    }

    /// Split a random enabled gene with a new hidden neuron.
    ///
    /// The incoming half gets weight 1.0 and the outgoing half inherits the
    /// split gene's weight. Picking a disabled gene is a no-op.
    pub fn mutate_add_neuron(
        &mut self,
        disable_split_gene: bool,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<bool, GenomeError> {
        if self.genes.is_empty() {
            return Ok(false);
        }

        let idx = rng.index(self.genes.len());
        if !self.genes[idx].enabled {
            return Ok(false);
        }

        let neuron = self.next_neuron_id;
        let split = &self.genes[idx];

        let mut incoming = split.copy(false, innovations);
        incoming.out = neuron;
        incoming.weight = 1.0;

        let mut outgoing = split.copy(false, innovations);
        outgoing.into = neuron;

        if disable_split_gene {
            self.genes[idx].enabled = false;
        }

        self.next_neuron_id += 1;
        self.push_gene(incoming)?;
        self.push_gene(outgoing)?;
        Ok(true)
    }

    /// Flip one random gene whose enabled flag differs from `target`.
    pub fn mutate_toggle_enable(&mut self, target: bool, rng: &mut NeatRng) -> bool {
        let candidates: Vec<usize> = self
            .genes
            .iter()
            .enumerate()
            .filter(|(_, g)| g.enabled != target)
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            return false;
        }

        let idx = candidates[rng.index(candidates.len())];
        self.genes[idx].enabled = target;
        true
    }

    /// Self-adapt the rate table, then roll every operator against it.
    ///
    /// Operators run in a fixed order: weights, add gene, add neuron, enable,
    /// disable.
    pub fn mutate(
        &mut self,
        config: &GenomeConfig,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<(), GenomeError> {
        rng.jitter_rates(&mut self.mutation_rates);
        let rates = self.mutation_rates;

        if rng.chance(rates.mutate_weight) {
            self.mutate_weight(rates.perturb, config.weight_bound, rng);
        }
        if rng.chance(rates.mutate_gene) {
            self.mutate_add_gene(config.weight_bound, rng, innovations)?;
        }
        if rng.chance(rates.mutate_neuron) {
            self.mutate_add_neuron(config.disable_split_gene, rng, innovations)?;
        }
        if rng.chance(rates.enable) {
            self.mutate_toggle_enable(true, rng);
        }
        if rng.chance(rates.disable) {
            self.mutate_toggle_enable(false, rng);
        }
        Ok(())
    }

    /// Breed a child by aligning genes on innovation id.
    ///
    /// The fitter parent is primary and passes on its matching and unique
    /// genes. On a fitness tie matching genes come from a random parent and
    /// each gene unique to the secondary parent is added with probability 0.5.
    /// A matching gene disabled in either parent is disabled in the child with
    /// probability `config.disabled_gene_inheritance`. Inherited genes whose
    /// link the child already has are dropped.
    pub fn crossover(
        a: &Network,
        b: &Network,
        config: &GenomeConfig,
        rng: &mut NeatRng,
    ) -> Result<Network, GenomeError> {
        let (mom, dad) = if b.fitness > a.fitness { (b, a) } else { (a, b) };
        let tie = mom.fitness == dad.fitness;

        let dad_genes: HashMap<u64, &Gene> =
            dad.genes.iter().map(|g| (g.innovation, g)).collect();

        let mut child = Network {
            genes: Vec::with_capacity(mom.genes.len()),
            input_size: mom.input_size,
            output_size: mom.output_size,
            next_neuron_id: mom.next_neuron_id.max(dad.next_neuron_id),
            mutation_rates: mom.mutation_rates,
            fitness: 0.0,
            rank: 0,
        };

        for mom_gene in &mom.genes {
            let inherited = match dad_genes.get(&mom_gene.innovation) {
                Some(dad_gene) => {
                    let mut gene = if tie && rng.coin() {
                        (*dad_gene).clone()
                    } else {
                        mom_gene.clone()
                    };
                    if !mom_gene.enabled || !dad_gene.enabled {
                        gene.enabled = !rng.chance(config.disabled_gene_inheritance);
                    }
                    gene
                }
                None => mom_gene.clone(),
            };
            child.inherit(inherited)?;
        }

        if tie {
            let mom_innovations: HashSet<u64> = mom.genes.iter().map(|g| g.innovation).collect();
            for dad_gene in dad
                .genes
                .iter()
                .filter(|g| !mom_innovations.contains(&g.innovation))
            {
                if rng.coin() {
                    child.inherit(dad_gene.clone())?;
                }
            }
        }

        Ok(child)
    }

    /// Add an inherited gene unless its link is already present.
    fn inherit(&mut self, gene: Gene) -> Result<(), GenomeError> {
        if self.has_link(gene.into, gene.out) {
            return Ok(());
        }
        self.push_gene(gene)
    }
}
