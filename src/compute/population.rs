//! Population lifecycle: evaluation cursor, reproduction and persistence.

use crate::schema::{ConfigError, NeatConfig, RankingMode};
use crate::store::{PopulationSnapshot, SnapshotStore, StoreError};

use super::gene::InnovationCounter;
use super::graph::NeuronGraph;
use super::network::{GenomeError, Network};
use super::rng::NeatRng;
use super::species::{Species, speciate};

/// Total adjusted fitness below this is treated as zero.
const MIN_TOTAL_ADJUSTED_FITNESS: f64 = 1e-9;

/// Population errors.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    #[error("Population has no species")]
    EmptyPopulation,
    #[error("Species {0} has no members")]
    EmptySpecies(usize),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid genome: {0}")]
    Genome(#[from] GenomeError),
    #[error("Snapshot store failed: {0}")]
    Store(#[from] StoreError),
}

/// Position of the network currently under evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub species: usize,
    pub network: usize,
}

/// An evolving population of networks grouped into species.
///
/// The harness repeatedly evaluates the current network, reports fitness
/// deltas and calls [`Population::advance`]. Once every network of every
/// species has had its turn the next generation is bred and persisted.
pub struct Population {
    config: NeatConfig,
    species: Vec<Species>,
    generation: u32,
    innovations: InnovationCounter,
    cursor: Cursor,
    rng: NeatRng,
    graph: Option<NeuronGraph>,
    store: Option<Box<dyn SnapshotStore>>,
    previous_best: f64,
}

impl Population {
    /// Create a fresh population, seeded from `config.random_seed` if set.
    pub fn new(config: NeatConfig) -> Result<Self, PopulationError> {
        let rng = rng_for(&config);
        Self::with_rng(config, rng)
    }

    /// Create a fresh population drawing from `rng`.
    ///
    /// Every network starts with no hidden topology and one mutation pass.
    pub fn with_rng(config: NeatConfig, rng: NeatRng) -> Result<Self, PopulationError> {
        config.validate()?;

        let mut population = Self::empty(config, rng);
        let config = &population.config;
        for _ in 0..config.population_size {
            let mut network = Network::basic(
                config.input_size,
                config.output_size,
                config.genome.mutation_rates,
            );
            network.mutate(
                &config.genome,
                &mut population.rng,
                &mut population.innovations,
            )?;
            speciate(
                &mut population.species,
                network,
                &config.speciation,
                &mut population.rng,
            );
        }

        log::info!(
            "Initialized {} networks in {} species",
            config.population_size,
            population.species.len()
        );
        Ok(population)
    }

    /// Resume from the newest snapshot in `store`, or start fresh if it holds
    /// none. Every later generation is saved to `store`.
    pub fn open(config: NeatConfig, store: Box<dyn SnapshotStore>) -> Result<Self, PopulationError> {
        config.validate()?;
        let rng = rng_for(&config);

        let population = match store.load_latest()? {
            Some(snapshot) => {
                log::info!("Resuming from generation {}", snapshot.generation);
                Self::restore(config, snapshot, rng)?
            }
            None => Self::with_rng(config, rng)?,
        };
        Ok(population.with_store(store))
    }

    /// Rebuild a population from a decoded snapshot.
    ///
    /// Interface and population sizes come from the snapshot.
    pub fn restore(
        mut config: NeatConfig,
        snapshot: PopulationSnapshot,
        rng: NeatRng,
    ) -> Result<Self, PopulationError> {
        if (config.input_size, config.output_size, config.population_size)
            != (
                snapshot.input_size,
                snapshot.output_size,
                snapshot.population_size,
            )
        {
            log::warn!(
                "Snapshot sizes ({} in, {} out, {} networks) override configuration",
                snapshot.input_size,
                snapshot.output_size,
                snapshot.population_size
            );
        }
        config.input_size = snapshot.input_size;
        config.output_size = snapshot.output_size;
        config.population_size = snapshot.population_size;
        config.validate()?;

        let generation = snapshot.generation;
        let previous_best = snapshot.best_fitness;
        let mut innovations = InnovationCounter::starting_after(snapshot.innovation_counter);
        let species = snapshot.into_species()?;
        for gene in species
            .iter()
            .flat_map(Species::members)
            .flat_map(Network::genes)
        {
            innovations.observe(gene.innovation);
        }

        let mut population = Self::empty(config, rng);
        population.species = species;
        population.generation = generation;
        population.innovations = innovations;
        population.previous_best = previous_best;
        Ok(population)
    }

    fn empty(config: NeatConfig, rng: NeatRng) -> Self {
        Self {
            config,
            species: Vec::new(),
            generation: 1,
            innovations: InnovationCounter::default(),
            cursor: Cursor::default(),
            rng,
            graph: None,
            store: None,
            previous_best: 0.0,
        }
    }

    /// Persist every completed generation to `store`.
    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn innovations(&self) -> &InnovationCounter {
        &self.innovations
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Total networks across all species.
    pub fn len(&self) -> usize {
        self.species.iter().map(Species::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The network under evaluation.
    pub fn current_network(&self) -> &Network {
        &self.species[self.cursor.species].members()[self.cursor.network]
    }

    fn current_network_mut(&mut self) -> &mut Network {
        &mut self.species[self.cursor.species].members_mut()[self.cursor.network]
    }

    /// Feed sensors to the current network and return its chosen action index.
    pub fn evaluate(&mut self, sensors: &[f64]) -> Result<usize, GenomeError> {
        let network = &self.species[self.cursor.species].members()[self.cursor.network];
        let rng = &mut self.rng;
        let graph = self.graph.get_or_insert_with(|| network.build_graph(rng));
        let winner = graph.evaluate(sensors)?;
        Ok(network.action(winner))
    }

    /// Add to the current network's fitness, returning the new total.
    pub fn add_fitness(&mut self, delta: f64) -> f64 {
        self.current_network_mut().add_fitness(delta)
    }

    /// Move to the next network, breeding a new generation after the last one.
    pub fn advance(&mut self) -> Result<(), PopulationError> {
        self.graph = None;
        self.cursor.network += 1;

        if self.cursor.network >= self.species[self.cursor.species].len() {
            self.cursor.network = 0;
            self.cursor.species += 1;

            if self.cursor.species >= self.species.len() {
                self.cursor.species = 0;
                self.next_generation()?;
            }
        }
        Ok(())
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn current_species_index(&self) -> usize {
        self.cursor.species
    }

    pub fn current_network_index(&self) -> usize {
        self.cursor.network
    }

    pub fn current_fitness(&self) -> f64 {
        self.current_network().fitness()
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    /// Best fitness reached so far in the running generation.
    pub fn best_fitness(&self) -> f64 {
        self.species
            .iter()
            .filter_map(Species::generation_best)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Best fitness of the last completed generation.
    pub fn previous_best_fitness(&self) -> f64 {
        self.previous_best
    }

    /// Breed, speciate and persist the next generation.
    ///
    /// Works on copies of the species, random source and innovation counter,
    /// so a failure leaves the current generation untouched.
    pub fn next_generation(&mut self) -> Result<(), PopulationError> {
        if self.species.is_empty() {
            return Err(PopulationError::EmptyPopulation);
        }
        if let Some(idx) = self.species.iter().position(Species::is_empty) {
            return Err(PopulationError::EmptySpecies(idx));
        }

        let best = self.best_fitness();
        let mut rng = self.rng.clone();
        let mut innovations = self.innovations.clone();
        let species = self.reproduce(&mut rng, &mut innovations)?;

        self.species = species;
        self.rng = rng;
        self.innovations = innovations;
        self.generation += 1;
        self.cursor = Cursor::default();
        self.graph = None;
        self.previous_best = best;

        log::info!(
            "Generation {}: {} species, previous best fitness {:.3}",
            self.generation,
            self.species.len(),
            best
        );

        self.save()
    }

    fn reproduce(
        &self,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<Vec<Species>, PopulationError> {
        let reproduction = &self.config.reproduction;
        let target = self.config.population_size;
        let mut species = self.species.clone();

        for s in &mut species {
            s.record_generation_result();
        }
        remove_stale_species(&mut species, reproduction.stale_limit);

        match reproduction.ranking {
            RankingMode::Global => rank_globally(&mut species),
            RankingMode::PerSpecies => species.iter_mut().for_each(rank_within),
        }

        for s in &mut species {
            let keep = ((s.len() as f64 * reproduction.survival_fraction).ceil() as usize).max(1);
            s.cull(keep);
        }

        let mut counts = allocate_offspring(&mut species, target);
        let before = species.len();
        let mut kept = counts.iter().map(|&n| n > 0);
        species.retain(|_| kept.next().unwrap_or(false));
        counts.retain(|&n| n > 0);
        if species.len() < before {
            log::debug!("Removed {} weak species", before - species.len());
        }

        let allocated: usize = counts.iter().sum();
        for _ in allocated..target {
            counts[rng.index(species.len())] += 1;
        }

        let mut children = Vec::with_capacity(target);
        for (idx, &count) in counts.iter().enumerate() {
            for _ in 1..count {
                children.push(self.breed(&species, idx, rng, innovations)?);
            }
        }

        for s in &mut species {
            s.cull(1);
            for champion in s.members_mut() {
                champion.reset_evaluation();
            }
        }

        for child in children {
            speciate(&mut species, child, &self.config.speciation, rng);
        }

        Ok(species)
    }

    /// One child of species `idx`, occasionally crossed with another species.
    fn breed(
        &self,
        species: &[Species],
        idx: usize,
        rng: &mut NeatRng,
        innovations: &mut InnovationCounter,
    ) -> Result<Network, GenomeError> {
        let genome = &self.config.genome;
        let reproduction = &self.config.reproduction;

        if species.len() > 1 && rng.chance(reproduction.interspecies_crossover_rate) {
            let mut other = rng.index(species.len() - 1);
            if other >= idx {
                other += 1;
            }
            if let (Some(mom), Some(dad)) = (
                species[idx].random_member(rng),
                species[other].random_member(rng),
            ) {
                let mut child = Network::crossover(mom, dad, genome, rng)?;
                child.mutate(genome, rng, innovations)?;
                return Ok(child);
            }
        }

        species[idx].make_child(reproduction.crossover_rate, genome, rng, innovations)
    }

    /// Capture the current state as a snapshot record.
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot::capture(
            self.generation,
            self.innovations.current(),
            self.previous_best,
            &self.config,
            &self.species,
        )
    }

    /// Write the current state to the attached store, if any.
    pub fn save(&mut self) -> Result<(), PopulationError> {
        let snapshot = self.snapshot();
        if let Some(store) = self.store.as_mut() {
            store.save(&snapshot)?;
        }
        Ok(())
    }
}

fn rng_for(config: &NeatConfig) -> NeatRng {
    config
        .random_seed
        .map_or_else(NeatRng::random, NeatRng::new)
}

/// Drop species stale for `limit` generations, never the last one standing.
fn remove_stale_species(species: &mut Vec<Species>, limit: u32) {
    let mut remaining = species.len();
    species.retain(|s| {
        if remaining > 1 && s.is_stale(limit) {
            remaining -= 1;
            log::debug!(
                "Species stagnated for {} generations (best {:.3}), removing",
                s.stale_generations(),
                s.best_fitness_ever()
            );
            false
        } else {
            true
        }
    });
}

/// Rank every network by fitness across the population, 1 = worst.
fn rank_globally(species: &mut [Species]) {
    let mut order: Vec<(usize, usize, f64)> = species
        .iter()
        .enumerate()
        .flat_map(|(s, sp)| {
            sp.members()
                .iter()
                .enumerate()
                .map(move |(n, net)| (s, n, net.fitness()))
        })
        .collect();
    order.sort_by(|a, b| a.2.total_cmp(&b.2));

    for (rank, (s, n, _)) in order.into_iter().enumerate() {
        species[s].members_mut()[n].set_rank(rank as u32 + 1);
    }
}

/// Rank networks by fitness within one species, 1 = worst.
fn rank_within(species: &mut Species) {
    let mut order: Vec<(usize, f64)> = species
        .members()
        .iter()
        .enumerate()
        .map(|(n, net)| (n, net.fitness()))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    for (rank, (n, _)) in order.into_iter().enumerate() {
        species.members_mut()[n].set_rank(rank as u32 + 1);
    }
}

/// Offspring slots per species: `floor(adjusted / total * target)`.
///
/// Negative adjusted fitness is shifted up to zero and a vanishing total
/// splits the population evenly. At least one species always gets a slot.
fn allocate_offspring(species: &mut [Species], target: usize) -> Vec<usize> {
    let adjusted: Vec<f64> = species
        .iter_mut()
        .map(Species::compute_adjusted_fitness)
        .collect();

    let shift = adjusted.iter().copied().fold(0.0, f64::min).abs();
    let total: f64 = adjusted.iter().map(|a| a + shift).sum();

    let mut counts: Vec<usize> = if total < MIN_TOTAL_ADJUSTED_FITNESS {
        vec![target / species.len(); species.len()]
    } else {
        adjusted
            .iter()
            .map(|a| ((a + shift) / total * target as f64).floor() as usize)
            .collect()
    };

    if counts.iter().all(|&n| n == 0)
        && let Some((best, _)) = adjusted
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
    {
        counts[best] = 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::gene::Gene;
    use crate::schema::MutationRates;
    use crate::store::MemoryStore;

    fn small_config(size: usize) -> NeatConfig {
        NeatConfig {
            population_size: size,
            input_size: 3,
            output_size: 2,
            random_seed: Some(42),
            ..Default::default()
        }
    }

    /// Evaluate every network once with a deterministic fitness.
    fn run_generation(population: &mut Population) {
        let start = population.generation();
        while population.generation() == start {
            let action = population.evaluate(&[1.0, 0.5, -0.5]).unwrap();
            let genes = population.current_network().genes().len() as f64;
            population.add_fitness(genes + action as f64);
            population.advance().unwrap();
        }
    }

    fn lone_network(fitness: f64) -> Network {
        let mut net = Network::basic(1, 1, MutationRates::default());
        net.add_fitness(fitness);
        net
    }

    #[test]
    fn test_initial_population() {
        let population = Population::new(small_config(20)).unwrap();
        assert_eq!(population.len(), 20);
        assert_eq!(population.generation(), 1);
        assert_eq!(population.cursor(), Cursor::default());
        assert!(population.species_count() >= 1);
        assert!(population.innovations().current() > 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NeatConfig {
            population_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Population::new(config),
            Err(PopulationError::Config(ConfigError::PopulationTooSmall))
        ));
    }

    #[test]
    fn test_size_preserved_across_generations() {
        let mut population = Population::new(small_config(30)).unwrap();
        for generation in 2..=6 {
            run_generation(&mut population);
            assert_eq!(population.generation(), generation);
            assert_eq!(population.len(), 30);
            assert!(population.species().iter().all(|s| !s.is_empty()));
        }
    }

    #[test]
    fn test_per_species_ranking_preserves_size() {
        let mut config = small_config(25);
        config.reproduction.ranking = RankingMode::PerSpecies;
        let mut population = Population::new(config).unwrap();
        for _ in 0..4 {
            run_generation(&mut population);
            assert_eq!(population.len(), 25);
        }
    }

    #[test]
    fn test_innovations_never_reused() {
        let mut population = Population::new(small_config(15)).unwrap();
        let mut last = population.innovations().current();
        for _ in 0..4 {
            run_generation(&mut population);
            let now = population.innovations().current();
            assert!(now >= last);
            last = now;
            for species in population.species() {
                for network in species.members() {
                    assert!(network.genes().iter().all(|g| g.innovation <= now));
                    assert!(network.validate().is_ok());
                }
            }
        }
    }

    #[test]
    fn test_cursor_walks_every_network() {
        let mut population = Population::new(small_config(12)).unwrap();
        let mut visited = 0;
        while population.generation() == 1 {
            assert_eq!(population.current_fitness(), 0.0);
            population.add_fitness(1.0);
            visited += 1;
            population.advance().unwrap();
        }
        assert_eq!(visited, 12);
        assert_eq!(population.previous_best_fitness(), 1.0);
        assert_eq!(population.current_species_index(), 0);
        assert_eq!(population.current_network_index(), 0);
    }

    #[test]
    fn test_zero_fitness_networks_not_skipped() {
        let mut population = Population::new(small_config(8)).unwrap();
        population.add_fitness(5.0);
        population.advance().unwrap();
        assert_eq!(population.current_fitness(), 0.0);
        assert!(
            population.current_network_index() == 1 || population.current_species_index() == 1
        );
    }

    #[test]
    fn test_add_fitness_accumulates() {
        let mut population = Population::new(small_config(4)).unwrap();
        assert_eq!(population.add_fitness(2.5), 2.5);
        assert_eq!(population.add_fitness(-1.0), 1.5);
        assert_eq!(population.current_fitness(), 1.5);
        assert_eq!(population.best_fitness(), 1.5);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = Population::new(small_config(16)).unwrap();
        let mut b = Population::new(small_config(16)).unwrap();
        for _ in 0..3 {
            run_generation(&mut a);
            run_generation(&mut b);
        }
        assert_eq!(a.species(), b.species());
        assert_eq!(a.innovations(), b.innovations());
    }

    #[test]
    fn test_stale_species_pruned_only_with_company() {
        let mut lone = vec![Species::new(lone_network(10.0))];
        for _ in 0..16 {
            lone[0].record_generation_result();
        }
        remove_stale_species(&mut lone, 15);
        assert_eq!(lone.len(), 1);

        let mut stale = Species::new(lone_network(10.0));
        for _ in 0..16 {
            stale.record_generation_result();
        }
        let mut pair = vec![stale, Species::new(lone_network(1.0))];
        remove_stale_species(&mut pair, 15);
        assert_eq!(pair.len(), 1);
        assert_eq!(pair[0].best_fitness_ever(), 0.0);
    }

    #[test]
    fn test_global_ranking() {
        let mut species = vec![
            Species::new(lone_network(5.0)),
            Species::new(lone_network(-1.0)),
        ];
        species[0].add(lone_network(2.0));
        rank_globally(&mut species);

        assert_eq!(species[0].members()[0].rank(), 3);
        assert_eq!(species[0].members()[1].rank(), 2);
        assert_eq!(species[1].members()[0].rank(), 1);
    }

    #[test]
    fn test_allocate_offspring_proportional() {
        let mut species = vec![
            Species::new(lone_network(0.0)),
            Species::new(lone_network(0.0)),
        ];
        species[0].members_mut()[0].set_rank(3);
        species[1].members_mut()[0].set_rank(1);

        assert_eq!(allocate_offspring(&mut species, 8), vec![6, 2]);
    }

    #[test]
    fn test_allocate_offspring_zero_total() {
        let mut species = vec![
            Species::new(lone_network(0.0)),
            Species::new(lone_network(0.0)),
            Species::new(lone_network(0.0)),
        ];
        assert_eq!(allocate_offspring(&mut species, 7), vec![2, 2, 2]);
        let scarce = allocate_offspring(&mut species, 2);
        assert_eq!(scarce.iter().sum::<usize>(), 1);
    }

    #[test]
    fn test_evaluate_returns_action_index() {
        let genes = vec![
            Gene {
                into: 0,
                out: 2,
                weight: 1.0,
                enabled: true,
                innovation: 1,
            },
            Gene {
                into: 1,
                out: 2,
                weight: -1.0,
                enabled: true,
                innovation: 2,
            },
        ];
        let network =
            Network::from_parts(genes, 2, 1, 3, MutationRates::default(), 0.0, 0).unwrap();
        let config = NeatConfig {
            population_size: 1,
            input_size: 2,
            output_size: 1,
            ..Default::default()
        };
        let snapshot = PopulationSnapshot::capture(1, 2, 0.0, &config, &[Species::new(network)]);
        let mut population = Population::restore(config, snapshot, NeatRng::new(1)).unwrap();

        assert_eq!(population.evaluate(&[1.0, 0.0]).unwrap(), 0);
        assert!(matches!(
            population.evaluate(&[1.0]),
            Err(GenomeError::SensorCount { .. })
        ));
    }

    #[test]
    fn test_generation_persisted_and_resumed() {
        let store = MemoryStore::default();
        let mut population =
            Population::open(small_config(10), Box::new(store.clone())).unwrap();
        run_generation(&mut population);
        run_generation(&mut population);

        assert_eq!(store.generations().unwrap(), vec![2, 3]);

        let resumed = Population::open(small_config(10), Box::new(store.clone())).unwrap();
        assert_eq!(resumed.generation(), 3);
        assert_eq!(resumed.species(), population.species());
        assert_eq!(resumed.innovations(), population.innovations());
    }

    #[test]
    fn test_non_finite_fitness_survives_resume() {
        let store = MemoryStore::default();
        let mut population =
            Population::open(small_config(10), Box::new(store.clone())).unwrap();
        population.add_fitness(f64::INFINITY);
        population.advance().unwrap();
        population.add_fitness(f64::NAN);
        while population.generation() == 1 {
            population.advance().unwrap();
        }
        assert_eq!(population.previous_best_fitness(), f64::MAX);

        let resumed = Population::open(small_config(10), Box::new(store.clone())).unwrap();
        assert_eq!(resumed.generation(), 2);
        assert_eq!(resumed.previous_best_fitness(), f64::MAX);
        assert_eq!(resumed.species(), population.species());
    }

    #[test]
    fn test_failed_generation_leaves_state_untouched() {
        let mut config = small_config(4);
        config.reproduction.crossover_rate = 1.0;
        config.reproduction.survival_fraction = 1.0;
        let mut population = Population::new(config).unwrap();

        // Every member carries a gene past its neuron range, so any crossover
        // child is rejected.
        let members = (0..4)
            .map(|i| {
                let mut net = lone_network(i as f64);
                net.push_unchecked(Gene {
                    into: 0,
                    out: 50,
                    weight: 1.0,
                    enabled: true,
                    innovation: 1,
                });
                net
            })
            .collect();
        population.species = vec![Species::from_parts(members, 0.0, 0, 0.0)];

        let species = population.species.clone();
        let innovations = population.innovations.clone();
        let mut rng = population.rng.clone();

        let result = population.next_generation();
        assert!(matches!(
            result,
            Err(PopulationError::Genome(GenomeError::NeuronOutOfRange {
                neuron: 50,
                ..
            }))
        ));
        assert_eq!(population.generation(), 1);
        assert_eq!(population.species, species);
        assert_eq!(population.innovations, innovations);
        assert_eq!(population.cursor(), Cursor::default());
        assert_eq!(population.rng.unit(), rng.unit());
    }

    #[test]
    fn test_interspecies_crossover() {
        let mut config = small_config(20);
        config.reproduction.interspecies_crossover_rate = 1.0;
        let mut population = Population::new(config).unwrap();
        assert!(population.species_count() > 1);

        for _ in 0..4 {
            run_generation(&mut population);
            assert_eq!(population.len(), 20);
            for species in population.species() {
                for network in species.members() {
                    assert!(network.validate().is_ok());
                }
            }
        }
    }
}
