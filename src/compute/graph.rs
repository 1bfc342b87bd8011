//! Evaluable neuron graph derived from a genome.
//!
//! The graph is a query-time cache: it is rebuilt from the gene list whenever
//! the topology or weights change and never persisted.

use std::collections::{BTreeMap, HashSet};

use super::gene::NeuronId;
use super::network::{GenomeError, Network};
use super::rng::NeatRng;

/// Logistic activation.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Incoming edge of a neuron, copied from an enabled gene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: NeuronId,
    pub weight: f64,
}

/// A neuron with its per-evaluation state.
#[derive(Debug, Clone, Default)]
pub struct Neuron {
    value: f64,
    resolved: bool,
    bias: f64,
    incoming: Vec<Edge>,
}

impl Neuron {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn incoming(&self) -> &[Edge] {
        &self.incoming
    }
}

/// Neuron graph of one network.
#[derive(Debug, Clone)]
pub struct NeuronGraph {
    neurons: BTreeMap<NeuronId, Neuron>,
    input_size: usize,
    output_size: usize,
}

impl NeuronGraph {
    /// Build the graph for `network`.
    ///
    /// Allocates every input and output neuron plus each hidden neuron touched
    /// by an enabled gene, then draws one bias in `[0, 1)` per neuron in
    /// ascending id order. Disabled genes contribute no edges.
    pub fn build(network: &Network, rng: &mut NeatRng) -> Self {
        let input_size = network.input_size();
        let output_size = network.output_size();

        let mut neurons: BTreeMap<NeuronId, Neuron> = (0..input_size + output_size)
            .map(|id| (id, Neuron::default()))
            .collect();

        for gene in network.genes().iter().filter(|g| g.enabled) {
            neurons.entry(gene.into).or_default();
            neurons.entry(gene.out).or_default().incoming.push(Edge {
                from: gene.into,
                weight: gene.weight,
            });
        }

        for neuron in neurons.values_mut() {
            neuron.bias = rng.unit();
        }

        Self {
            neurons,
            input_size,
            output_size,
        }
    }

    /// Number of neurons in the graph.
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(&id)
    }

    /// Bias of a neuron (0 for unknown ids).
    pub fn bias(&self, id: NeuronId) -> f64 {
        self.neurons.get(&id).map_or(0.0, |n| n.bias)
    }

    /// Value computed for a neuron by the last evaluation, if resolved.
    pub fn value(&self, id: NeuronId) -> Option<f64> {
        self.neurons
            .get(&id)
            .filter(|n| n.resolved)
            .map(|n| n.value)
    }

    /// Feed `sensors` through the graph and return the strongest output neuron.
    ///
    /// Ties go to the lowest output id.
    pub fn evaluate(&mut self, sensors: &[f64]) -> Result<NeuronId, GenomeError> {
        if sensors.len() != self.input_size {
            return Err(GenomeError::SensorCount {
                expected: self.input_size,
                got: sensors.len(),
            });
        }

        for neuron in self.neurons.values_mut() {
            neuron.resolved = false;
            neuron.value = 0.0;
        }

        for (id, &sensor) in sensors.iter().enumerate() {
            if let Some(neuron) = self.neurons.get_mut(&id) {
                neuron.value = sensor;
                neuron.resolved = true;
            }
        }

        let first_output = self.input_size;
        let mut best = (first_output, f64::NEG_INFINITY);
        let mut path = HashSet::new();

        for id in first_output..first_output + self.output_size {
            let value = self.resolve(id, &mut path);
            if value > best.1 {
                best = (id, value);
            }
        }

        Ok(best.0)
    }

    /// Resolve one neuron, recursing into unresolved predecessors.
    ///
    /// `path` holds the neurons currently being resolved; an edge leading
    /// back onto it contributes nothing.
    fn resolve(&mut self, id: NeuronId, path: &mut HashSet<NeuronId>) -> f64 {
        let incoming = match self.neurons.get(&id) {
            None => return 0.0,
            Some(neuron) if neuron.resolved => return neuron.value,
            Some(neuron) => neuron.incoming.clone(),
        };

        let value = if incoming.is_empty() {
            0.0
        } else {
            path.insert(id);
            let mut sum = 0.0;
            for edge in &incoming {
                if path.contains(&edge.from) {
                    continue;
                }
                let other = self.resolve(edge.from, path);
                sum += other * edge.weight + self.bias(edge.from);
            }
            path.remove(&id);
            sigmoid(sum)
        };

        if let Some(neuron) = self.neurons.get_mut(&id) {
            neuron.value = value;
            neuron.resolved = true;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::gene::Gene;
    use crate::schema::MutationRates;

    fn gene(into: NeuronId, out: NeuronId, weight: f64, innovation: u64) -> Gene {
        Gene {
            into,
            out,
            weight,
            enabled: true,
            innovation,
        }
    }

    fn network(genes: Vec<Gene>, inputs: usize, outputs: usize, next: usize) -> Network {
        Network::from_parts(
            genes,
            inputs,
            outputs,
            next,
            MutationRates::default(),
            0.0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_two_inputs_one_output() {
        let net = network(vec![gene(0, 2, 1.0, 1), gene(1, 2, -1.0, 2)], 2, 1, 3);
        let mut rng = NeatRng::new(5);
        let mut graph = NeuronGraph::build(&net, &mut rng);

        let winner = graph.evaluate(&[1.0, 0.0]).unwrap();
        assert_eq!(winner, 2);
        assert_eq!(net.action(winner), 0);

        let expected = sigmoid(1.0 * 1.0 + graph.bias(0) + 0.0 * -1.0 + graph.bias(1));
        assert!((graph.value(2).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unconnected_output_is_zero() {
        let net = network(vec![gene(0, 3, 2.0, 1)], 2, 2, 4);
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(1));

        let winner = graph.evaluate(&[1.0, 1.0]).unwrap();
        assert_eq!(graph.value(2), Some(0.0));
        assert!(graph.value(3).unwrap() > 0.0);
        assert_eq!(winner, 3);
    }

    #[test]
    fn test_tie_goes_to_first_output() {
        let net = network(vec![], 1, 3, 4);
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(1));
        assert_eq!(graph.evaluate(&[0.3]).unwrap(), 1);
    }

    #[test]
    fn test_disabled_gene_has_no_edge() {
        let mut disabled = gene(0, 1, 5.0, 1);
        disabled.enabled = false;
        let net = network(vec![disabled], 1, 1, 2);
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(2));

        assert!(graph.neuron(1).unwrap().incoming().is_empty());
        graph.evaluate(&[1.0]).unwrap();
        assert_eq!(graph.value(1), Some(0.0));
    }

    #[test]
    fn test_cycle_terminates() {
        // output 1 <- hidden 2 <- hidden 3 <- output 1
        let net = network(
            vec![
                gene(2, 1, 1.0, 1),
                gene(3, 2, 1.0, 2),
                gene(1, 3, 1.0, 3),
                gene(0, 3, 0.5, 4),
            ],
            1,
            1,
            4,
        );
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(9));

        assert_eq!(graph.evaluate(&[1.0]).unwrap(), 1);
        let value = graph.value(1).unwrap();
        assert!(value.is_finite());
        assert!(value > 0.0 && value < 1.0);
    }

    #[test]
    fn test_hidden_neurons_allocated() {
        let net = network(vec![gene(0, 5, 1.0, 1), gene(5, 1, 1.0, 2)], 1, 1, 6);
        let graph = NeuronGraph::build(&net, &mut NeatRng::new(3));
        assert_eq!(graph.len(), 3);
        assert!(graph.neuron(5).is_some());
    }

    #[test]
    fn test_repeat_evaluation_uses_new_sensors() {
        let net = network(vec![gene(0, 1, 3.0, 1)], 1, 1, 2);
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(4));

        graph.evaluate(&[-1.0]).unwrap();
        let low = graph.value(1).unwrap();
        graph.evaluate(&[1.0]).unwrap();
        let high = graph.value(1).unwrap();
        assert!(high > low);
    }

    #[test]
    fn test_sensor_count_mismatch() {
        let net = network(vec![], 2, 1, 3);
        let mut graph = NeuronGraph::build(&net, &mut NeatRng::new(4));
        assert!(matches!(
            graph.evaluate(&[1.0]),
            Err(GenomeError::SensorCount {
                expected: 2,
                got: 1
            })
        ));
    }
}
