//! Bounded genetic-algorithm search over integer replica-count vectors
//! (spec.md §4.5), transcribed from the Python prototype's
//! `genetic_algorithm`/`fitness`/`select`/`crossover`/`mutate` functions.

use rand::Rng;

use crate::types::ClusterCapacity;

const POPULATION_SIZE: usize = 100;
const GENERATIONS: usize = 100;
const TOURNAMENT_SIZE: usize = 4;
const MUTATION_RATE: f64 = 0.02;

/// One revision's contribution to the search: its per-replica resource
/// usage, normalized throughput, and the `[0, max_count]` bound on its
/// replica count.
#[derive(Debug, Clone)]
pub struct RevisionGene {
    pub normalized_throughput: f64,
    pub usage: ClusterCapacity,
    pub is_gpu: bool,
    pub max_count: u32,
}

/// An integer replica-count vector, one entry per revision in the order
/// passed to [`search`].
pub type Individual = Vec<u32>;

/// Runs the bounded search and returns the best individual found across all
/// generations, including generation zero's random population.
pub fn search(
    genes: &[RevisionGene],
    capacity: &ClusterCapacity,
    max_rep_bound: u32,
    rng: &mut impl Rng,
) -> Individual {
    if genes.is_empty() {
        return Vec::new();
    }

    let mut population: Vec<Individual> = (0..POPULATION_SIZE)
        .map(|_| random_individual(genes, max_rep_bound, rng))
        .collect();

    for _ in 0..GENERATIONS {
        let mut children = Vec::with_capacity(population.len());
        for _ in 0..(population.len() / 2).max(1) {
            let parent_a = tournament_select(&population, genes, capacity, rng);
            let parent_b = tournament_select(&population, genes, capacity, rng);
            let (child_a, child_b) = crossover(parent_a, parent_b, rng);
            children.push(mutate(child_a, genes, max_rep_bound, rng));
            children.push(mutate(child_b, genes, max_rep_bound, rng));
        }

        population.extend(children);
        population.sort_by(|a, b| {
            fitness(b, genes, capacity)
                .partial_cmp(&fitness(a, genes, capacity))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        population.truncate(POPULATION_SIZE);
    }

    population
        .into_iter()
        .max_by(|a, b| {
            fitness(a, genes, capacity)
                .partial_cmp(&fitness(b, genes, capacity))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or_default()
}

fn random_individual(genes: &[RevisionGene], max_rep_bound: u32, rng: &mut impl Rng) -> Individual {
    genes
        .iter()
        .map(|g| rng.gen_range(0..=g.max_count.min(max_rep_bound.max(1))))
        .collect()
}

/// Total weighted throughput minus a heavy penalty for exceeding any
/// resource's available capacity (spec.md §4.5 fitness function).
pub fn fitness(individual: &Individual, genes: &[RevisionGene], capacity: &ClusterCapacity) -> f64 {
    let reward: f64 = individual
        .iter()
        .zip(genes)
        .map(|(&count, gene)| gene.normalized_throughput * count as f64)
        .sum();

    let penalty: f64 = capacity
        .iter()
        .map(|(resource, available)| {
            let used: f64 = individual
                .iter()
                .zip(genes)
                .map(|(&count, gene)| {
                    if resource == "gpu" && !gene.is_gpu {
                        0.0
                    } else {
                        ClusterCapacity::usage_of_gene(gene, resource) * count as f64
                    }
                })
                .sum();
            (used - available).max(0.0)
        })
        .sum();

    reward - 100.0 * penalty
}

fn tournament_select<'a>(
    population: &'a [Individual],
    genes: &[RevisionGene],
    capacity: &ClusterCapacity,
    rng: &mut impl Rng,
) -> &'a Individual {
    (0..TOURNAMENT_SIZE)
        .map(|_| &population[rng.gen_range(0..population.len())])
        .max_by(|a, b| {
            fitness(a, genes, capacity)
                .partial_cmp(&fitness(b, genes, capacity))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("tournament size is nonzero")
}

fn crossover(parent_a: &Individual, parent_b: &Individual, rng: &mut impl Rng) -> (Individual, Individual) {
    if parent_a.len() < 2 {
        return (parent_a.clone(), parent_b.clone());
    }
    let point = rng.gen_range(1..parent_a.len());
    let mut child_a = parent_a[..point].to_vec();
    child_a.extend_from_slice(&parent_b[point..]);
    let mut child_b = parent_b[..point].to_vec();
    child_b.extend_from_slice(&parent_a[point..]);
    (child_a, child_b)
}

fn mutate(mut individual: Individual, genes: &[RevisionGene], max_rep_bound: u32, rng: &mut impl Rng) -> Individual {
    for (gene_idx, value) in individual.iter_mut().enumerate() {
        if rng.gen_bool(MUTATION_RATE) {
            let bound = genes[gene_idx].max_count.min(max_rep_bound.max(1));
            *value = rng.gen_range(0..=bound);
        }
    }
    individual
}

impl ClusterCapacity {
    fn usage_of_gene(gene: &RevisionGene, resource: &str) -> f64 {
        match resource {
            "cpu" => gene.usage.cpu,
            "memory" => gene.usage.memory,
            "disk_read" => gene.usage.disk_read,
            "disk_write" => gene.usage.disk_write,
            "network_uplink" => gene.usage.network_uplink,
            "network_downlink" => gene.usage.network_downlink,
            "gpu" => gene.usage.gpu,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClusterCapacity;

    fn gene(throughput: f64, cpu: f64, max_count: u32) -> RevisionGene {
        RevisionGene {
            normalized_throughput: throughput,
            usage: ClusterCapacity {
                cpu,
                ..Default::default()
            },
            is_gpu: false,
            max_count,
        }
    }

    #[test]
    fn fitness_rewards_throughput_and_penalizes_overcommit() {
        let genes = vec![gene(2.0, 1.0, 10)];
        let capacity = ClusterCapacity {
            cpu: 5.0,
            ..Default::default()
        };
        assert_eq!(fitness(&vec![5], &genes, &capacity), 10.0);
        assert_eq!(fitness(&vec![10], &genes, &capacity), 20.0 - 100.0 * 5.0);
    }

    #[test]
    fn search_stays_within_bounds() {
        let genes = vec![gene(1.0, 1.0, 3), gene(2.0, 2.0, 5)];
        let capacity = ClusterCapacity {
            cpu: 100.0,
            ..Default::default()
        };
        let mut rng = rand::thread_rng();
        let best = search(&genes, &capacity, 10, &mut rng);
        assert_eq!(best.len(), 2);
        assert!(best[0] <= 3);
        assert!(best[1] <= 5);
    }

    #[test]
    fn search_tolerates_an_all_zero_ceiling() {
        // Every gene's max_count collapses to 1 (spec.md §9 scenario: all-zero
        // resource ceiling); search must still terminate and return a vector
        // of the right length without panicking on a degenerate bound.
        let genes = vec![gene(1.0, 1.0, 1), gene(1.0, 1.0, 1)];
        let capacity = ClusterCapacity::default();
        let mut rng = rand::thread_rng();
        let best = search(&genes, &capacity, 1, &mut rng);
        assert_eq!(best.len(), 2);
        assert!(best.iter().all(|&count| count <= 1));
    }
}
