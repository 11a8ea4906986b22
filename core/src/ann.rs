//! Approximate-nearest-neighbor search over document embeddings.
//!
//! Small-world graph in the HNSW style: nodes are assigned a random top
//! layer, upper layers are traversed greedily with a beam of 1, and layer 0
//! is searched with an `ef`-bounded beam. Vectors are expected to be
//! L2-normalized, so cosine distance reduces to `1 - dot`.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Tuning parameters for the ANN graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnConfig {
    /// Bidirectional links per node above layer 0.
    pub m: usize,
    /// Maximum links per node at layer 0.
    pub m_max0: usize,
    /// Beam width during construction.
    pub ef_construction: usize,
    /// Beam width during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Cap on graph layers.
    pub max_layers: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 100,
            ef_search: 64,
            max_layers: 8,
        }
    }
}

/// Immutable-per-generation ANN graph. Nodes are dense u32 ids assigned
/// in insertion order; the embedding store maps them to document ids.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnIndex {
    pub config: AnnConfig,
    dimension: usize,
    /// Vector arena, `node_count * dimension` values.
    vectors: Vec<f32>,
    /// [node][layer][neighbor ids]
    neighbors: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u32>,
    max_layer: usize,
    node_count: u32,
    /// Deterministic level generator state, so identical build input
    /// yields an identical graph.
    rng_state: u64,
}

impl AnnIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            neighbors: Vec::new(),
            entry_point: None,
            max_layer: 0,
            node_count: 0,
            rng_state: 0x9e37_79b9_7f4a_7c15,
        }
    }

    pub fn len(&self) -> u32 {
        self.node_count
    }

    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn vector(&self, node: u32) -> &[f32] {
        let start = node as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    fn distance(&self, node: u32, query: &[f32]) -> f32 {
        let v = self.vector(node);
        let mut dot = 0.0f32;
        for i in 0..self.dimension {
            dot += v[i] * query[i];
        }
        1.0 - dot
    }

    /// Exponentially-decaying random level (xorshift64*, deterministic).
    fn random_level(&mut self) -> usize {
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        let uniform = ((x.wrapping_mul(0x2545_f491_4f6c_dd1d)) >> 11) as f64 / (1u64 << 53) as f64;
        let scale = 1.0 / (self.config.m as f64).ln();
        let level = (-uniform.max(f64::MIN_POSITIVE).ln() * scale) as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Beam search within one layer. Returns up to `ef` nearest nodes as
    /// (distance, node), ascending by distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut [bool],
    ) -> Vec<(f32, u32)> {
        visited.iter_mut().for_each(|v| *v = false);
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat<f32>, u32)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrderedFloat<f32>, u32)> = BinaryHeap::new();

        for &ep in entry_points {
            if visited[ep as usize] {
                continue;
            }
            visited[ep as usize] = true;
            let dist = self.distance(ep, query);
            candidates.push(Reverse((OrderedFloat(dist), ep)));
            results.push((OrderedFloat(dist), ep));
        }

        while let Some(Reverse((OrderedFloat(c_dist), node))) = candidates.pop() {
            let worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if results.len() >= ef && c_dist > worst {
                break;
            }
            let node_layers = &self.neighbors[node as usize];
            if layer >= node_layers.len() {
                continue;
            }
            for &next in &node_layers[layer] {
                if visited[next as usize] {
                    continue;
                }
                visited[next as usize] = true;
                let dist = self.distance(next, query);
                let worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
                if results.len() < ef || dist < worst {
                    candidates.push(Reverse((OrderedFloat(dist), next)));
                    results.push((OrderedFloat(dist), next));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(f32, u32)> = results
            .into_iter()
            .map(|(d, id)| (d.0, id))
            .collect();
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Insert the next node. The caller guarantees the vector is
    /// L2-normalized and `dimension`-long; node ids are assigned densely.
    pub fn insert(&mut self, vector: &[f32]) -> u32 {
        debug_assert_eq!(vector.len(), self.dimension);
        let id = self.node_count;
        let level = self.random_level();
        self.vectors.extend_from_slice(vector);

        let Some(entry_point) = self.entry_point else {
            self.neighbors.push(vec![Vec::new(); level + 1]);
            self.node_count += 1;
            self.entry_point = Some(id);
            self.max_layer = level;
            return id;
        };

        let mut visited = vec![false; self.node_count as usize];
        let mut current_ep = entry_point;

        // Greedy descent through layers above the node's level.
        for layer in (level + 1..=self.max_layer).rev() {
            let found = self.search_layer(vector, &[current_ep], 1, layer, &mut visited);
            if let Some(&(_, nearest)) = found.first() {
                current_ep = nearest;
            }
        }

        // Collect neighbors per layer from the node's level downward.
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut layer_eps = vec![current_ep];
        for layer in (0..=top).rev() {
            let candidates = self.search_layer(
                vector,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
            );
            let m_max = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };
            node_neighbors[layer] = candidates.iter().take(m_max).map(|&(_, n)| n).collect();
            layer_eps = candidates.iter().map(|&(_, n)| n).collect();
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        self.neighbors.push(node_neighbors.clone());
        self.node_count += 1;

        // Backlinks, pruned to each neighbor's link budget.
        for (layer, linked) in node_neighbors.iter().enumerate() {
            let m_max = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };
            for &neighbor in linked {
                let list = &mut self.neighbors[neighbor as usize][layer];
                list.push(id);
                if list.len() > m_max {
                    let anchor = neighbor;
                    let mut scored: Vec<(f32, u32)> = std::mem::take(list)
                        .into_iter()
                        .map(|n| {
                            let d = {
                                let a = self.vector(anchor);
                                let b = self.vector(n);
                                let mut dot = 0.0f32;
                                for i in 0..self.dimension {
                                    dot += a[i] * b[i];
                                }
                                1.0 - dot
                            };
                            (d, n)
                        })
                        .collect();
                    scored.sort_by(|a, b| {
                        a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    self.neighbors[neighbor as usize][layer] =
                        scored.into_iter().take(m_max).map(|(_, n)| n).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }
        id
    }

    /// Bounded-candidate nearest-neighbor search. Returns up to `k`
    /// nodes as (node, cosine similarity), best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u32, f32)> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };
        let mut visited = vec![false; self.node_count as usize];
        let mut current_ep = entry_point;
        for layer in (1..=self.max_layer).rev() {
            let found = self.search_layer(query, &[current_ep], 1, layer, &mut visited);
            if let Some(&(_, nearest)) = found.first() {
                current_ep = nearest;
            }
        }
        let ef = self.config.ef_search.max(k);
        let mut found = self.search_layer(query, &[current_ep], ef, 0, &mut visited);
        found.truncate(k);
        found
            .into_iter()
            .map(|(dist, node)| (node, 1.0 - dist))
            .collect()
    }
}
