//! Search space definitions and search strategies.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_types::{Assignment, Descriptor, RawPermutation};

use crate::trial::ObjectiveDirection;

/// A single registered dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Name the parameter was registered under (e.g. "block_size").
    pub name: String,
    pub descriptor: Descriptor,
}

/// One assignment per registered parameter, in registration order.
pub type Configuration = Vec<Assignment>;

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.push(name, descriptor);
        self
    }

    pub fn add_category(self, name: impl Into<String>, count: usize) -> Self {
        self.add(name, Descriptor::category(count))
    }

    pub fn add_range(self, name: impl Into<String>, size: usize) -> Self {
        self.add(name, Descriptor::range(size))
    }

    pub fn add_permutation(self, name: impl Into<String>, count: usize) -> Self {
        self.add(name, Descriptor::permutation(count))
    }

    pub fn push(&mut self, name: impl Into<String>, descriptor: Descriptor) -> usize {
        self.parameters.push(ParameterDef {
            name: name.into(),
            descriptor,
        });
        self.parameters.len() - 1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Total number of distinct configurations, or `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, p| total.checked_mul(p.descriptor.assignment_count()?))
    }

    /// Whether `configuration` assigns a legal value to every parameter.
    pub fn admits(&self, configuration: &Configuration) -> bool {
        configuration.len() == self.parameters.len()
            && self
                .parameters
                .iter()
                .zip(configuration)
                .all(|(p, a)| p.descriptor.admits(a))
    }

    /// Pair each assignment with its parameter name.
    pub fn named(&self, configuration: &Configuration) -> BTreeMap<String, Assignment> {
        self.parameters
            .iter()
            .zip(configuration)
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Propose the next configuration to evaluate, or `None` once the
    /// strategy has nothing left to propose.
    fn suggest(&mut self, space: &SearchSpace) -> Option<Configuration>;

    /// Report a completed trial so adaptive strategies can learn. Failed
    /// trials are reported with the direction's worst score.
    fn report(&mut self, _configuration: &Configuration, _score: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn suggest(&mut self, space: &SearchSpace) -> Option<Configuration> {
        (**self).suggest(space)
    }

    fn report(&mut self, configuration: &Configuration, score: f64) {
        (**self).report(configuration, score)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Uniformly random permutation of `n` elements (Fisher-Yates).
fn shuffled<R: Rng + ?Sized>(n: usize, rng: &mut R) -> RawPermutation {
    let mut perm = RawPermutation::identity(n);
    for i in (1..n).rev() {
        perm.swap(i, rng.gen_range(0..=i));
    }
    perm
}

fn sample_assignment<R: Rng + ?Sized>(descriptor: &Descriptor, rng: &mut R) -> Assignment {
    match descriptor {
        Descriptor::Permutation(p) => Assignment::Permutation(shuffled(p.count, rng)),
        other => Assignment::Index(rng.gen_range(0..other.cardinality())),
    }
}

/// The `k`-th permutation of `[0, n)` in lexicographic order, decoded from
/// the factorial number system. `k` must be below `n!`.
fn nth_permutation(n: usize, mut k: usize) -> RawPermutation {
    let mut available: Vec<usize> = (0..n).collect();
    let mut radix: usize = (1..n).product();
    let mut perm = RawPermutation::identity(n);
    for position in 0..n {
        let chosen = available.remove(k / radix);
        k %= radix;
        // move `chosen` into `position`; everything before it is fixed
        let from = (position..n)
            .find(|&p| perm[p] == chosen)
            .unwrap_or(position);
        perm.swap(position, from);
        if position + 1 < n {
            radix /= n - 1 - position;
        }
    }
    perm
}

// ---- Grid search ----

/// Exhaustive enumeration of every configuration.
///
/// Configurations are visited in mixed-radix order with the last declared
/// parameter varying fastest. Spaces whose size overflows `usize` cannot be
/// enumerated; the strategy proposes nothing for them.
#[derive(Debug, Clone, Default)]
pub struct GridSearch {
    cursor: usize,
}

impl GridSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of configurations handed out so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn decode(space: &SearchSpace, mut index: usize) -> Option<Configuration> {
        let mut configuration = Vec::with_capacity(space.len());
        for param in space.parameters.iter().rev() {
            let count = param.descriptor.assignment_count()?;
            let digit = index % count;
            index /= count;
            configuration.push(match param.descriptor {
                Descriptor::Permutation(p) => {
                    Assignment::Permutation(nth_permutation(p.count, digit))
                }
                _ => Assignment::Index(digit),
            });
        }
        configuration.reverse();
        Some(configuration)
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, space: &SearchSpace) -> Option<Configuration> {
        let total = space.grid_size()?;
        if self.cursor >= total {
            return None;
        }
        let configuration = Self::decode(space, self.cursor)?;
        self.cursor += 1;
        Some(configuration)
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: ChaCha8Rng,
}

impl RandomSearch {
    /// A seeded strategy is reproducible; `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
        }
    }

    fn sample_one(&mut self, space: &SearchSpace) -> Configuration {
        space
            .parameters
            .iter()
            .map(|p| sample_assignment(&p.descriptor, &mut self.rng))
            .collect()
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, space: &SearchSpace) -> Option<Configuration> {
        Some(self.sample_one(space))
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Adaptive search ----

/// Explore/exploit search around the best configuration seen so far.
///
/// With probability `exploration_weight` (and always before the first
/// report) a fresh random configuration is proposed; otherwise the best
/// observed configuration is perturbed: index parameters move by up to two
/// steps, categories are resampled, and permutations swap two positions.
#[derive(Debug, Clone)]
pub struct AdaptiveSearch {
    random: RandomSearch,
    direction: ObjectiveDirection,
    exploration_weight: f64,
    best: Option<(Configuration, f64)>,
}

impl AdaptiveSearch {
    pub fn new(seed: Option<u64>, direction: ObjectiveDirection, exploration_weight: f64) -> Self {
        Self {
            random: RandomSearch::new(seed),
            direction,
            exploration_weight,
            best: None,
        }
    }

    pub fn best(&self) -> Option<&(Configuration, f64)> {
        self.best.as_ref()
    }

    /// Pure exploration sample (same as random).
    fn explore(&mut self, space: &SearchSpace) -> Configuration {
        self.random.sample_one(space)
    }

    /// Exploitation: perturb the best-known configuration.
    fn exploit(&mut self, space: &SearchSpace) -> Configuration {
        let base = self
            .best()
            .filter(|(configuration, _)| space.admits(configuration))
            .map(|(configuration, _)| configuration.clone());
        let Some(base) = base else {
            return self.explore(space);
        };

        let rng = &mut self.random.rng;
        space
            .parameters
            .iter()
            .zip(base)
            .map(|(param, base)| match (&param.descriptor, base) {
                (Descriptor::Range(r), Assignment::Index(v)) => {
                    let delta: i64 = rng.gen_range(-2..=2);
                    let last = r.size() as i64 - 1;
                    Assignment::Index((v as i64 + delta).clamp(0, last) as usize)
                }
                (Descriptor::Permutation(_), Assignment::Permutation(mut perm)) => {
                    if perm.len() >= 2 {
                        let a = rng.gen_range(0..perm.len());
                        let b = rng.gen_range(0..perm.len());
                        perm.swap(a, b);
                    }
                    Assignment::Permutation(perm)
                }
                // Categories carry no notion of distance; resample.
                (descriptor, _) => sample_assignment(descriptor, rng),
            })
            .collect()
    }
}

impl SearchStrategy for AdaptiveSearch {
    fn suggest(&mut self, space: &SearchSpace) -> Option<Configuration> {
        let explore =
            self.best.is_none() || self.random.rng.gen::<f64>() < self.exploration_weight;
        Some(if explore {
            self.explore(space)
        } else {
            self.exploit(space)
        })
    }

    fn report(&mut self, configuration: &Configuration, score: f64) {
        let improves = match &self.best {
            None => true,
            Some((_, best)) => self.direction.is_better(score, *best),
        };
        if improves {
            self.best = Some((configuration.clone(), score));
        }
    }

    fn name(&self) -> &str {
        "adaptive"
    }
}
