//! Connectivity generators
//!
//! Each generator returns the `(pre_indices, post_indices)` pair that
//! [`SimContext::allocate_synapse_group`](crate::SimContext::allocate_synapse_group)
//! expects. Pairs are emitted in row-major order (by presynaptic index, then
//! postsynaptic index).

use crate::error::{Result, RuntimeError};
use rand::Rng;

/// Parallel index arrays describing synapses
pub type IndexPairs = (Vec<usize>, Vec<usize>);

/// Every presynaptic neuron to every postsynaptic neuron
pub fn all_to_all(pre_size: usize, post_size: usize) -> IndexPairs {
    let mut pre = Vec::with_capacity(pre_size * post_size);
    let mut post = Vec::with_capacity(pre_size * post_size);
    for i in 0..pre_size {
        for j in 0..post_size {
            pre.push(i);
            post.push(j);
        }
    }
    (pre, post)
}

/// Neuron `i` to neuron `i`
pub fn one_to_one(size: usize) -> IndexPairs {
    ((0..size).collect(), (0..size).collect())
}

/// Each pair independently with probability `density`
pub fn random<R: Rng>(pre_size: usize, post_size: usize, density: f32, rng: &mut R) -> Result<IndexPairs> {
    check_density(density)?;
    Ok(sample(pre_size, post_size, density, rng, |_, _| true))
}

/// Within one population, each ordered pair `i != j` with probability `density`
pub fn recurrent<R: Rng>(size: usize, density: f32, rng: &mut R) -> Result<IndexPairs> {
    check_density(density)?;
    Ok(sample(size, size, density, rng, |i, j| i != j))
}

fn sample<R, F>(pre_size: usize, post_size: usize, density: f32, rng: &mut R, allowed: F) -> IndexPairs
where
    R: Rng,
    F: Fn(usize, usize) -> bool,
{
    let expected = (pre_size as f32 * post_size as f32 * density) as usize;
    let mut pre = Vec::with_capacity(expected);
    let mut post = Vec::with_capacity(expected);
    for i in 0..pre_size {
        for j in 0..post_size {
            if allowed(i, j) && rng.gen::<f32>() < density {
                pre.push(i);
                post.push(j);
            }
        }
    }
    (pre, post)
}

fn check_density(density: f32) -> Result<()> {
    if (0.0..=1.0).contains(&density) {
        Ok(())
    } else {
        Err(RuntimeError::invalid_parameter(
            "density",
            density.to_string(),
            "in [0.0, 1.0]",
        ))
    }
}
