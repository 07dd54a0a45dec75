use derive_new::new;
use rand::{distributions::Open01, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::math::rho_statistic;

/// Draws per simulation unit
pub const BATCH_SIZE: usize = 1_000;

/// A single unit of background simulation work
///
/// A null draw samples `draws` rho statistics, each computed over
/// `neighborhood_size` independent uniform percentiles. Every unit owns its own
/// random stream derived from the base seed, its size and its batch index, so
/// units can be evaluated in any order and on any thread.
#[derive(Debug, Clone, Copy, new)]
pub struct NullDraw {
    /// Number of uniforms aggregated per rho
    neighborhood_size: usize,
    /// Index of this unit within its size
    batch_index: usize,
    /// Number of rho values to draw
    draws: usize,
    seed: u64,
}

impl NullDraw {
    /// Splits `n_iter` draws of each size into fixed-size units
    pub fn partition(sizes: &[usize], n_iter: usize, seed: u64) -> Vec<NullDraw> {
        let mut units = Vec::new();
        for size in sizes {
            let mut remaining = n_iter;
            let mut batch_index = 0;
            while remaining > 0 {
                let draws = remaining.min(BATCH_SIZE);
                units.push(NullDraw::new(*size, batch_index, draws, seed));
                remaining -= draws;
                batch_index += 1;
            }
        }
        units
    }

    pub fn neighborhood_size(&self) -> usize {
        self.neighborhood_size
    }

    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    fn stream(&self) -> u64 {
        ((self.neighborhood_size as u64) << 32) | self.batch_index as u64
    }

    pub fn sample(&self) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(self.stream());
        let mut uniforms = vec![0.0; self.neighborhood_size];
        (0..self.draws)
            .map(|_| {
                uniforms
                    .iter_mut()
                    .for_each(|u| *u = rng.sample::<f64, _>(Open01));
                rho_statistic(&mut uniforms)
            })
            .collect()
    }
}
