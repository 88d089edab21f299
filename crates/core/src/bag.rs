//! Bag module - fair, seeded piece randomizer
//!
//! The bag holds every template once. Pieces are drawn from a shuffled live
//! queue; the moment the queue runs dry it is refilled with a fresh
//! Fisher-Yates shuffle of the templates. Every aligned run of `N` draws
//! (`N` = number of templates) therefore contains each template exactly once,
//! and two bags with the same seed draw the same sequence.
//!
//! The template set is never shuffled in place; the live queue is a separate
//! container.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::mino::Mino;
use crate::rng::SimpleRng;

#[derive(Debug)]
struct BagState {
    queue: VecDeque<Arc<Mino>>,
    rng: SimpleRng,
}

impl BagState {
    fn refill(&mut self, templates: &[Arc<Mino>]) {
        let mut fresh: Vec<Arc<Mino>> = templates.to_vec();
        self.rng.shuffle(&mut fresh);
        self.queue.extend(fresh);
    }
}

/// Seeded bag randomizer, safe to share between threads
#[derive(Debug)]
pub struct Bag {
    seed: u64,
    templates: Vec<Arc<Mino>>,
    state: Mutex<BagState>,
}

impl Bag {
    pub fn new(seed: u64, templates: Vec<Arc<Mino>>) -> Self {
        let mut state = BagState {
            queue: VecDeque::with_capacity(templates.len()),
            rng: SimpleRng::new(seed),
        };
        state.refill(&templates);
        Self {
            seed,
            templates,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove and return the next template
    ///
    /// Returns `None` only when the template set itself is empty.
    pub fn take(&self) -> Option<Arc<Mino>> {
        let mut state = self.lock();
        let mino = state.queue.pop_front()?;
        if state.queue.is_empty() {
            state.refill(&self.templates);
        }
        Some(mino)
    }

    /// Peek at the next template without removing it
    pub fn next(&self) -> Option<Arc<Mino>> {
        self.lock().queue.front().cloned()
    }

    /// Number of templates left before the next refill
    pub fn remaining(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn templates(&self) -> &[Arc<Mino>] {
        &self.templates
    }

    /// Position of a drawn template in the template set
    pub fn template_index(&self, mino: &Arc<Mino>) -> Option<usize> {
        self.templates.iter().position(|t| Arc::ptr_eq(t, mino))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;

    fn tetromino_bag(seed: u64) -> Bag {
        let minos = Generator::new().generate(4).unwrap();
        Bag::new(seed, minos)
    }

    #[test]
    fn test_take_yields_each_template_once_per_cycle() {
        let bag = tetromino_bag(1);
        let n = bag.templates().len();

        for _ in 0..3 {
            let mut drawn: Vec<usize> = (0..n)
                .map(|_| bag.template_index(&bag.take().unwrap()).unwrap())
                .collect();
            drawn.sort_unstable();
            assert_eq!(drawn, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_next_matches_take() {
        let bag = tetromino_bag(42);
        for _ in 0..12 {
            let peeked = bag.next().unwrap();
            let taken = bag.take().unwrap();
            assert!(Arc::ptr_eq(&peeked, &taken));
        }
    }

    #[test]
    fn test_queue_never_empty() {
        let bag = tetromino_bag(3);
        for _ in 0..20 {
            bag.take();
            assert!(bag.remaining() > 0);
            assert!(bag.next().is_some());
        }
    }

    #[test]
    fn test_templates_untouched_by_shuffle() {
        let minos = Generator::new().generate(4).unwrap();
        let bag = Bag::new(9, minos.clone());
        for _ in 0..10 {
            bag.take();
        }
        for (a, b) in bag.templates().iter().zip(minos.iter()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_empty_template_set() {
        let bag = Bag::new(1, Vec::new());
        assert!(bag.take().is_none());
        assert!(bag.next().is_none());
    }
}
