//! Fisher–Yates shuffle driven by one random `u32` per swap.
//!
//! The swap partner is picked with `value % (i + 1)`. That leaves a small
//! modulo bias whenever `i + 1` is not a power of two; it is kept as-is since
//! no consumer needs provably uniform permutations.

use rand::{rngs::OsRng, RngCore};

use crate::deck::Deck;

/// Boxed random source owned by the sequencer.
pub type BoxedRng = Box<dyn RngCore + Send>;

/// Operating-system entropy, the default source for live dealing.
pub fn os_rng() -> BoxedRng {
    Box::new(OsRng)
}

/// Permutes `items` in place.
pub fn shuffle_in_place<T, R>(items: &mut [T], rng: &mut R)
where
    R: RngCore + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.next_u32() as usize % (i + 1);
        items.swap(i, j);
    }
}

impl Deck {
    pub fn shuffle<R>(&mut self, rng: &mut R)
    where
        R: RngCore + ?Sized,
    {
        shuffle_in_place(self.cards_mut(), rng);
    }
}
