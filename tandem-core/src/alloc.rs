//! LSEQ-style position allocation.
//!
//! Given two neighbor positions `left < right`, [`Allocator::allocate`]
//! produces a fresh position strictly between them, digit by digit. Each
//! depth commits to one of two boundary strategies the first time it is
//! visited and keeps it for the lifetime of the replica, which keeps
//! identifiers short under both prepend- and append-heavy editing.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::peer::PeerId;
use crate::position::{Digit, Position, base};

/// Maximum random step when a gap is wider than needed.
pub const BOUNDARY: u32 = 15;

/// Which side of a gap a depth allocates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Allocate close to the left neighbor.
    Plus,
    /// Allocate close to the right neighbor.
    Minus,
}

/// Per-replica allocator state: the strategy cache and its RNG.
#[derive(Debug)]
pub struct Allocator {
    peer: PeerId,
    strategies: HashMap<usize, Strategy>,
    rng: StdRng,
}

impl Allocator {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            strategies: HashMap::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// A deterministic allocator for tests.
    #[must_use]
    pub fn with_seed(peer: PeerId, seed: u64) -> Self {
        Self {
            peer,
            strategies: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Allocates a position strictly between `left` and `right`.
    ///
    /// # Panics
    ///
    /// Panics if `left >= right`: the caller handed over unordered
    /// neighbors, which means replica state is already corrupt.
    pub fn allocate(&mut self, left: &Position, right: &Position) -> Position {
        assert!(left < right, "allocation needs ordered neighbors");

        let mut digits: Vec<Digit> = Vec::new();
        let mut p = left.digits();
        let mut q = right.digits();

        for depth in 1.. {
            let rng = &mut self.rng;
            let strategy = *self.strategies.entry(depth).or_insert_with(|| {
                if rng.random() {
                    Strategy::Plus
                } else {
                    Strategy::Minus
                }
            });

            let ph = p.first().map_or(0, |d| d.value);
            let qh = q.first().map_or_else(|| base(depth), |d| d.value);
            let interval = i64::from(qh) - i64::from(ph);

            if interval > 1 {
                let step =
                    u32::try_from(interval - 1).expect("gap fits in u32").min(BOUNDARY);
                let offset = self.rng.random_range(1..=step);
                let value = match strategy {
                    Strategy::Plus => ph + offset,
                    Strategy::Minus => qh - offset,
                };
                digits.push(Digit::new(value, self.peer.clone()));
                return Position::new(digits);
            }

            assert!(
                interval >= 0,
                "digit heads inverted at depth {depth}: {ph} > {qh}"
            );

            // Gap of zero or one: copy the left head and descend a level.
            let pid_p = p.first().map_or_else(|| self.peer.clone(), |d| d.author.clone());
            let (author, next_q): (PeerId, &[Digit]) = match (interval, q.first()) {
                (0, Some(qd)) if pid_p > qd.author => {
                    // Colliding digit whose left author outranks the right:
                    // adopt the right author so the result stays below it.
                    warn!(depth, left = %pid_p, right = %qd.author, "digit author collision, adopting right author");
                    (qd.author.clone(), &q[1..])
                }
                (0, Some(qd)) if pid_p == qd.author => (pid_p, &q[1..]),
                _ => (pid_p, &[]),
            };

            digits.push(Digit::new(ph, author));
            p = p.get(1..).unwrap_or(&[]);
            q = next_q;
        }
        unreachable!("digit bases grow without bound")
    }
}
