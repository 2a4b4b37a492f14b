//! The replicated document.
//!
//! A [`DocCrdt`] holds every live character in an order-statistics tree keyed
//! by `(position, id)`, bracketed by two sentinels, plus an id-to-position
//! index for remote deletes. Local edits allocate fresh positions; remote
//! operations are idempotent and never fail.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alloc::Allocator;
use crate::error::DocError;
use crate::op::{Char, CharId};
use crate::ostree::OrderStatTree;
use crate::peer::PeerId;
use crate::position::Position;

/// The full character set of a replica, as shipped to joiners and written to
/// the snapshot store. Sentinels are excluded; receivers rebuild their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub chars: Vec<Char>,
}

/// One peer's replica of the shared document.
pub struct DocCrdt {
    peer: PeerId,
    tree: OrderStatTree<Char>,
    pos_by_id: HashMap<CharId, Position>,
    alloc: Allocator,
    counter: u64,
}

impl DocCrdt {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        let alloc = Allocator::new(peer.clone());
        Self::with_allocator(peer, alloc)
    }

    /// A replica with a seeded allocator, for deterministic tests.
    #[must_use]
    pub fn with_seed(peer: PeerId, seed: u64) -> Self {
        let alloc = Allocator::with_seed(peer.clone(), seed);
        Self::with_allocator(peer, alloc)
    }

    fn with_allocator(peer: PeerId, alloc: Allocator) -> Self {
        let mut doc = Self {
            peer,
            tree: OrderStatTree::new(),
            pos_by_id: HashMap::new(),
            alloc,
            counter: 0,
        };
        for sentinel in [
            Char::sentinel(0, Position::begin()),
            Char::sentinel(1, Position::end()),
        ] {
            doc.pos_by_id
                .insert(sentinel.id.clone(), sentinel.pos.clone());
            doc.tree.insert(sentinel);
        }
        doc
    }

    /// Rebuilds a replica from a snapshot, keeping `peer` as the local
    /// identity. The character counter resumes past the highest id this
    /// peer has ever allocated, so a rejoining peer never reuses one.
    #[must_use]
    pub fn restore(peer: PeerId, snapshot: DocSnapshot) -> Self {
        let mut doc = Self::new(peer);
        for ch in snapshot.chars {
            if ch.id.author == doc.peer {
                doc.counter = doc.counter.max(ch.id.seq);
            }
            doc.pos_by_id.insert(ch.id.clone(), ch.pos.clone());
            doc.tree.insert(ch);
        }
        doc
    }

    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Number of live characters (sentinels excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len() - 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `value` after the `index`-th live character (1-based;
    /// `index = 0` inserts before the first). Returns the generated
    /// character for broadcast.
    ///
    /// # Errors
    ///
    /// [`DocError::IndexOutOfRange`] when `index > len()`; state unchanged.
    pub fn insert_local(&mut self, index: usize, value: char) -> Result<Char, DocError> {
        let len = self.len();
        if index > len {
            return Err(DocError::IndexOutOfRange { index, len });
        }
        // Tree rank 1 is the low sentinel, so live index k sits at rank k+1.
        let left = self
            .tree
            .kth(index + 1)
            .expect("left neighbor exists")
            .pos
            .clone();
        let right = self
            .tree
            .kth(index + 2)
            .expect("right neighbor exists")
            .pos
            .clone();
        let pos = self.alloc.allocate(&left, &right);

        self.counter += 1;
        let ch = Char::new(CharId::new(self.peer.clone(), self.counter), pos, value);
        self.pos_by_id.insert(ch.id.clone(), ch.pos.clone());
        self.tree.insert(ch.clone());
        Ok(ch)
    }

    /// Removes the `index`-th live character (1-based) and returns its id
    /// for broadcast.
    ///
    /// # Errors
    ///
    /// [`DocError::IndexOutOfRange`] when `index` is zero or past the end;
    /// state unchanged.
    pub fn delete_local(&mut self, index: usize) -> Result<CharId, DocError> {
        let len = self.len();
        if index == 0 || index > len {
            return Err(DocError::IndexOutOfRange { index, len });
        }
        let target = self
            .tree
            .kth(index + 1)
            .expect("indexed char exists")
            .clone();
        self.tree.remove(&target);
        self.pos_by_id.remove(&target.id);
        Ok(target.id)
    }

    /// Applies a remote insert. Returns the character's 1-based live index,
    /// or `None` when the id was already present (idempotent no-op).
    pub fn apply_remote_insert(&mut self, ch: Char) -> Option<usize> {
        if self.pos_by_id.contains_key(&ch.id) {
            return None;
        }
        self.pos_by_id.insert(ch.id.clone(), ch.pos.clone());
        self.tree.insert(ch.clone());
        let rank = self.tree.rank(&ch).expect("just inserted");
        Some(rank - 1)
    }

    /// Applies a remote delete. Returns the character's 1-based live index
    /// just before removal, or `None` when already gone (idempotent no-op).
    pub fn apply_remote_delete(&mut self, id: &CharId) -> Option<usize> {
        let pos = self.pos_by_id.remove(id)?;
        let probe = Char {
            id: id.clone(),
            pos,
            value: None,
        };
        let rank = self.tree.rank(&probe).expect("indexed char is in the tree");
        self.tree.remove(&probe);
        Some(rank - 1)
    }

    /// The plain-text projection, in tree order, sentinels excluded.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.tree.iter().filter_map(|c| c.value).collect()
    }

    /// Every live character in tree order, for state transfer and autosnap.
    #[must_use]
    pub fn snapshot(&self) -> DocSnapshot {
        DocSnapshot {
            chars: self
                .tree
                .iter()
                .filter(|c| c.value.is_some())
                .cloned()
                .collect(),
        }
    }
}
