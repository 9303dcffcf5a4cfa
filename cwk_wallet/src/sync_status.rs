use crate::model::Height;
use cwk_common::BlockHash;
use std::collections::VecDeque;

/// How many recent block hashes are remembered for fork recovery.
pub(crate) const LAST_KNOWN_HASHES_SIZE: usize = 100;

/// Every multiple of this height the hash is also kept as a checkpoint.
pub(crate) const CHECKPOINT_INTERVAL: u64 = 5_000;

/// Where the synchronizer is on the chain: a rolling window of the most
/// recent block hashes plus sparse checkpoints, so the node can resume us
/// after a fork of up to [`LAST_KNOWN_HASHES_SIZE`] blocks without a rescan,
/// and from the nearest checkpoint for anything deeper.
///
/// The window is height-contiguous, newest first. Checkpoints are strictly
/// descending in height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    last_known_hashes: VecDeque<BlockHash>,
    checkpoints: VecDeque<(Height, BlockHash)>,
    last_known_height: Height,
}

impl SyncStatus {
    /// Restore from persisted parts. Checkpoint heights are implied by the
    /// storage rule: they sit at descending [`CHECKPOINT_INTERVAL`]
    /// boundaries from the last known height.
    pub(crate) fn from_parts(
        last_known_hashes: Vec<BlockHash>,
        checkpoint_hashes: Vec<BlockHash>,
        last_known_height: Height,
    ) -> Self {
        let top_boundary = last_known_height / CHECKPOINT_INTERVAL * CHECKPOINT_INTERVAL;
        let checkpoints = checkpoint_hashes
            .into_iter()
            .enumerate()
            .map(|(i, hash)| {
                (
                    top_boundary.saturating_sub(i as u64 * CHECKPOINT_INTERVAL),
                    hash,
                )
            })
            .collect();
        Self {
            last_known_hashes: last_known_hashes.into_iter().collect(),
            checkpoints,
            last_known_height,
        }
    }

    /// Record the hash of a newly processed block.
    ///
    /// A height that is not contiguous with the window (e.g. a top-block
    /// re-alignment while fully synced) restarts the window at that height.
    pub fn store_block_hash(&mut self, height: Height, hash: BlockHash) {
        if !self.last_known_hashes.is_empty() && height != self.last_known_height + 1 {
            self.last_known_hashes.clear();
        }
        self.last_known_hashes.push_front(hash);
        self.last_known_hashes.truncate(LAST_KNOWN_HASHES_SIZE);

        if height % CHECKPOINT_INTERVAL == 0 {
            self.checkpoints.push_front((height, hash));
        }

        self.last_known_height = height;
    }

    /// The height of the newest stored block, 0 before any block was stored.
    pub fn last_known_height(&self) -> Height {
        self.last_known_height
    }

    /// The hash of the newest stored block.
    pub fn top_hash(&self) -> Option<BlockHash> {
        self.last_known_hashes.front().copied()
    }

    /// The stored hash at `height`, if it is still inside the window.
    pub fn hash_at(&self, height: Height) -> Option<BlockHash> {
        if height > self.last_known_height {
            return None;
        }
        let depth = (self.last_known_height - height) as usize;
        self.last_known_hashes.get(depth).copied()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.last_known_hashes.is_empty() && self.checkpoints.is_empty()
    }

    /// The hashes sent with a `getBlocks` request: the recent window first,
    /// then the checkpoints, both descending in height.
    pub fn checkpoints_for_request(&self) -> Vec<BlockHash> {
        self.last_known_hashes
            .iter()
            .chain(self.checkpoints.iter().map(|(_, hash)| hash))
            .copied()
            .collect()
    }

    /// Forget everything above `height` (fork recovery or explicit rewind).
    pub fn rewind_to(&mut self, height: Height) {
        if height >= self.last_known_height {
            return;
        }
        let drop = (self.last_known_height - height) as usize;
        if drop >= self.last_known_hashes.len() {
            self.last_known_hashes.clear();
        } else {
            self.last_known_hashes.drain(..drop);
        }
        while matches!(self.checkpoints.front(), Some((h, _)) if *h > height) {
            self.checkpoints.pop_front();
        }
        self.last_known_height = height;
    }

    pub(crate) fn window(&self) -> impl Iterator<Item = &BlockHash> {
        self.last_known_hashes.iter()
    }

    pub(crate) fn checkpoint_hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.checkpoints.iter().map(|(_, hash)| hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        BlockHash::from_bytes(bytes)
    }

    fn filled(from: u64, to: u64) -> SyncStatus {
        let mut status = SyncStatus::default();
        for h in from..=to {
            status.store_block_hash(h, hash(h));
        }
        status
    }

    #[test]
    fn test_window_bounded_and_contiguous() {
        let status = filled(1, 250);
        assert_eq!(status.last_known_height(), 250);
        assert_eq!(status.checkpoints_for_request().len(), 100);
        assert_eq!(status.top_hash(), Some(hash(250)));
        assert_eq!(status.hash_at(151), Some(hash(151)));
        assert_eq!(status.hash_at(150), None); // evicted
        assert_eq!(status.hash_at(251), None);
    }

    #[test]
    fn test_checkpoints_every_boundary() {
        let status = filled(4_999, 15_001);
        // window of 100 + checkpoints at 15_000, 10_000, 5_000
        let request = status.checkpoints_for_request();
        assert_eq!(request.len(), 103);
        assert_eq!(request[0], hash(15_001));
        assert_eq!(request[100], hash(15_000));
        assert_eq!(request[101], hash(10_000));
        assert_eq!(request[102], hash(5_000));
    }

    #[test]
    fn test_rewind() {
        let mut status = filled(1, 10_050);
        status.rewind_to(10_010);
        assert_eq!(status.last_known_height(), 10_010);
        assert_eq!(status.top_hash(), Some(hash(10_010)));
        assert_eq!(status.hash_at(10_000), Some(hash(10_000)));

        // Rewinding below the checkpoint drops it too
        status.rewind_to(9_999);
        assert!(status
            .checkpoints_for_request()
            .iter()
            .all(|h| *h != hash(10_000)));

        // Rewinding deeper than the window empties it
        status.rewind_to(5);
        assert_eq!(status.top_hash(), None);
        assert_eq!(status.last_known_height(), 5);
    }

    #[test]
    fn test_non_contiguous_store_restarts_window() {
        let mut status = filled(1, 50);
        status.store_block_hash(500, hash(500));
        assert_eq!(status.last_known_height(), 500);
        assert_eq!(status.top_hash(), Some(hash(500)));
        assert_eq!(status.hash_at(50), None);
        assert_eq!(status.checkpoints_for_request().len(), 1);
    }

    #[test]
    fn test_from_parts_restores_checkpoint_heights() {
        let status = filled(4_999, 15_001);
        let restored = SyncStatus::from_parts(
            status.window().copied().collect(),
            status.checkpoint_hashes().copied().collect(),
            status.last_known_height(),
        );
        assert_eq!(status, restored);
    }
}
