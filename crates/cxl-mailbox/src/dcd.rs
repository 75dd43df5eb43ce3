//! Dynamic capacity regions and the extent ledger.
//!
//! Extents are host-accepted sub-ranges of a region. Every batch from the
//! host is checked in full (region lookup, block alignment, intra-batch
//! duplicates, conflicts with existing extents) before the ledger changes, so
//! a rejected batch leaves no partial state.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::MailboxStatus;

type StatusResult<T> = std::result::Result<T, MailboxStatus>;

/// Most minimum-size blocks the dynamic capacity range may span. Batch
/// validation keeps one bit per block.
pub const MAX_DC_BLOCKS: u64 = 1 << 24;

/// A dynamic capacity region. Regions are ordered by base and never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub base: u64,
    /// Decoded size; a multiple of the capacity multiplier.
    pub decode_len: u64,
    /// Usable size; a multiple of `block_size`.
    pub len: u64,
    pub block_size: u64,
    pub dsmad_handle: u32,
    pub flags: u8,
}

impl Region {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.len)
    }

    fn decode_end(&self) -> u64 {
        self.base.saturating_add(self.decode_len)
    }
}

/// An accepted extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub len: u64,
    pub tag: [u8; 16],
    pub shared_seq: u16,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }
}

/// One `{start, length}` entry of an add or release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentRange {
    pub start: u64,
    pub len: u64,
}

impl ExtentRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }

    fn overlaps(&self, ext: &Extent) -> bool {
        self.start < ext.end() && ext.start < self.end()
    }

    fn within(&self, ext: &Extent) -> bool {
        ext.start <= self.start && self.end() <= ext.end()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DcStore {
    regions: Vec<Region>,
    extents: Vec<Extent>,
    generation: u32,
}

impl DcStore {
    pub fn new(regions: Vec<Region>) -> Result<Self> {
        for (index, pair) in regions.windows(2).enumerate() {
            if pair[0].decode_end() > pair[1].base {
                return Err(ConfigError::RegionOrder {
                    prev: index,
                    index: index + 1,
                });
            }
        }
        let blocks = block_span(&regions).1;
        if blocks > MAX_DC_BLOCKS {
            return Err(ConfigError::TooManyBlocks {
                blocks,
                max: MAX_DC_BLOCKS,
            });
        }
        for (index, region) in regions.iter().enumerate() {
            if region.len > region.decode_len {
                return Err(ConfigError::UnalignedRegion {
                    index,
                    len: region.len,
                    block_size: region.block_size,
                });
            }
        }
        Ok(Self {
            regions,
            extents: Vec::new(),
            generation: 0,
        })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Bumped on every ledger change so paginated readers can detect tearing.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Total decoded dynamic capacity.
    pub fn total_capacity(&self) -> u64 {
        self.regions.iter().map(|r| r.decode_len).sum()
    }

    /// Up to `count` regions starting at `start_id`.
    pub fn region_config(&self, start_id: usize, count: usize) -> StatusResult<&[Region]> {
        if start_id >= self.regions.len() {
            return Err(MailboxStatus::InvalidInput);
        }
        let end = start_id.saturating_add(count).min(self.regions.len());
        Ok(&self.regions[start_id..end])
    }

    /// Up to `count` extents starting at `start_idx`.
    pub fn extent_list(&self, start_idx: usize, count: usize) -> StatusResult<&[Extent]> {
        if start_idx > self.extents.len() {
            return Err(MailboxStatus::InvalidInput);
        }
        let end = start_idx.saturating_add(count).min(self.extents.len());
        Ok(&self.extents[start_idx..end])
    }

    /// The highest region whose base is at or below `addr`.
    pub fn find_region(&self, addr: u64) -> Option<&Region> {
        self.regions.iter().rev().find(|r| r.base <= addr)
    }

    /// Checks a host batch against the region table.
    ///
    /// Every entry must fall inside a single region, be aligned to that
    /// region's block size, and no block may be named twice in the batch.
    pub fn validate_batch(&self, entries: &[ExtentRange]) -> StatusResult<()> {
        let Some(first) = self.regions.first() else {
            return if entries.is_empty() {
                Ok(())
            } else {
                Err(MailboxStatus::InvalidPhysicalAddress)
            };
        };
        let (granule, blocks) = block_span(&self.regions);
        let mut seen = BlockBitmap::new(blocks);

        for entry in entries {
            let region = self
                .find_region(entry.start)
                .ok_or(MailboxStatus::InvalidPhysicalAddress)?;
            if entry.end() > region.end() {
                return Err(MailboxStatus::InvalidPhysicalAddress);
            }
            if entry.len == 0
                || entry.start % region.block_size != 0
                || entry.len % region.block_size != 0
            {
                return Err(MailboxStatus::InvalidExtentList);
            }
            let first_block = (entry.start - first.base) / granule;
            let blocks = entry.len / granule;
            if !seen.set_range(first_block, blocks) {
                return Err(MailboxStatus::InvalidExtentList);
            }
        }
        Ok(())
    }

    /// Accepts host-offered extents. An empty batch is a no-op.
    pub fn add(&mut self, entries: &[ExtentRange]) -> StatusResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.validate_batch(entries)?;
        if entries
            .iter()
            .any(|e| self.extents.iter().any(|ext| e.overlaps(ext)))
        {
            return Err(MailboxStatus::InvalidPhysicalAddress);
        }
        self.extents.extend(entries.iter().map(|e| Extent {
            start: e.start,
            len: e.len,
            tag: [0; 16],
            shared_seq: 0,
        }));
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }

    /// Releases host-returned capacity. An empty batch is invalid.
    ///
    /// Each entry must lie within one existing extent; the remainders on
    /// either side stay in the ledger with the original tag.
    pub fn release(&mut self, entries: &[ExtentRange]) -> StatusResult<()> {
        if entries.is_empty() {
            return Err(MailboxStatus::InvalidInput);
        }
        self.validate_batch(entries)?;

        let mut updated = self.extents.clone();
        for entry in entries {
            let idx = match updated.iter().position(|ext| entry.overlaps(ext)) {
                Some(idx) if entry.within(&updated[idx]) => idx,
                Some(_) => return Err(MailboxStatus::InvalidExtentList),
                None => return Err(MailboxStatus::InvalidPhysicalAddress),
            };
            let ext = updated.remove(idx);
            let mut at = idx;
            if entry.start > ext.start {
                updated.insert(
                    at,
                    Extent {
                        len: entry.start - ext.start,
                        ..ext
                    },
                );
                at += 1;
            }
            if entry.end() < ext.end() {
                updated.insert(
                    at,
                    Extent {
                        start: entry.end(),
                        len: ext.end() - entry.end(),
                        ..ext
                    },
                );
            }
        }
        self.extents = updated;
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }

    /// Provisions an extent without a host request.
    pub fn insert_extent(
        &mut self,
        start: u64,
        len: u64,
        tag: [u8; 16],
        shared_seq: u16,
    ) -> StatusResult<()> {
        let range = ExtentRange::new(start, len);
        self.validate_batch(&[range])?;
        if self.extents.iter().any(|ext| range.overlaps(ext)) {
            return Err(MailboxStatus::InvalidPhysicalAddress);
        }
        self.extents.push(Extent {
            start,
            len,
            tag,
            shared_seq,
        });
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }
}

/// Smallest block size across `regions` and the number of such blocks from
/// the first region's base to the last region's end.
fn block_span(regions: &[Region]) -> (u64, u64) {
    let granule = regions
        .iter()
        .map(|r| r.block_size)
        .min()
        .unwrap_or(1)
        .max(1);
    let span = match (regions.first(), regions.last()) {
        (Some(first), Some(last)) => last.end().saturating_sub(first.base),
        _ => 0,
    };
    (granule, span / granule)
}

/// One bit per minimum-size block across the dynamic capacity range.
struct BlockBitmap {
    words: Vec<u64>,
    bits: u64,
}

impl BlockBitmap {
    fn new(bits: u64) -> Self {
        let words = usize::try_from(bits.div_ceil(64)).unwrap_or(0);
        Self {
            words: vec![0; words],
            bits,
        }
    }

    /// Marks `[first, first + count)`; returns `false` if any bit was already set.
    fn set_range(&mut self, first: u64, count: u64) -> bool {
        let Some(end) = first.checked_add(count) else {
            return false;
        };
        if end > self.bits {
            return false;
        }
        for bit in first..end {
            let (word, mask) = ((bit / 64) as usize, 1u64 << (bit % 64));
            if self.words[word] & mask != 0 {
                return false;
            }
            self.words[word] |= mask;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;
    const BASE: u64 = 256 * MIB;

    fn store() -> DcStore {
        DcStore::new(vec![
            Region {
                base: BASE,
                decode_len: 256 * MIB,
                len: 256 * MIB,
                block_size: 2 * MIB,
                dsmad_handle: 0,
                flags: 0,
            },
            Region {
                base: BASE + 256 * MIB,
                decode_len: 256 * MIB,
                len: 128 * MIB,
                block_size: 4 * MIB,
                dsmad_handle: 1,
                flags: 0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn rejects_region_table_too_fine_to_track() {
        let mut regions = store().regions().to_vec();
        regions[0].block_size = 64;
        regions[1].len = 256 * MIB;
        // 512MiB in 64-byte blocks fits; another 1GiB region does not.
        assert!(DcStore::new(regions.clone()).is_ok());
        regions.push(Region {
            base: BASE + 512 * MIB,
            decode_len: 1024 * MIB,
            len: 1024 * MIB,
            dsmad_handle: 2,
            ..regions[1]
        });
        assert!(matches!(
            DcStore::new(regions),
            Err(ConfigError::TooManyBlocks { max: MAX_DC_BLOCKS, .. })
        ));
    }

    #[test]
    fn rejects_overlapping_regions() {
        let mut regions = store().regions().to_vec();
        regions[1].base = BASE + 128 * MIB;
        assert!(matches!(
            DcStore::new(regions),
            Err(ConfigError::RegionOrder { prev: 0, index: 1 })
        ));
    }

    #[test]
    fn find_region_picks_highest_base_below() {
        let s = store();
        assert_eq!(s.find_region(BASE - 1), None);
        assert_eq!(s.find_region(BASE).unwrap().dsmad_handle, 0);
        assert_eq!(s.find_region(BASE + 300 * MIB).unwrap().dsmad_handle, 1);
    }

    #[test]
    fn region_and_extent_paging() {
        let mut s = store();
        assert_eq!(s.region_config(1, 8).unwrap().len(), 1);
        assert_eq!(s.region_config(2, 1), Err(MailboxStatus::InvalidInput));

        s.add(&[ExtentRange::new(BASE, 2 * MIB), ExtentRange::new(BASE + 4 * MIB, 2 * MIB)])
            .unwrap();
        assert_eq!(s.extent_list(0, 1).unwrap().len(), 1);
        assert_eq!(s.extent_list(2, 1).unwrap().len(), 0);
        assert_eq!(s.extent_list(3, 1), Err(MailboxStatus::InvalidInput));
    }

    #[test]
    fn batch_validation() {
        let s = store();
        assert_eq!(
            s.validate_batch(&[ExtentRange::new(0, 2 * MIB)]),
            Err(MailboxStatus::InvalidPhysicalAddress)
        );
        assert_eq!(
            s.validate_batch(&[ExtentRange::new(BASE + MIB, 2 * MIB)]),
            Err(MailboxStatus::InvalidExtentList)
        );
        // 2MiB is not a multiple of the second region's 4MiB blocks.
        assert_eq!(
            s.validate_batch(&[ExtentRange::new(BASE + 256 * MIB, 2 * MIB)]),
            Err(MailboxStatus::InvalidExtentList)
        );
        // Runs past the usable end of the second region.
        assert_eq!(
            s.validate_batch(&[ExtentRange::new(BASE + 256 * MIB, 132 * MIB)]),
            Err(MailboxStatus::InvalidPhysicalAddress)
        );
        assert_eq!(
            s.validate_batch(&[
                ExtentRange::new(BASE, 4 * MIB),
                ExtentRange::new(BASE + 2 * MIB, 2 * MIB),
            ]),
            Err(MailboxStatus::InvalidExtentList)
        );
    }

    #[test]
    fn add_rejects_overlap_without_partial_commit() {
        let mut s = store();
        s.add(&[ExtentRange::new(BASE, 4 * MIB)]).unwrap();
        let generation = s.generation();
        assert_eq!(
            s.add(&[
                ExtentRange::new(BASE + 8 * MIB, 2 * MIB),
                ExtentRange::new(BASE + 2 * MIB, 2 * MIB),
            ]),
            Err(MailboxStatus::InvalidPhysicalAddress)
        );
        assert_eq!(s.extents().len(), 1);
        assert_eq!(s.generation(), generation);
        assert_eq!(s.add(&[]), Ok(()));
        assert_eq!(s.generation(), generation);
    }

    #[test]
    fn release_splits_and_keeps_tag() {
        let mut s = store();
        let tag = [7u8; 16];
        s.insert_extent(BASE, 8 * MIB, tag, 3).unwrap();
        s.release(&[ExtentRange::new(BASE + 2 * MIB, 2 * MIB)]).unwrap();

        let exts = s.extents();
        assert_eq!(exts.len(), 2);
        assert_eq!((exts[0].start, exts[0].len), (BASE, 2 * MIB));
        assert_eq!((exts[1].start, exts[1].len), (BASE + 4 * MIB, 4 * MIB));
        assert!(exts.iter().all(|e| e.tag == tag && e.shared_seq == 3));
    }

    #[test]
    fn release_errors() {
        let mut s = store();
        s.add(&[ExtentRange::new(BASE, 4 * MIB)]).unwrap();
        assert_eq!(s.release(&[]), Err(MailboxStatus::InvalidInput));
        assert_eq!(
            s.release(&[ExtentRange::new(BASE + 16 * MIB, 2 * MIB)]),
            Err(MailboxStatus::InvalidPhysicalAddress)
        );
        assert_eq!(
            s.release(&[ExtentRange::new(BASE + 2 * MIB, 4 * MIB)]),
            Err(MailboxStatus::InvalidExtentList)
        );
        // A failing second entry leaves the first unreleased.
        assert_eq!(
            s.release(&[
                ExtentRange::new(BASE, 2 * MIB),
                ExtentRange::new(BASE + 32 * MIB, 2 * MIB),
            ]),
            Err(MailboxStatus::InvalidPhysicalAddress)
        );
        assert_eq!(s.extents().len(), 1);
        assert_eq!(s.extents()[0].len, 4 * MIB);
    }
}
