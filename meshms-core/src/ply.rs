//! Tail-first, buffered reader over a ply payload (spec §4.C).
//!
//! Per the design note in spec §9, the whole decrypted payload is buffered
//! in memory up front (plies are typically small) rather than driven over a
//! seekable decrypting stream — this turns "seek backwards" into ordinary
//! slicing, with no buffering-layer re-initialisation to get right.

use crate::error::{MeshmsError, Result};
use crate::record::{decode_footer, RecordType, FOOTER_LEN};
use crate::sid::Bid;
use crate::store::{BundleStore, Manifest, PayloadStatus};

/// Outcome of a single backward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyRead {
    Record,
    EndOfPly,
}

pub struct PlyReader {
    pub manifest: Manifest,
    payload: Vec<u8>,
    /// Current read cursor; strictly non-increasing across calls.
    pub offset: u64,
    pub length: u64,
    pub record_length: u16,
    pub record_end_offset: u64,
    pub record_type: Option<RecordType>,
    record: Vec<u8>,
}

impl PlyReader {
    /// Opens a reader at the tail of the ply identified by `bid` (spec §4.C "Open").
    pub fn open(store: &dyn BundleStore, bid: &Bid) -> Result<Self> {
        let manifest = store.retrieve_manifest(bid)?;
        Self::open_with_manifest(store, manifest)
    }

    /// As `open`, but reuses an already-retrieved manifest (used by the
    /// synchroniser, which just authenticated it for append).
    pub fn open_with_manifest(store: &dyn BundleStore, manifest: Manifest) -> Result<Self> {
        let filesize = manifest
            .filesize
            .ok_or_else(|| MeshmsError::InvalidPayload("filesize unset".into()))?;
        let (status, payload) = store.open_decrypting_reader(&manifest)?;
        match status {
            PayloadStatus::Stored | PayloadStatus::Empty => {}
            PayloadStatus::New => {
                return Err(MeshmsError::InvalidPayload(format!(
                    "payload not found for manifest {} version {}",
                    manifest.bid, manifest.version
                )))
            }
        }
        log::debug!("opened ply {} at offset {}", manifest.bid, filesize);
        Ok(Self {
            manifest,
            payload,
            offset: filesize,
            length: filesize,
            record_length: 0,
            record_end_offset: 0,
            record_type: None,
            record: Vec::new(),
        })
    }

    /// Repositions the cursor, clamped to the ply's length (spec §4.G:
    /// "Position recipient_reader at ack_offset (clamped to ≤ length)").
    pub fn seek(&mut self, offset: u64) {
        self.offset = offset.min(self.length);
    }

    pub fn seek_to_end(&mut self) {
        self.offset = self.length;
    }

    /// Bytes of the most recently decoded record.
    pub fn record(&self) -> &[u8] {
        &self.record
    }

    /// Reads the previous record (spec §4.C "Read previous").
    pub fn read_prev(&mut self) -> Result<PlyRead> {
        let end_offset = self.offset;
        self.record_end_offset = end_offset;
        if end_offset <= FOOTER_LEN as u64 {
            log::trace!("ply {} at EOF (offset {})", self.manifest.bid, end_offset);
            return Ok(PlyRead::EndOfPly);
        }
        let footer_start = (end_offset - FOOTER_LEN as u64) as usize;
        let footer = [self.payload[footer_start], self.payload[footer_start + 1]];
        let (record_type, record_length) = decode_footer(footer)?;
        let record_total = record_length as u64 + FOOTER_LEN as u64;
        if record_total > end_offset {
            // Record would straddle the tail: the ply was truncated mid-record.
            log::trace!("ply {} truncated mid-record at {}", self.manifest.bid, end_offset);
            return Ok(PlyRead::EndOfPly);
        }
        let record_start = (end_offset - record_total) as usize;
        self.record = self.payload[record_start..record_start + record_length as usize].to_vec();
        self.record_length = record_length;
        self.record_type = Some(record_type);
        self.offset = record_start as u64;
        log::trace!(
            "ply {} found record {:?} length {} @{}",
            self.manifest.bid,
            record_type,
            record_length,
            self.record_end_offset
        );
        Ok(PlyRead::Record)
    }

    /// Repeats `read_prev` until a record of `wanted` type, end-of-ply, or
    /// a decode error (spec §4.C "Find previous of type t").
    pub fn find_prev(&mut self, wanted: RecordType) -> Result<PlyRead> {
        loop {
            match self.read_prev()? {
                PlyRead::EndOfPly => return Ok(PlyRead::EndOfPly),
                PlyRead::Record => {
                    if self.record_type == Some(wanted) {
                        return Ok(PlyRead::Record);
                    }
                }
            }
        }
    }
}
