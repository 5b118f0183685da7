//! Multi-threaded BGZF streaming decompression.
//!
//! BGZF blocks are fully independent, so a chunk's worth of them can be
//! inflated in parallel. This stream parses every complete block out of its
//! input buffer, decompresses the batch on a dedicated worker pool, and
//! drains the decoded backlog into the caller's window.
//!
//! # Memory
//!
//! Bounded regardless of file size: one compressed input chunk plus its
//! decompressed blocks (a 1 MiB chunk of 64 KiB-bounded blocks stays in the
//! single-digit MiB range), recycled every batch.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Seek, SeekFrom};

use rayon::prelude::*;
use rayon::ThreadPool;

use super::bgzf::{inflate_block_into, parse_block, BgzfStream, BlockSpec};
use super::{read_retry, FillStatus};
use crate::error::{Result, TextError};
use crate::CHUNK_SIZE;

/// BGZF decoder that pipelines block decompression over a worker pool.
///
/// The pool survives rewind and retarget; only the file and buffers reset.
pub(crate) struct BgzfMtStream {
    pool: ThreadPool,
    file: File,
    in_buf: Box<[u8]>,
    in_pos: usize,
    in_len: usize,
    /// Decoded blocks not yet handed to the caller.
    ready: VecDeque<Vec<u8>>,
    /// Read offset into the front of `ready`.
    front_pos: usize,
    at_eof: bool,
}

impl BgzfMtStream {
    pub(crate) fn new(file: File, seed: &[u8], threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lineflow-bgzf-{i}"))
            .build()
            .map_err(|_| TextError::ThreadCreate)?;
        let mut in_buf = vec![0u8; CHUNK_SIZE].into_boxed_slice();
        in_buf[..seed.len()].copy_from_slice(seed);
        Ok(BgzfMtStream {
            pool,
            file,
            in_pos: 0,
            in_len: seed.len(),
            in_buf,
            ready: VecDeque::new(),
            front_pos: 0,
            at_eof: false,
        })
    }

    /// Take over from a sync block decoder, inheriting its file and
    /// unconsumed input.
    pub(crate) fn from_sync(sync: BgzfStream, threads: usize) -> Result<Self> {
        let (file, in_buf, in_pos, in_len, at_eof) = sync.into_parts();
        let mut stream = Self::new(file, &in_buf[in_pos..in_len], threads)?;
        stream.at_eof = at_eof;
        Ok(stream)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| TextError::read_err(&e))?;
        self.reset_state(&[]);
        Ok(())
    }

    /// Switch to a new file; the worker pool is kept and the old file closes
    /// on drop. `seed` is the new file's probed bytes.
    pub(crate) fn reseed(&mut self, file: File, seed: &[u8]) {
        self.file = file;
        self.reset_state(seed);
    }

    fn reset_state(&mut self, seed: &[u8]) {
        self.in_buf[..seed.len()].copy_from_slice(seed);
        self.in_pos = 0;
        self.in_len = seed.len();
        self.ready.clear();
        self.front_pos = 0;
        self.at_eof = false;
    }

    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        let mut written = 0;
        loop {
            // Drain the decoded backlog first.
            while written < out.len() {
                let Some(front) = self.ready.front() else {
                    break;
                };
                let n = (front.len() - self.front_pos).min(out.len() - written);
                out[written..written + n]
                    .copy_from_slice(&front[self.front_pos..self.front_pos + n]);
                written += n;
                self.front_pos += n;
                if self.front_pos == front.len() {
                    self.ready.pop_front();
                    self.front_pos = 0;
                }
            }
            if written == out.len() {
                return Ok((written, FillStatus::Window));
            }
            let batch = self.parse_batch()?;
            if !batch.is_empty() {
                self.inflate_batch(&batch)?;
                continue;
            }
            // Need more input.
            let residue = self.in_len - self.in_pos;
            if self.at_eof {
                if residue != 0 {
                    return Err(TextError::invalid_bgzf());
                }
                return Ok((written, FillStatus::Eof));
            }
            self.in_buf.copy_within(self.in_pos..self.in_len, 0);
            self.in_pos = 0;
            self.in_len = residue;
            let n = read_retry(&mut self.file, &mut self.in_buf[residue..])
                .map_err(|e| TextError::read_err(&e))?;
            self.in_len = residue + n;
            if n == 0 {
                self.at_eof = true;
            }
        }
    }

    /// Collect every complete block currently in the input buffer.
    fn parse_batch(&mut self) -> Result<Vec<BlockSpec>> {
        let mut specs = Vec::new();
        while let Some(spec) = parse_block(&self.in_buf[..self.in_len], self.in_pos)? {
            self.in_pos = spec.data_start + spec.in_size + 8;
            specs.push(spec);
        }
        Ok(specs)
    }

    /// Decompress a batch of blocks in parallel, preserving order.
    fn inflate_batch(&mut self, batch: &[BlockSpec]) -> Result<()> {
        let in_buf = &self.in_buf;
        let blocks: Result<Vec<Vec<u8>>> = self.pool.install(|| {
            batch
                .par_iter()
                .map(|spec| {
                    let mut out = vec![0u8; spec.out_size];
                    let data = &in_buf[spec.data_start..spec.data_start + spec.in_size];
                    inflate_block_into(data, &mut out, spec.crc)?;
                    Ok(out)
                })
                .collect()
        });
        for block in blocks? {
            if !block.is_empty() {
                self.ready.push_back(block);
            }
        }
        Ok(())
    }
}
