//! Asynchronous producer/consumer line reader.
//!
//! [`TextStream`] overlaps file I/O and decompression with consumer work: a
//! single producer thread decodes into a shared buffer and publishes windows
//! of complete lines, while the consumer walks previously published bytes.
//! When the producer reaches the buffer's end while the consumer still owns
//! a trailing window, it wraps: decoding resumes at the front and the
//! consumer is handed the boundary through a single `cur_circular_end`
//! marker.
//!
//! # Protocol
//!
//! All cursor publications happen under one mutex; two condvars carry
//! "producer published" and "consumer progressed" signals, each filtered
//! through a progress flag so a stale wakeup cannot advance the protocol.
//! The producer owns `[cur_block_start, read_head)` plus everything beyond
//! `read_head` up to `read_stop`; the consumer owns the published range. The
//! two ranges never overlap, which is what makes lock-free access to the
//! bytes themselves sound.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::ptr;
use std::slice;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use memchr::memchr;

use crate::decode::{read_retry, BgzfMtStream, Decoder, FillStatus};
use crate::detect::{sniff, FileKind};
use crate::error::{Result, TextError};
use crate::reader::{open_file, resolve_threads, Latch, ReaderOptions, TextReader};
use crate::scan::{is_pathologically_long, last_newline, last_space_or_eol};
use crate::{CACHELINE, CHUNK_SIZE};

/// Raw shared buffer. The authoritative copy lives in [`SyncState`]; the
/// producer and consumer each cache one and refetch after a reallocation.
#[derive(Clone, Copy)]
struct BufHandle {
    ptr: *mut u8,
    cap: usize,
}

// The protocol keeps producer- and consumer-owned byte ranges disjoint, so
// moving a handle across threads is sound.
unsafe impl Send for BufHandle {}

impl BufHandle {
    fn alloc(cap: usize) -> Self {
        Self::from_boxed(vec![0u8; cap].into_boxed_slice())
    }

    fn from_boxed(boxed: Box<[u8]>) -> Self {
        let cap = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        BufHandle { ptr, cap }
    }

    /// Reconstruct and drop the boxed slice. Must be called exactly once per
    /// allocation; the grow path frees the old handle after swapping in the
    /// new one, and [`Shared`]'s drop frees the final handle.
    unsafe fn free(self) {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.ptr, self.cap)));
    }
}

/// Consumer-to-producer request, strongest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Interrupt {
    None,
    Retarget,
    Shutdown,
}

/// Rendezvous state; every field is only touched under the mutex.
struct SyncState {
    buf: BufHandle,
    /// Latest value of the consumer's read cursor.
    consume_tail: usize,
    /// First byte beyond producer-published content.
    available_end: usize,
    /// When set, the consumer must treat `[consume_iter, cur_circular_end)`
    /// as the current linear region and wrap to offset 0 on reaching it.
    cur_circular_end: Option<usize>,
    /// One-shot flag telling the consumer to refetch `buf`.
    dst_reallocated: bool,
    /// Spurious-wake filter for the producer's waits.
    consumer_progress: bool,
    interrupt: Interrupt,
    new_fname: Option<PathBuf>,
    /// Producer-latched terminal state.
    latch: Latch,
    kind: FileKind,
}

struct Shared {
    m: Mutex<SyncState>,
    /// Signaled by the producer when it publishes bytes or a terminal state.
    producer_cv: Condvar,
    /// Signaled by the consumer when it consumes, retargets, or shuts down.
    consumer_cv: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.m.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let g = self.m.get_mut().unwrap_or_else(|e| e.into_inner());
        unsafe { g.buf.free() };
    }
}

/// What the producer should do after leaving a wait.
enum Pending {
    Shutdown,
    Retarget(Option<PathBuf>),
}

/// Honor an interrupt observed under the lock. Retarget state is consumed;
/// shutdown is left latched for the join.
fn take_interrupt(g: &mut SyncState) -> Option<Pending> {
    match g.interrupt {
        Interrupt::None => None,
        Interrupt::Shutdown => Some(Pending::Shutdown),
        Interrupt::Retarget => {
            g.interrupt = Interrupt::None;
            g.latch = Latch::Active;
            Some(Pending::Retarget(g.new_fname.take()))
        }
    }
}

/// How one fill round ended.
enum RoundEnd {
    /// Terminal state to publish, with the weakest interrupt that may
    /// release the producer afterwards.
    Latch(Latch, Interrupt),
    /// An interrupt arrived mid-round.
    Interrupted(Pending),
}

/// Producer-thread state. Owns the decoder (and through it the file);
/// shares the buffer.
struct Producer {
    shared: Arc<Shared>,
    decoder: Decoder,
    buf: BufHandle,
    /// Oldest byte not yet published.
    cur_block_start: usize,
    /// Next write position.
    read_head: usize,
    /// Upper write bound: the buffer end, or a cache-aligned floor of the
    /// consumer's cursor when unconsumed bytes sit in front of us.
    read_stop: usize,
    max_line_len: usize,
    fixed: bool,
    threads: usize,
}

impl Producer {
    fn run(mut self) {
        let mut carried: Option<(Latch, Interrupt)> = None;
        loop {
            let end = match carried.take() {
                Some((latch, min)) => RoundEnd::Latch(latch, min),
                None => self.fill_round(),
            };
            let pending = match end {
                RoundEnd::Latch(latch, min) => self.publish_and_wait(latch, min),
                RoundEnd::Interrupted(p) => p,
            };
            match pending {
                Pending::Shutdown => return,
                Pending::Retarget(new_path) => {
                    self.read_head = 0;
                    match self.apply_retarget(new_path.as_deref()) {
                        Ok(()) => {
                            self.cur_block_start = 0;
                            self.read_stop = self.buf.cap;
                        }
                        Err(e) => carried = Some((Latch::Failed(e), Interrupt::Shutdown)),
                    }
                }
            }
        }
    }

    /// Decode and publish until a terminal state or an interrupt.
    fn fill_round(&mut self) -> RoundEnd {
        loop {
            let mut attempt = self.read_stop - self.read_head;
            if attempt == 0 {
                let memmove_required = self.read_stop == self.buf.cap;
                if self.cur_block_start == 0 && memmove_required {
                    // The whole buffer is one unfinished line.
                    if self.fixed || self.max_line_len == 0 || self.buf.cap >= self.max_line_len {
                        return RoundEnd::Latch(
                            Latch::Failed(TextError::long_line()),
                            Interrupt::Shutdown,
                        );
                    }
                    if let Err(e) = self.grow() {
                        return RoundEnd::Latch(Latch::Failed(e), Interrupt::Shutdown);
                    }
                    continue;
                }
                match self.wait_for_space(memmove_required) {
                    Some(p) => return RoundEnd::Interrupted(p),
                    None => {}
                }
                if memmove_required {
                    // Everything published has been consumed; slide the
                    // unfinished carry back to the front.
                    let len = self.buf.cap - self.cur_block_start;
                    unsafe {
                        ptr::copy(self.buf.ptr.add(self.cur_block_start), self.buf.ptr, len);
                    }
                    self.cur_block_start = 0;
                    self.read_head = len;
                } else {
                    self.read_stop = self.buf.cap;
                }
                continue;
            }
            if attempt > CHUNK_SIZE {
                attempt = CHUNK_SIZE;
            }
            let out =
                unsafe { slice::from_raw_parts_mut(self.buf.ptr.add(self.read_head), attempt) };
            let (written, status) = match self.decoder.fill(out) {
                Ok(r) => r,
                Err(e) => return RoundEnd::Latch(Latch::Failed(e), Interrupt::Shutdown),
            };
            let cur_read_end = self.read_head + written;
            if status == FillStatus::Eof {
                let mut final_end = cur_read_end;
                if self.cur_block_start != final_end
                    && unsafe { *self.buf.ptr.add(final_end - 1) } != b'\n'
                {
                    unsafe { *self.buf.ptr.add(final_end) = b'\n' };
                    final_end += 1;
                }
                if self.region_too_long(final_end) {
                    return RoundEnd::Latch(
                        Latch::Failed(TextError::long_line()),
                        Interrupt::Shutdown,
                    );
                }
                self.read_head = final_end;
                return RoundEnd::Latch(Latch::Eof, Interrupt::Retarget);
            }
            let fresh =
                unsafe { slice::from_raw_parts(self.buf.ptr.add(self.read_head), written) };
            let found = if self.max_line_len != 0 {
                last_newline(fresh)
            } else {
                last_space_or_eol(fresh)
            };
            if let Some(p) = found {
                let next_avail = self.read_head + p + 1;
                if self.region_too_long(next_avail) {
                    return RoundEnd::Latch(
                        Latch::Failed(TextError::long_line()),
                        Interrupt::Shutdown,
                    );
                }
                let shared = Arc::clone(&self.shared);
                let mut g = shared.lock();
                if let Some(pending) = take_interrupt(&mut g) {
                    return RoundEnd::Interrupted(pending);
                }
                let tail = g.consume_tail;
                let all_later_consumed = tail <= self.cur_block_start;
                let return_to_start = all_later_consumed && tail >= CHUNK_SIZE;
                if return_to_start {
                    g.cur_circular_end = Some(next_avail);
                    g.available_end = 0;
                } else {
                    g.available_end = next_avail;
                }
                // Clearing consumer progress must share this critical
                // section with the publication; otherwise a stale wakeup can
                // release read_stop before the bytes in front are consumed.
                g.consumer_progress = false;
                shared.producer_cv.notify_one();
                drop(g);
                if return_to_start {
                    let trailing = cur_read_end - next_avail;
                    // trailing < CHUNK_SIZE <= tail, so source and
                    // destination cannot overlap.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            self.buf.ptr.add(next_avail),
                            self.buf.ptr,
                            trailing,
                        );
                    }
                    self.cur_block_start = 0;
                    self.read_head = trailing;
                    self.read_stop = tail & !(CACHELINE - 1);
                    continue;
                }
                self.read_stop = if all_later_consumed {
                    self.buf.cap
                } else {
                    tail & !(CACHELINE - 1)
                };
                self.cur_block_start = next_avail;
            }
            self.read_head = cur_read_end;
        }
    }

    /// Long-line guard over `[cur_block_start, region_end)`.
    fn region_too_long(&self, region_end: usize) -> bool {
        let region = unsafe {
            slice::from_raw_parts(
                self.buf.ptr.add(self.cur_block_start),
                region_end - self.cur_block_start,
            )
        };
        is_pathologically_long(
            region,
            self.read_head - self.cur_block_start,
            self.max_line_len,
        )
    }

    /// Block until the consumer frees the space the producer needs next:
    /// with `memmove_required`, until every published byte is consumed (and
    /// the published cursors return to the front); otherwise until all bytes
    /// in front of `read_stop` are consumed.
    fn wait_for_space(&mut self, memmove_required: bool) -> Option<Pending> {
        let shared = Arc::clone(&self.shared);
        let mut g = shared.lock();
        // When no memmove is needed, a previous publication already proved
        // the consumer was behind us, so wait for fresh progress first.
        let mut check = memmove_required;
        loop {
            if check {
                if let Some(p) = take_interrupt(&mut g) {
                    return Some(p);
                }
                let tail = g.consume_tail;
                if memmove_required {
                    if tail == self.cur_block_start {
                        g.consume_tail = 0;
                        g.available_end = 0;
                        break;
                    }
                } else if tail <= self.cur_block_start {
                    break;
                }
            }
            check = true;
            while !g.consumer_progress {
                g = shared.consumer_cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            g.consumer_progress = false;
        }
        None
    }

    /// Publish a terminal state, then wait for an interrupt at least as
    /// strong as `min`: Shutdown for errors, Retarget-or-Shutdown for EOF.
    fn publish_and_wait(&mut self, latch: Latch, min: Interrupt) -> Pending {
        let shared = Arc::clone(&self.shared);
        let mut g = shared.lock();
        let eof = matches!(latch, Latch::Eof);
        g.latch = latch;
        if g.interrupt >= min {
            if let Some(p) = take_interrupt(&mut g) {
                return p;
            }
        }
        if eof {
            g.available_end = self.read_head;
        }
        shared.producer_cv.notify_one();
        loop {
            while !g.consumer_progress {
                g = shared.consumer_cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            g.consumer_progress = false;
            if g.interrupt >= min {
                if let Some(p) = take_interrupt(&mut g) {
                    return p;
                }
            }
        }
    }

    /// Grow the buffer; only legal when nothing is published (the whole
    /// buffer is one unfinished line).
    fn grow(&mut self) -> Result<()> {
        let prev = self.buf;
        let mut next_cap = self.max_line_len + CHUNK_SIZE;
        if next_cap / 2 > prev.cap {
            next_cap = prev.cap * 2;
        }
        #[cfg(target_pointer_width = "32")]
        if next_cap >= 0x8000_0000 {
            return Err(TextError::Nomem(
                "line buffer would exceed the address space".to_string(),
            ));
        }
        let next = BufHandle::alloc(next_cap);
        unsafe { ptr::copy_nonoverlapping(prev.ptr, next.ptr, prev.cap) };
        let shared = Arc::clone(&self.shared);
        {
            let mut g = shared.lock();
            g.buf = next;
            g.consume_tail = 0;
            g.available_end = 0;
            g.dst_reallocated = true;
        }
        unsafe { prev.free() };
        self.buf = next;
        self.cur_block_start = 0;
        self.read_head = prev.cap;
        self.read_stop = next_cap;
        Ok(())
    }

    /// Rewind in place (`None`) or switch to a new file, reusing the decoder
    /// when the codec matches and rebuilding it when it does not.
    fn apply_retarget(&mut self, new_path: Option<&Path>) -> Result<()> {
        let Some(path) = new_path else {
            return self.decoder.rewind();
        };
        let mut next_file = File::open(path).map_err(|e| TextError::Open {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        let mut probe = [0u8; 16];
        let mut nbytes = 0;
        while nbytes < 16 {
            match read_retry(&mut next_file, &mut probe[nbytes..]) {
                Ok(0) => break,
                Ok(n) => nbytes += n,
                Err(e) => return Err(TextError::read_err(&e)),
            }
        }
        let next_kind = sniff(&probe[..nbytes]);
        if next_kind == FileKind::Uncompressed {
            unsafe {
                ptr::copy_nonoverlapping(probe.as_ptr(), self.buf.ptr, nbytes);
            }
            self.read_head = nbytes;
        }
        if next_kind == self.decoder.kind() {
            self.decoder.reseed(next_file, &probe[..nbytes])?;
        } else {
            log::debug!(
                "retarget changes codec {:?} -> {:?}; rebuilding decoder",
                self.decoder.kind(),
                next_kind
            );
            self.decoder = Decoder::new_stream(next_kind, next_file, &probe[..nbytes], self.threads)?;
        }
        self.shared.lock().kind = next_kind;
        Ok(())
    }
}

/// Asynchronous line reader: one producer thread fills a shared buffer while
/// the consumer walks published windows of complete lines.
///
/// The consumer surface matches [`TextReader`], plus [`Self::retarget`] for
/// switching to another file without tearing down the thread and buffer.
///
/// # Example
///
/// ```no_run
/// use lineflow::TextStream;
///
/// # fn main() -> lineflow::Result<()> {
/// let mut stream = TextStream::open("cohort.pvar.zst")?;
/// while let Some(line) = stream.next_line()? {
///     // decompression of the next window proceeds concurrently
/// }
/// # Ok(())
/// # }
/// ```
pub struct TextStream {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    buf: BufHandle,
    consume_iter: usize,
    consume_stop: usize,
    latch: Latch,
    threads: usize,
    line_idx: u64,
}

impl TextStream {
    /// Open with default options and start the producer thread.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReaderOptions::default())
    }

    /// Open with explicit options. `max_line_len == 0` selects token mode:
    /// published windows end at the last whitespace byte instead of the last
    /// newline, and the buffer must be fixed-size.
    pub fn open_with<P: AsRef<Path>>(path: P, opts: &ReaderOptions) -> Result<Self> {
        let opened = open_file(path.as_ref(), opts, true)?;
        let threads = resolve_threads(opts.decompress_threads);
        Self::launch(
            opened.kind,
            BufHandle::from_boxed(opened.dst),
            opened.dst_len,
            0,
            opened.decoder,
            opts.max_line_len,
            opts.fixed_buffer,
            threads,
        )
    }

    /// Take over a just-opened sync reader, keeping its buffer, decoder
    /// state, and any bytes it has not yet handed out. A BGZF reader's
    /// decoder is upgraded to the multi-threaded stream, seeded with the
    /// sync decoder's unconsumed input.
    pub fn from_reader(reader: TextReader, decompress_threads: usize) -> Result<Self> {
        if matches!(reader.latch, Latch::Failed(_)) {
            return Err(TextError::Usage(
                "cannot start a stream from an error-state reader",
            ));
        }
        let TextReader {
            decoder,
            mut dst,
            mut dst_len,
            consume_iter,
            mut consume_stop,
            max_line_len,
            fixed,
            ..
        } = reader;
        let kind = decoder.kind();
        // Compact unconsumed bytes to the front so the producer starts from
        // a clean prefix.
        if consume_iter > 0 {
            dst.copy_within(consume_iter..dst_len, 0);
            dst_len -= consume_iter;
            consume_stop -= consume_iter;
        }
        let threads = resolve_threads(decompress_threads);
        let decoder = match decoder {
            Decoder::Bgzf(b) => Decoder::BgzfMt(BgzfMtStream::from_sync(b, threads)?),
            d => d,
        };
        Self::launch(
            kind,
            BufHandle::from_boxed(dst),
            dst_len,
            consume_stop,
            decoder,
            max_line_len,
            fixed,
            threads,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn launch(
        kind: FileKind,
        buf: BufHandle,
        dst_len: usize,
        consume_stop: usize,
        decoder: Decoder,
        max_line_len: usize,
        fixed: bool,
        threads: usize,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            m: Mutex::new(SyncState {
                buf,
                consume_tail: 0,
                available_end: consume_stop,
                cur_circular_end: None,
                dst_reallocated: false,
                consumer_progress: false,
                interrupt: Interrupt::None,
                new_fname: None,
                latch: Latch::Active,
                kind,
            }),
            producer_cv: Condvar::new(),
            consumer_cv: Condvar::new(),
        });
        let producer = Producer {
            shared: Arc::clone(&shared),
            decoder,
            buf,
            cur_block_start: consume_stop,
            read_head: dst_len,
            read_stop: buf.cap,
            max_line_len,
            fixed,
            threads,
        };
        log::debug!(
            "starting read thread ({kind:?}, {threads} decompress workers available)"
        );
        let handle = thread::Builder::new()
            .name("lineflow-read".to_string())
            .spawn(move || producer.run())
            .map_err(|_| TextError::ThreadCreate)?;
        Ok(TextStream {
            shared,
            handle: Some(handle),
            buf,
            consume_iter: 0,
            consume_stop,
            latch: Latch::Active,
            threads,
            line_idx: 0,
        })
    }

    /// Wait for the next window of published bytes.
    ///
    /// Returns `Ok(false)` at end of input. A latched producer error is
    /// returned on this and every later call.
    pub fn advance(&mut self) -> Result<bool> {
        match &self.latch {
            Latch::Failed(e) => return Err(e.clone()),
            Latch::Eof => return Ok(false),
            Latch::Active => {}
        }
        let shared = Arc::clone(&self.shared);
        let mut g = shared.lock();
        loop {
            if let Latch::Failed(e) = &g.latch {
                let e = e.clone();
                self.latch = Latch::Failed(e.clone());
                return Err(e);
            }
            let available_end = g.available_end;
            if g.cur_circular_end == Some(self.consume_iter) {
                // Wrap to the front of the buffer. The producer may be
                // waiting on "all bytes in front consumed"; let it know.
                self.consume_iter = 0;
                g.cur_circular_end = None;
                if self.consume_iter != available_end {
                    g.consumer_progress = true;
                    shared.consumer_cv.notify_one();
                }
            }
            if g.dst_reallocated {
                self.buf = g.buf;
                self.consume_iter = 0;
                g.dst_reallocated = false;
            }
            g.consume_tail = self.consume_iter;
            if self.consume_iter != available_end || g.cur_circular_end.is_some() {
                self.consume_stop = g.cur_circular_end.unwrap_or(available_end);
                return Ok(true);
            }
            if matches!(g.latch, Latch::Eof) {
                self.latch = Latch::Eof;
                return Ok(false);
            }
            g.consumer_progress = true;
            shared.consumer_cv.notify_one();
            g = shared.producer_cv.wait(g).unwrap_or_else(|e| e.into_inner());
            self.consume_iter = g.consume_tail;
        }
    }

    /// The current window of published bytes, `[consume_iter, consume_stop)`.
    ///
    /// In line mode the byte before the window's end is always `\n`; in
    /// token mode it is whitespace.
    pub fn block(&self) -> &[u8] {
        let len = self.consume_stop - self.consume_iter;
        if len == 0 {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.buf.ptr.add(self.consume_iter), len) }
    }

    /// Mark `nbytes` of the current window as consumed.
    pub fn consume(&mut self, nbytes: usize) {
        self.consume_iter = (self.consume_iter + nbytes).min(self.consume_stop);
    }

    /// Next line, including its terminating `\n`. `Ok(None)` at end of input.
    pub fn next_line(&mut self) -> Result<Option<&[u8]>> {
        if self.consume_iter == self.consume_stop && !self.advance()? {
            return Ok(None);
        }
        let start = self.consume_iter;
        let len = {
            let block = self.block();
            match memchr(b'\n', block) {
                Some(p) => p + 1,
                None => block.len(),
            }
        };
        self.consume_iter = start + len;
        self.line_idx += 1;
        Ok(Some(unsafe {
            slice::from_raw_parts(self.buf.ptr.add(start), len)
        }))
    }

    /// Skip `n` lines. Returns `Ok(false)` if end of input arrives first.
    pub fn skip_lines(&mut self, mut n: u64) -> Result<bool> {
        while n > 0 {
            if self.consume_iter == self.consume_stop && !self.advance()? {
                return Ok(false);
            }
            let (seen, consumed) = {
                let block = self.block();
                let mut seen = 0u64;
                let mut past_last = block.len();
                for pos in memchr::memchr_iter(b'\n', block) {
                    seen += 1;
                    if seen == n {
                        past_last = pos + 1;
                        break;
                    }
                }
                (seen, past_last)
            };
            self.consume_iter += consumed;
            self.line_idx += seen;
            n -= seen;
        }
        Ok(true)
    }

    /// Next line that is neither empty nor all-whitespace, with leading
    /// spaces and tabs stripped. [`Self::line_idx`] reports its 1-based
    /// position afterwards.
    pub fn next_nonempty_line(&mut self) -> Result<Option<&[u8]>> {
        loop {
            if self.consume_iter == self.consume_stop && !self.advance()? {
                return Ok(None);
            }
            let start = self.consume_iter;
            let (stripped, line_len, first) = {
                let block = self.block();
                let line_len = match memchr(b'\n', block) {
                    Some(p) => p + 1,
                    None => block.len(),
                };
                let stripped = block[..line_len]
                    .iter()
                    .position(|&b| b != b' ' && b != b'\t')
                    .unwrap_or(line_len - 1);
                (stripped, line_len, block[stripped])
            };
            self.consume_iter = start + line_len;
            self.line_idx += 1;
            if first != b'\n' && first != b'\r' {
                return Ok(Some(unsafe {
                    slice::from_raw_parts(self.buf.ptr.add(start + stripped), line_len - stripped)
                }));
            }
        }
    }

    /// 1-based count of lines consumed so far (reset by rewind/retarget).
    pub fn line_idx(&self) -> u64 {
        self.line_idx
    }

    /// Number of dedicated decompression workers: 0 for plain input, 1 for
    /// gzip/zstd, the worker-pool size for BGZF.
    pub fn decompress_thread_ct(&self) -> usize {
        match self.shared.lock().kind {
            FileKind::Uncompressed => 0,
            FileKind::Gzip | FileKind::Zstd => 1,
            FileKind::Bgzf => self.threads,
        }
    }

    /// Restart the current file from the beginning.
    pub fn rewind(&mut self) -> Result<()> {
        self.retarget_inner(None)
    }

    /// Switch to another input file without tearing down the producer
    /// thread, buffer, or (for BGZF) the worker pool.
    ///
    /// Clears a latched end-of-file; a latched hard error is returned
    /// unchanged.
    pub fn retarget<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.retarget_inner(Some(path.as_ref().to_path_buf()))
    }

    fn retarget_inner(&mut self, path: Option<PathBuf>) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        {
            let mut g = shared.lock();
            match &g.latch {
                Latch::Failed(e) => {
                    let e = e.clone();
                    self.latch = Latch::Failed(e.clone());
                    return Err(e);
                }
                Latch::Eof => g.latch = Latch::Active,
                Latch::Active => {}
            }
            // The producer only reacts once signaled, but the published
            // cursors must reset now, before the consumer touches them.
            g.consume_tail = 0;
            g.cur_circular_end = None;
            g.available_end = 0;
            g.dst_reallocated = false;
            g.interrupt = Interrupt::Retarget;
            g.new_fname = path;
            g.consumer_progress = true;
            self.buf = g.buf;
            shared.consumer_cv.notify_one();
        }
        self.consume_iter = 0;
        self.consume_stop = 0;
        self.latch = Latch::Active;
        self.line_idx = 0;
        Ok(())
    }

    /// Latched error, if any.
    pub fn last_error(&self) -> Option<&TextError> {
        match &self.latch {
            Latch::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether end of input has been reached.
    pub fn is_eof(&self) -> bool {
        matches!(self.latch, Latch::Eof)
    }

    /// Shut the producer down, join it, and release the buffer and file.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut g = self.shared.lock();
            g.interrupt = Interrupt::Shutdown;
            g.consumer_progress = true;
            self.shared.consumer_cv.notify_one();
        }
        if handle.join().is_err() {
            log::warn!("lineflow read thread panicked during shutdown");
        }
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
