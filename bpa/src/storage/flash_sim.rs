use super::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub const PAGE_SIZE: usize = 512;
pub const SPARE_SIZE: usize = 16;

const BAD_BLOCK_MARK: u8 = 0xA5;
const ERASED: u8 = 0xFF;

/// Serialized image header: exprtime, cteboffset, cid index, cid width,
/// byte length, record flag.
const IMAGE_HEADER: usize = 41;

/// An in-memory NAND flash device.
///
/// Pages erase to 0xFF and programming can only clear bits (bitwise AND
/// with the existing contents), so rewriting a page without an erase
/// corrupts it exactly the way real NAND does.  Erase works on whole
/// blocks.  A bad block is marked with 0xA5 in the first byte of its
/// first page's spare area; erased good blocks carry 0xFF there.
pub struct FlashSim {
    blocks: Vec<FlashBlock>,
    pages_per_block: usize,
}

struct FlashBlock {
    pages: Vec<Page>,
}

#[derive(Clone)]
struct Page {
    data: [u8; PAGE_SIZE],
    spare: [u8; SPARE_SIZE],
}

impl FlashSim {
    pub fn new(num_blocks: usize, pages_per_block: usize) -> Self {
        let page = Page {
            data: [ERASED; PAGE_SIZE],
            spare: [ERASED; SPARE_SIZE],
        };
        Self {
            blocks: (0..num_blocks)
                .map(|_| FlashBlock {
                    pages: vec![page.clone(); pages_per_block],
                })
                .collect(),
            pages_per_block,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn pages_per_block(&self) -> usize {
        self.pages_per_block
    }

    pub fn page_read(&self, block: usize, page: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.blocks[block].pages[page].data[..out.len()]);
    }

    /// NAND program semantics: bits can only be cleared.
    pub fn page_write(&mut self, block: usize, page: usize, data: &[u8]) {
        for (cell, byte) in self.blocks[block].pages[page].data.iter_mut().zip(data) {
            *cell &= byte;
        }
    }

    pub fn block_erase(&mut self, block: usize) {
        for page in &mut self.blocks[block].pages {
            page.data.fill(ERASED);
            page.spare.fill(ERASED);
        }
    }

    pub fn block_is_bad(&self, block: usize) -> bool {
        self.blocks[block].pages[0].spare[0] == BAD_BLOCK_MARK
    }

    pub fn block_mark_bad(&mut self, block: usize) {
        self.blocks[block].pages[0].spare[0] = BAD_BLOCK_MARK;
    }
}

fn encode(image: &BundleImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(IMAGE_HEADER + image.bytes.len());
    out.extend_from_slice(&image.exprtime.to_be_bytes());
    out.extend_from_slice(&(image.cteboffset as u64).to_be_bytes());
    out.extend_from_slice(&(image.cidfield.index as u64).to_be_bytes());
    out.extend_from_slice(&(image.cidfield.width as u64).to_be_bytes());
    out.extend_from_slice(&(image.bytes.len() as u64).to_be_bytes());
    out.push(u8::from(image.is_record));
    out.extend_from_slice(&image.bytes);
    out
}

fn decode(raw: &[u8]) -> Result<BundleImage, Error> {
    if raw.len() < IMAGE_HEADER {
        return Err(Error::Device("truncated bundle image"));
    }
    let word = |at: usize| u64::from_be_bytes(raw[at..at + 8].try_into().unwrap());
    let len = word(32) as usize;
    if raw.len() < IMAGE_HEADER + len {
        return Err(Error::Device("truncated bundle image"));
    }
    Ok(BundleImage {
        exprtime: word(0),
        cteboffset: word(8) as usize,
        cidfield: sdnv::Field::new(word(16) as usize, word(24) as usize),
        is_record: raw[40] != 0,
        bytes: raw[IMAGE_HEADER..IMAGE_HEADER + len].to_vec(),
    })
}

#[derive(Debug, Copy, Clone)]
struct Slot {
    block: usize,
    page: usize,
    pages: usize,
}

#[derive(Debug, Default, Copy, Clone)]
struct BlockState {
    live: usize,
    next_page: usize,
}

/// A bundle store over the NAND simulator: bundles occupy runs of whole
/// pages within a single block, blocks erase once every bundle in them
/// has been relinquished, and bad blocks are skipped.
pub struct FlashStore {
    inner: Mutex<FlashInner>,
}

struct FlashInner {
    device: FlashSim,
    state: Vec<BlockState>,
    write_block: usize,
    directory: HashMap<Sid, Slot>,
    queue: VecDeque<Sid>,
    next_sid: Sid,
}

impl FlashStore {
    pub fn new(device: FlashSim) -> Self {
        let blocks = device.num_blocks();
        Self {
            inner: Mutex::new(FlashInner {
                device,
                state: vec![BlockState::default(); blocks],
                write_block: 0,
                directory: HashMap::new(),
                queue: VecDeque::new(),
                next_sid: 1,
            }),
        }
    }
}

impl FlashInner {
    /// A block with `pages` free pages, reclaiming fully dead blocks.
    fn place(&mut self, pages: usize) -> Result<usize, Error> {
        let blocks = self.device.num_blocks();
        for offset in 0..blocks {
            let block = (self.write_block + offset) % blocks;
            if self.device.block_is_bad(block) {
                continue;
            }
            let state = self.state[block];
            if state.next_page + pages <= self.device.pages_per_block() {
                return Ok(block);
            }
            // written out but nothing alive: erase and reuse
            if state.live == 0 && state.next_page > 0 {
                self.device.block_erase(block);
                self.state[block] = BlockState::default();
                return Ok(block);
            }
        }
        Err(Error::Full)
    }
}

impl BundleStore for FlashStore {
    fn enqueue(&self, image: BundleImage, _timeout: Timeout) -> Result<Sid, Error> {
        let raw = encode(&image);
        let pages = raw.len().div_ceil(PAGE_SIZE);

        let mut inner = self.inner.lock();
        if pages > inner.device.pages_per_block() {
            return Err(Error::Device("bundle too large for one flash block"));
        }
        let block = inner.place(pages)?;
        inner.write_block = block;
        let page = inner.state[block].next_page;

        for (n, chunk) in raw.chunks(PAGE_SIZE).enumerate() {
            inner.device.page_write(block, page + n, chunk);
        }
        inner.state[block].next_page += pages;
        inner.state[block].live += 1;

        let sid = inner.next_sid;
        inner.next_sid += 1;
        inner.directory.insert(sid, Slot { block, page, pages });
        inner.queue.push_back(sid);
        Ok(sid)
    }

    fn dequeue(&self, _timeout: Timeout) -> Result<(Sid, BundleImage), Error> {
        let mut inner = self.inner.lock();
        let sid = inner.queue.pop_front().ok_or(Error::Timeout)?;
        drop(inner);
        Ok((sid, self.retrieve(sid)?))
    }

    fn retrieve(&self, sid: Sid) -> Result<BundleImage, Error> {
        let inner = self.inner.lock();
        let slot = *inner.directory.get(&sid).ok_or(Error::NotFound(sid))?;
        let mut raw = vec![0u8; slot.pages * PAGE_SIZE];
        for (n, chunk) in raw.chunks_mut(PAGE_SIZE).enumerate() {
            inner.device.page_read(slot.block, slot.page + n, chunk);
        }
        decode(&raw)
    }

    fn release(&self, _sid: Sid) -> Result<(), Error> {
        Ok(())
    }

    fn relinquish(&self, sid: Sid) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let slot = inner.directory.remove(&sid).ok_or(Error::NotFound(sid))?;
        inner.queue.retain(|queued| *queued != sid);
        inner.state[slot.block].live -= 1;

        // reclaim eagerly once nothing in the block is alive
        if inner.state[slot.block].live == 0 && slot.block != inner.write_block {
            inner.device.block_erase(slot.block);
            inner.state[slot.block] = BlockState::default();
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.lock().directory.len()
    }
}
