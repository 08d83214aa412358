//! LS-data retrieve list (pull directories, C5 continued): a grown-in-steps
//! buffer remembering what the remote side listed last time, so repeated
//! pulls don't re-fetch unchanged files. Grounded on
//! `transfer/workers/pipeline.rs::adapt_buf_size`'s clamp-and-grow idiom,
//! generalized from a byte buffer to an entry vector growing in
//! `RETRIEVE_LIST_STEP_SIZE` chunks.

pub const RETRIEVE_LIST_STEP_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ListedFile {
    pub file_name: String,
    pub file_mtime: u64,
    pub got_date: u64,
    pub size: u64,
    pub retrieved: bool,
    pub in_list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StupidMode {
    GetOnceOnly,
    GetOnceNewOnly,
    Append,
}

/// Outcome of [`RetrieveList::check`], mirroring `check_list`'s four return
/// shapes: already-retrieved skip (`-1`), unchanged skip (`-2`), a changed
/// existing entry's index, or a freshly appended entry's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    SkipAlreadyRetrieved,
    SkipUnchanged,
    Existing(usize),
    Appended(usize),
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveList {
    entries: Vec<ListedFile>,
    capacity_steps: usize,
}

impl RetrieveList {
    pub fn new() -> Self {
        RetrieveList { entries: Vec::new(), capacity_steps: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ListedFile] {
        &self.entries
    }

    fn ensure_capacity(&mut self) {
        let needed_steps = self.entries.len() / RETRIEVE_LIST_STEP_SIZE + 1;
        if needed_steps > self.capacity_steps {
            self.capacity_steps = needed_steps;
            self.entries.reserve(RETRIEVE_LIST_STEP_SIZE);
        }
    }

    /// `check_list(p_de, name, stat)`: look up `name`; decide whether the
    /// caller should fetch it, and update bookkeeping accordingly.
    pub fn check(&mut self, name: &str, mtime: u64, size: u64, got_date: u64, stupid_mode: StupidMode) -> CheckOutcome {
        if let Some(pos) = self.entries.iter().position(|e| e.file_name == name) {
            let unchanged = self.entries[pos].file_mtime == mtime && self.entries[pos].size == size;
            if unchanged {
                if self.entries[pos].retrieved && stupid_mode == StupidMode::GetOnceOnly {
                    self.entries[pos].in_list = true;
                    return CheckOutcome::SkipAlreadyRetrieved;
                }
                if self.entries[pos].retrieved {
                    self.entries[pos].in_list = true;
                    return CheckOutcome::SkipUnchanged;
                }
            }
            self.entries[pos].file_mtime = mtime;
            self.entries[pos].size = size;
            self.entries[pos].got_date = got_date;
            self.entries[pos].retrieved = false;
            self.entries[pos].in_list = true;
            return CheckOutcome::Existing(pos);
        }

        self.ensure_capacity();
        self.entries.push(ListedFile {
            file_name: name.to_string(),
            file_mtime: mtime,
            got_date,
            size,
            retrieved: false,
            in_list: true,
        });
        CheckOutcome::Appended(self.entries.len() - 1)
    }

    pub fn mark_retrieved(&mut self, index: usize) {
        if let Some(e) = self.entries.get_mut(index) {
            e.retrieved = true;
        }
    }

    /// Called once per scan before `check` walks the fresh listing, so
    /// entries absent from this round are detectable afterwards.
    pub fn clear_in_list_flags(&mut self) {
        for e in self.entries.iter_mut() {
            e.in_list = false;
        }
    }

    /// `rm_removed_files(p_de)`: drop entries the last scan didn't see
    /// again, then shrink bookkeeping to a step boundary. Idempotent per
    /// Testable Property 6 — repeated calls with nothing removed are a
    /// no-op on both contents and capacity accounting.
    pub fn rm_removed_files(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.in_list);
        let removed = before - self.entries.len();
        self.capacity_steps = self.entries.len() / RETRIEVE_LIST_STEP_SIZE + 1;
        removed
    }
}
