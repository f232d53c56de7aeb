//! Forward-reference label resolution over the emitted byte stream.

use std::collections::HashMap;

use swm_asm::{Value, Width};
use tracing::debug;

use crate::CompileError;

#[derive(Debug, Clone, Copy)]
struct PatchSite {
    at: usize,
    width: Width,
}

/// Maps label names to byte offsets, patching jump target windows as soon as
/// both sides of the reference are known.
///
/// A target requested before its label is defined is queued; defining the
/// label drains the queue. Whatever is still queued when assembly finishes
/// is a compile error.
#[derive(Debug, Default)]
pub struct LabelMap {
    counter: usize,
    defined: HashMap<String, usize>,
    pending: HashMap<String, Vec<PatchSite>>,
}

impl LabelMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a label name that no other call has returned.
    pub fn unique(&mut self, base: &str) -> String {
        let label = format!("{base}{}", self.counter);
        self.counter += 1;
        label
    }

    /// Record that `label` sits at `offset`, patching queued references.
    pub fn define(
        &mut self,
        label: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), CompileError> {
        if self.defined.contains_key(label) {
            return Err(CompileError::DuplicateLabel(label.to_string()));
        }
        self.defined.insert(label.to_string(), offset);
        debug!(label, offset, "label defined");

        for site in self.pending.remove(label).unwrap_or_default() {
            patch(buf, site, offset);
        }
        Ok(())
    }

    /// Point the `width`-byte window at `at` to `label`.
    ///
    /// Patches immediately when the label is already defined, otherwise
    /// queues the site.
    pub fn request(&mut self, label: &str, at: usize, width: Width, buf: &mut [u8]) {
        let site = PatchSite { at, width };
        match self.defined.get(label) {
            Some(&offset) => patch(buf, site, offset),
            None => self
                .pending
                .entry(label.to_string())
                .or_default()
                .push(site),
        }
    }

    /// A label with queued, unpatched references, if any remain.
    pub fn first_pending(&self) -> Option<&str> {
        self.pending.keys().next().map(String::as_str)
    }
}

fn patch(buf: &mut [u8], site: PatchSite, offset: usize) {
    let window = &mut buf[site.at..site.at + site.width.bytes()];
    Value::new(offset as i64, site.width).copy_be(window);
}
