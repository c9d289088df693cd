//! Tagged references from a record to other records' keys.
//!
//! Links live in the record's envelope, so they survive a save/load round
//! trip without a second read. A link always names a key; a target that has
//! no key yet cannot be linked.

use sibyl_store::Link;

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::schema::LinkDescriptor;

impl Record {
    /// A link pointing at this record under `tag`, carrying its bucket.
    /// `None` until the record has a key.
    pub fn to_link(&self, tag: &str) -> Option<Link> {
        self.key().map(|key| Link::new(tag, key).in_bucket(self.bucket()))
    }

    /// Every link on the record, in insertion order.
    pub fn all_links(&self) -> &[Link] {
        &self.links
    }

    // ── Single-valued tags ──────────────────────────────────────────

    /// Key linked under a single-valued tag.
    pub fn link(&self, tag: &str) -> ModelResult<Option<&str>> {
        self.link_descriptor(tag, false)?;
        Ok(self
            .links
            .iter()
            .find(|l| l.tag == tag)
            .map(|l| l.key.as_str()))
    }

    /// Points a single-valued tag at `target`. `None`, or a target without a
    /// key, clears the tag.
    pub fn set_link(&mut self, tag: &str, target: Option<&Record>) -> ModelResult<()> {
        self.link_descriptor(tag, false)?;
        self.links.retain(|l| l.tag != tag);
        if let Some(link) = target.and_then(|t| t.to_link(tag)) {
            self.links.push(link);
        }
        Ok(())
    }

    /// Points a single-valued tag at a raw key.
    pub fn set_link_key(&mut self, tag: &str, key: Option<&str>) -> ModelResult<()> {
        self.link_descriptor(tag, false)?;
        self.links.retain(|l| l.tag != tag);
        if let Some(key) = key {
            self.links.push(Link::new(tag, key));
        }
        Ok(())
    }

    // ── Multi-valued tags ───────────────────────────────────────────

    /// Keys linked under a multi-valued tag, in insertion order.
    pub fn linked_keys(&self, tag: &str) -> ModelResult<Vec<&str>> {
        self.link_descriptor(tag, true)?;
        Ok(self
            .links
            .iter()
            .filter(|l| l.tag == tag)
            .map(|l| l.key.as_str())
            .collect())
    }

    /// Adds `target` under a multi-valued tag. Returns false if it was
    /// already linked or has no key.
    pub fn add_link(&mut self, tag: &str, target: &Record) -> ModelResult<bool> {
        self.link_descriptor(tag, true)?;
        let Some(link) = target.to_link(tag) else {
            return Ok(false);
        };
        Ok(self.push_unique(link))
    }

    /// Adds a raw key under a multi-valued tag.
    pub fn add_link_key(&mut self, tag: &str, key: &str) -> ModelResult<bool> {
        self.link_descriptor(tag, true)?;
        Ok(self.push_unique(Link::new(tag, key)))
    }

    /// Removes `target` from a multi-valued tag. Returns true if it was
    /// linked.
    pub fn remove_link(&mut self, tag: &str, target: &Record) -> ModelResult<bool> {
        match target.key() {
            Some(key) => self.remove_link_key(tag, key),
            None => {
                self.link_descriptor(tag, true)?;
                Ok(false)
            }
        }
    }

    pub fn remove_link_key(&mut self, tag: &str, key: &str) -> ModelResult<bool> {
        self.link_descriptor(tag, true)?;
        let before = self.links.len();
        self.links.retain(|l| !(l.tag == tag && l.key == key));
        Ok(self.links.len() != before)
    }

    /// Removes every link under `tag`, whatever its arity.
    pub fn clear_links(&mut self, tag: &str) -> ModelResult<()> {
        self.declared_link(tag)?;
        self.links.retain(|l| l.tag != tag);
        Ok(())
    }

    pub fn link_count(&self, tag: &str) -> ModelResult<usize> {
        self.link_descriptor(tag, true)?;
        Ok(self.links.iter().filter(|l| l.tag == tag).count())
    }

    fn push_unique(&mut self, link: Link) -> bool {
        if self.links.iter().any(|l| l.tag == link.tag && l.key == link.key) {
            return false;
        }
        self.links.push(link);
        true
    }

    pub(crate) fn declared_link(&self, tag: &str) -> ModelResult<&LinkDescriptor> {
        self.schema().link(tag).ok_or_else(|| ModelError::UnknownLink {
            kind: self.kind().to_string(),
            tag: tag.to_string(),
        })
    }

    fn link_descriptor(&self, tag: &str, multi: bool) -> ModelResult<&LinkDescriptor> {
        let descriptor = self.declared_link(tag)?;
        if descriptor.multi != multi {
            return Err(ModelError::LinkArity {
                tag: tag.to_string(),
                declared: descriptor.arity(),
            });
        }
        Ok(descriptor)
    }
}
