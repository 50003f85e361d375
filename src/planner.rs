//! Groups a PLC's declared tags into batch or single reads, preserving order.

use crate::config::{DataType, MemoryArea, TagMapping};

/// One planned read: a batch of ≥2 contiguous same-type mappings, or a
/// single mapping read on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadGroup {
    Batch(Vec<TagMapping>),
    Single(TagMapping),
}

fn contiguous(prev: &TagMapping, next: &TagMapping) -> bool {
    prev.memory_area == next.memory_area
        && prev.data_type_matches(&next.data_type)
        && next.address == prev.address + prev.data_type.word_width()
}

impl TagMapping {
    fn data_type_matches(&self, other: &DataType) -> bool {
        std::mem::discriminant(&self.data_type) == std::mem::discriminant(other)
            && self.data_type.word_width() == other.word_width()
    }
}

/// Build read groups from a tag list in declared order. Pure and
/// deterministic: the same input always yields the same output, and the
/// emission order (of groups, and of mappings within each group) equals
/// the input order.
#[must_use]
pub fn plan(tags: &[TagMapping]) -> Vec<ReadGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<TagMapping> = Vec::new();

    for tag in tags {
        match current.last() {
            Some(prev) if contiguous(prev, tag) => current.push(tag.clone()),
            Some(_) => {
                groups.push(finish_group(std::mem::take(&mut current)));
                current.push(tag.clone());
            }
            None => current.push(tag.clone()),
        }
    }
    if !current.is_empty() {
        groups.push(finish_group(current));
    }
    groups
}

fn finish_group(tags: Vec<TagMapping>) -> ReadGroup {
    if tags.len() == 1 {
        ReadGroup::Single(tags.into_iter().next().expect("len checked above"))
    } else {
        ReadGroup::Batch(tags)
    }
}
