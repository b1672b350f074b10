use std::num::NonZeroUsize;

use crate::message::Message;

/// Default number of messages per classification window.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(9);

/// A contiguous window of messages, indexed over the whole log.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// 0-based position of this window in the full sequence of windows.
    pub index: usize,
    pub messages: &'a [Message],
}

impl Chunk<'_> {
    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id() == id)
    }
}

/// Number of windows needed to cover `len` messages.
pub fn total_chunks(len: usize, size: NonZeroUsize) -> usize {
    len.div_ceil(size.get())
}

/// Split `messages` into windows of `size`, starting at window `start`.
///
/// Every window holds exactly `size` messages except possibly the last.
/// At most `limit` windows are yielded when a limit is given. Starting at or
/// past the end yields nothing.
pub fn chunks(
    messages: &[Message],
    size: NonZeroUsize,
    start: usize,
    limit: Option<usize>,
) -> impl Iterator<Item = Chunk<'_>> {
    messages
        .chunks(size.get())
        .enumerate()
        .skip(start)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, messages)| Chunk { index, messages })
}
