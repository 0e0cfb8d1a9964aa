//! Protocol dissection engine.

use bytes::BytesMut;
use rd53_emulator::protocol::{Channel, Command, Frame, Packet, ProtocolError};

/// Which link a capture was taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Link {
    /// Host to chip.
    Command,
    /// Chip to host.
    Data,
}

/// Decoded content of one stretch of the capture.
#[derive(Debug)]
pub enum ItemContent {
    Command(Command),
    Frame(Frame),
    /// Consecutive bytes that decode to nothing. The reason is that of the
    /// first byte.
    Skipped(ProtocolError),
}

/// One dissected stretch of the capture.
#[derive(Debug)]
pub struct DissectedItem {
    pub offset: usize,
    pub raw_data: Vec<u8>,
    pub content: ItemContent,
}

/// Dissect a capture of `link` into items and skipped runs, in order.
pub fn dissect(link: Link, data: &[u8]) -> Vec<DissectedItem> {
    match link {
        Link::Command => dissect_with::<Command>(data, ItemContent::Command),
        Link::Data => dissect_with::<Frame>(data, ItemContent::Frame),
    }
}

fn dissect_with<T: Packet>(data: &[u8], wrap: fn(T) -> ItemContent) -> Vec<DissectedItem> {
    let mut channel = Channel::<T>::new();
    channel.decode(data);

    let mut items = channel.take_items().into_iter();
    let mut skipped = channel.skipped().iter().peekable();
    let mut dissected: Vec<DissectedItem> = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if let Some(skip) = skipped.next_if(|s| s.offset == pos) {
            // Extend the current run of skipped bytes, or start one.
            match dissected.last_mut() {
                Some(last)
                    if matches!(last.content, ItemContent::Skipped(_))
                        && last.offset + last.raw_data.len() == pos =>
                {
                    last.raw_data.push(skip.byte);
                }
                _ => dissected.push(DissectedItem {
                    offset: pos,
                    raw_data: vec![skip.byte],
                    content: ItemContent::Skipped(skip.reason.clone()),
                }),
            }
            pos += 1;
            continue;
        }

        let Some(item) = items.next() else {
            break;
        };
        let mut scratch = BytesMut::new();
        let len = item.pack(&mut scratch).min(data.len() - pos);
        dissected.push(DissectedItem {
            offset: pos,
            raw_data: data[pos..pos + len].to_vec(),
            content: wrap(item),
        });
        pos += len;
    }

    dissected
}

/// Item counts of a dissection.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub items: usize,
    pub skipped_bytes: usize,
}

pub fn summarize(items: &[DissectedItem]) -> Summary {
    items.iter().fold(Summary::default(), |mut summary, item| {
        match item.content {
            ItemContent::Skipped(_) => summary.skipped_bytes += item.raw_data.len(),
            _ => summary.items += 1,
        }
        summary
    })
}
