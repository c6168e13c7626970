//! Serialize-once fan-out to every registered session.

use crate::session::Session;
use log::debug;
use shared::Writer;
use std::ops::{Deref, DerefMut};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// A packet being written for delivery to a fixed set of recipients.
///
/// Dereferences to a [`Writer`], so any protocol write can be chained onto it
/// before calling [`send`](BroadcastStream::send).
pub struct BroadcastStream<'a> {
    recipients: &'a [Box<dyn Session>],
    writer: Writer,
}

impl<'a> BroadcastStream<'a> {
    pub fn new(recipients: &'a [Box<dyn Session>]) -> Self {
        Self {
            recipients,
            writer: Writer::new(),
        }
    }

    /// Freezes the buffer and hands the same bytes to every recipient.
    ///
    /// A failed send is skipped; the socket task that owns that transport
    /// notices the closure on its own and reports the disconnect.
    pub fn send(self) -> DeliveryReport {
        let bytes = self.writer.finish();
        let mut report = DeliveryReport::default();

        for session in self.recipients {
            match session.send(bytes.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!("Broadcast to client {} failed: {}", session.id(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl Deref for BroadcastStream<'_> {
    type Target = Writer;

    fn deref(&self) -> &Writer {
        &self.writer
    }
}

impl DerefMut for BroadcastStream<'_> {
    fn deref_mut(&mut self) -> &mut Writer {
        &mut self.writer
    }
}
