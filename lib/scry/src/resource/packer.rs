//! Drives one resource transfer at a time, packing successive messages into
//! packets under a byte budget. A release racing an in-flight transfer
//! cancels the packer, dropping the borrowed resource mid-stream.

use super::{Resource, TransferProgress};
use crate::error::WireResult;
use crate::packet::PacketWriter;
use std::sync::Arc;

pub struct ResourcePacker {
    resource: Option<Arc<dyn Resource>>,
    progress: TransferProgress,
    last_completed: Option<u64>,
}

impl ResourcePacker {
    pub fn new() -> ResourcePacker {
        ResourcePacker {
            resource: None,
            progress: TransferProgress::default(),
            last_completed: None,
        }
    }

    /// True while a transfer is bound and incomplete.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.resource.is_some()
    }

    #[inline]
    pub fn resource(&self) -> Option<&Arc<dyn Resource>> {
        self.resource.as_ref()
    }

    /// Binds the next resource to transfer. Any current transfer is dropped.
    pub fn transfer(&mut self, resource: Arc<dyn Resource>) {
        self.resource = Some(resource);
        self.progress.reset();
    }

    /// Drops the current resource mid-transfer.
    pub fn cancel(&mut self) {
        self.resource = None;
        self.progress.reset();
    }

    /// The key of the most recently completed transfer.
    #[inline]
    pub fn last_completed_key(&self) -> Option<u64> {
        self.last_completed
    }

    /// Packs the next transfer message. Returns true when the packet holds a
    /// message to send; false when idle or the budget is too small to make
    /// progress. Completion unbinds the resource and records its key.
    pub fn next_packet(&mut self, packet: &mut PacketWriter, byte_limit: u32) -> WireResult<bool> {
        let resource = match &self.resource {
            Some(resource) => Arc::clone(resource),
            None => return Ok(false),
        };
        let wrote = resource.transfer(packet, byte_limit, &mut self.progress)?;
        if self.progress.complete {
            self.last_completed = Some(resource.unique_key());
            self.resource = None;
            self.progress.reset();
        }
        Ok(wrote)
    }
}

impl Default for ResourcePacker {
    fn default() -> ResourcePacker {
        ResourcePacker::new()
    }
}
