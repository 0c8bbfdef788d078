// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer slot bookkeeping for synchronous codec sessions.
//!
//! Backends that transform input as soon as it is queued (the loopback codec,
//! the FDK codec) share this type to hand out input slots, park produced
//! output until the caller dequeues it and recycle released output slots.

use std::collections::VecDeque;

use crate::{BufferFlags, BufferInfo, Error, MediaFormat, OutputEvent, Result};

enum Pending {
    Buffer(usize, BufferInfo),
    Format(MediaFormat),
}

/// Input and output slots of one session.
///
/// Input is refused while `max_outputs` output buffers are waiting to be
/// drained or released, which is how a synchronous session exerts
/// back-pressure on the caller.
pub struct BufferQueue {
    inputs: Vec<Vec<u8>>,
    input_held: Vec<bool>,
    free_inputs: VecDeque<usize>,
    outputs: Vec<Option<Vec<u8>>>,
    free_outputs: Vec<usize>,
    ready: VecDeque<Pending>,
    max_outputs: usize,
}

impl BufferQueue {
    /// Creates a queue with `input_slots` buffers of `input_capacity` bytes.
    pub fn new(input_slots: usize, input_capacity: usize, max_outputs: usize) -> Self {
        Self {
            inputs: (0..input_slots).map(|_| vec![0; input_capacity]).collect(),
            input_held: vec![false; input_slots],
            free_inputs: (0..input_slots).collect(),
            outputs: Vec::new(),
            free_outputs: Vec::new(),
            ready: VecDeque::new(),
            max_outputs: max_outputs.max(1),
        }
    }

    /// Capacity of every input buffer in bytes.
    pub fn input_capacity(&self) -> usize {
        self.inputs.first().map(Vec::len).unwrap_or(0)
    }

    /// Number of output buffers produced but not yet released.
    pub fn outputs_in_use(&self) -> usize {
        self.outputs.len() - self.free_outputs.len()
    }

    /// Hands out a free input slot, unless the output side is full.
    pub fn dequeue_input(&mut self) -> Option<usize> {
        if self.outputs_in_use() >= self.max_outputs {
            return None;
        }
        let index = self.free_inputs.pop_front()?;
        self.input_held[index] = true;
        Some(index)
    }

    pub fn input_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.check_input_held(index)?;
        Ok(self.inputs[index].as_mut_slice())
    }

    /// Takes back a dequeued input slot and returns a copy of its first `size` bytes.
    pub fn submit_input(&mut self, index: usize, size: usize) -> Result<Vec<u8>> {
        self.check_input_held(index)?;
        let capacity = self.inputs[index].len();
        if size > capacity {
            return Err(Error::invalid_arg(format!(
                "input size {size} exceeds buffer capacity {capacity}"
            )));
        }
        let data = self.inputs[index][..size].to_vec();
        self.input_held[index] = false;
        self.free_inputs.push_back(index);
        Ok(data)
    }

    /// Parks a produced output buffer until the caller dequeues it.
    pub fn push_output(&mut self, data: Vec<u8>, presentation_time_us: i64, flags: BufferFlags) {
        let info = BufferInfo {
            offset: 0,
            size: data.len(),
            presentation_time_us,
            flags,
        };
        let index = match self.free_outputs.pop() {
            Some(index) => {
                self.outputs[index] = Some(data);
                index
            }
            None => {
                self.outputs.push(Some(data));
                self.outputs.len() - 1
            }
        };
        self.ready.push_back(Pending::Buffer(index, info));
    }

    /// Queues a format change notification in order with the buffers.
    pub fn push_format_change(&mut self, format: MediaFormat) {
        self.ready.push_back(Pending::Format(format));
    }

    /// Pops the next output event, or [`OutputEvent::TryAgainLater`].
    pub fn next_output(&mut self) -> OutputEvent {
        match self.ready.pop_front() {
            Some(Pending::Buffer(index, info)) => OutputEvent::Buffer { index, info },
            Some(Pending::Format(format)) => OutputEvent::FormatChanged(format),
            None => OutputEvent::TryAgainLater,
        }
    }

    pub fn output(&self, index: usize) -> Result<&[u8]> {
        self.outputs
            .get(index)
            .and_then(Option::as_deref)
            .ok_or_else(|| Error::invalid_arg(format!("output buffer {index} is not dequeued")))
    }

    pub fn release_output(&mut self, index: usize) -> Result<()> {
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| Error::invalid_arg(format!("unknown output buffer {index}")))?;
        if slot.take().is_none() {
            return Err(Error::invalid_arg(format!(
                "output buffer {index} released twice"
            )));
        }
        self.free_outputs.push(index);
        Ok(())
    }

    /// Drops every pending buffer and returns all slots to the free lists.
    pub fn clear(&mut self) {
        self.ready.clear();
        self.free_outputs = (0..self.outputs.len()).collect();
        self.outputs.iter_mut().for_each(|slot| *slot = None);
        self.input_held.iter_mut().for_each(|held| *held = false);
        self.free_inputs = (0..self.inputs.len()).collect();
    }

    fn check_input_held(&self, index: usize) -> Result<()> {
        match self.input_held.get(index) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::invalid_arg(format!(
                "input buffer {index} is not dequeued"
            ))),
            None => Err(Error::invalid_arg(format!("unknown input buffer {index}"))),
        }
    }
}
