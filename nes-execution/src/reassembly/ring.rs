// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The sequence ring buffer itself (spec.md §4.10, C10): reassembles a
//! logical record that straddles two or more source-produced buffers.
//! Grounded on `SequenceRingBuffer.hpp`'s slot-indexed, CAS-claimed search,
//! simplified by tracking absolute sequence numbers throughout (so a scan
//! just compares `sequence / capacity` against a slot's stored iteration
//! tag) rather than the original's relative ABA-offset arithmetic — the
//! ABA tag still does the same job of rejecting a stale, wrapped-around
//! slot.

use parking_lot::Mutex;

use nes_execution_domain::PipelineError;

use super::slot::SlotState;

struct Slot {
    state: SlotState,
    /// Bytes before this buffer's first delimiter. Equal to `trailing` when
    /// the buffer has no delimiter at all (a pure continuation).
    leading: Mutex<Vec<u8>>,
    /// Bytes after this buffer's last delimiter.
    trailing: Mutex<Vec<u8>>,
}

/// Splits a buffer's payload on `delimiter` into the leading fragment (before
/// the first delimiter), the trailing fragment (after the last delimiter),
/// and whether a delimiter was found at all (spec.md §4.10's "hasTupleDelimiter").
/// Record boundaries strictly between the first and last delimiter are
/// already complete tuples and aren't this module's concern.
pub fn split_on_delimiter(payload: &[u8], delimiter: u8) -> (Vec<u8>, Vec<u8>, bool) {
    match (payload.iter().position(|&b| b == delimiter), payload.iter().rposition(|&b| b == delimiter)) {
        (Some(first), Some(last)) => (payload[..first].to_vec(), payload[last + 1..].to_vec(), true),
        _ => (payload.to_vec(), payload.to_vec(), false),
    }
}

/// Fixed-capacity ring of staged buffer fragments, indexed by `sequenceNumber
/// mod N` (spec.md §4.10). The ring size must exceed the worst-case number of
/// buffers a single spanning tuple can cross; a span that outgrows it is
/// reported as [`PipelineError::ResourceExhausted`] rather than silently
/// dropped.
pub struct SequenceRingBuffer {
    capacity: u64,
    slots: Vec<Slot>,
}

impl SequenceRingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "reassembly ring must have at least one slot");
        let slots = (0..capacity)
            .map(|_| Slot { state: SlotState::new_unwritten(), leading: Mutex::new(Vec::new()), trailing: Mutex::new(Vec::new()) })
            .collect();
        Self { capacity: capacity as u64, slots }
    }

    fn index(&self, sequence: u64) -> usize {
        (sequence % self.capacity) as usize
    }

    fn iteration(&self, sequence: u64) -> u32 {
        // Truncates past 2^32 iterations, exactly like the original's
        // 32-bit tag: acceptable since the ring wraps long before a
        // sequence number exhausts even 32 bits of iteration count.
        (sequence / self.capacity) as u32
    }

    /// Stages one arriving buffer's framing fragments at `sequence` (spec.md
    /// §4.10 step 1).
    pub fn stage(&self, sequence: u64, leading: Vec<u8>, trailing: Vec<u8>, has_delimiter: bool) {
        let idx = self.index(sequence);
        *self.slots[idx].leading.lock() = leading;
        *self.slots[idx].trailing.lock() = trailing;
        self.slots[idx].state.write(self.iteration(sequence), has_delimiter);
    }

    /// Walks backward (`forward = false`) or forward from `sequence` through
    /// same-iteration, no-delimiter slots (spec.md §4.10 steps 2-3),
    /// returning the sequence number of the first delimiter-bearing slot
    /// found. `None` means the walk hit an unwritten/wrong-iteration slot
    /// (the span hasn't fully arrived yet) before exhausting `capacity - 1`
    /// steps, or ran the full ring without finding a boundary.
    fn scan(&self, sequence: u64, forward: bool) -> Option<u64> {
        for distance in 1..self.capacity {
            let candidate = if forward {
                sequence + distance
            } else {
                sequence.checked_sub(distance)?
            };
            let idx = self.index(candidate);
            let expected_iteration = self.iteration(candidate);
            let view = self.slots[idx].state.load();
            if view.is_unwritten() || view.iteration != expected_iteration {
                return None;
            }
            if view.has_delimiter {
                return Some(candidate);
            }
        }
        None
    }

    /// Attempts to assemble the spanning tuple that touches `sequence`'s slot
    /// (spec.md §4.10 steps 2-4). Idempotent to call redundantly from every
    /// buffer along a span — the CAS in [`SlotState::try_claim`] ensures
    /// only one caller ever gets `Some` for a given span, and a fully
    /// resolved span's boundary slots then read as claimed for every later
    /// caller.
    pub fn try_assemble(&self, sequence: u64) -> Option<Vec<u8>> {
        let idx = self.index(sequence);
        let view = self.slots[idx].state.load();
        if view.is_unwritten() {
            return None;
        }

        let (start_seq, end_seq) = if view.has_delimiter {
            (self.scan(sequence, false)?, sequence)
        } else {
            (self.scan(sequence, false)?, self.scan(sequence, true)?)
        };

        let start_idx = self.index(start_seq);
        if !self.slots[start_idx].state.try_claim(self.iteration(start_seq)) {
            return None;
        }

        let mut assembled = self.slots[start_idx].trailing.lock().clone();
        let mut middle = start_seq + 1;
        while middle < end_seq {
            let mid_idx = self.index(middle);
            assembled.extend_from_slice(&self.slots[mid_idx].leading.lock());
            self.slots[mid_idx].state.mark_used_leading();
            self.slots[mid_idx].state.mark_used_trailing();
            middle += 1;
        }
        let end_idx = self.index(end_seq);
        assembled.extend_from_slice(&self.slots[end_idx].leading.lock());
        self.slots[start_idx].state.mark_used_trailing();
        self.slots[end_idx].state.mark_used_leading();

        Some(assembled)
    }

    /// spec.md §4.10 step 5: a written slot must have claimed its leading
    /// fragment if its ring-adjacent predecessor was staged as the
    /// immediately preceding sequence number, and its trailing fragment if
    /// the successor was staged as the immediately following one — i.e. the
    /// check only fires across a boundary both neighbors have actually
    /// arrived for; a slot at the leading or trailing edge of what's
    /// currently in flight is exempt, same as the original's bootstrap
    /// "first entry" slot is exempt from a leading check it has no
    /// predecessor to satisfy.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let n = self.slots.len();
        for (idx, slot) in self.slots.iter().enumerate() {
            let view = slot.state.load();
            if view.is_unwritten() {
                continue;
            }

            let pred = self.slots[(idx + n - 1) % n].state.load();
            let expected_pred_iteration = if idx == 0 { view.iteration.wrapping_sub(1) } else { view.iteration };
            if !pred.is_unwritten() && pred.iteration == expected_pred_iteration && !view.used_leading {
                return Err(PipelineError::InvalidSequence(format!("reassembly slot {idx} still owns its leading fragment")));
            }

            let succ = self.slots[(idx + 1) % n].state.load();
            let expected_succ_iteration = view.iteration + u32::from(idx + 1 == n);
            if !succ.is_unwritten() && succ.iteration == expected_succ_iteration && !view.used_trailing {
                return Err(PipelineError::InvalidSequence(format!("reassembly slot {idx} still owns its trailing fragment")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_finds_leading_and_trailing_fragments() {
        let (leading, trailing, has_delimiter) = split_on_delimiter(b"AB\nmiddle\nCD", b'\n');
        assert_eq!(leading, b"AB");
        assert_eq!(trailing, b"CD");
        assert!(has_delimiter);
    }

    #[test]
    fn split_reports_no_delimiter_for_a_pure_continuation() {
        let (leading, trailing, has_delimiter) = split_on_delimiter(b"nodelimiterhere", b'\n');
        assert_eq!(leading, trailing);
        assert!(!has_delimiter);
    }

    #[test]
    fn assembles_a_tuple_spanning_three_buffers() {
        let ring = SequenceRingBuffer::new(8);
        ring.stage(10, b"xx".to_vec(), b"AB".to_vec(), true);
        ring.stage(11, b"CD".to_vec(), b"CD".to_vec(), false);
        ring.stage(12, b"EF".to_vec(), b"yy".to_vec(), true);

        let assembled = ring.try_assemble(11).expect("span fully arrived");
        assert_eq!(assembled, b"ABCDEF");
        assert!(ring.validate().is_ok());
    }

    #[test]
    fn returns_none_until_every_buffer_in_the_span_has_arrived() {
        let ring = SequenceRingBuffer::new(8);
        ring.stage(10, b"xx".to_vec(), b"AB".to_vec(), true);
        ring.stage(11, b"CD".to_vec(), b"CD".to_vec(), false);
        // slot 12 not staged yet.
        assert!(ring.try_assemble(11).is_none());
        assert!(ring.validate().is_err());
    }

    #[test]
    fn only_one_caller_wins_the_assembly() {
        let ring = SequenceRingBuffer::new(8);
        ring.stage(0, b"xx".to_vec(), b"AB".to_vec(), true);
        ring.stage(1, b"CD".to_vec(), b"yy".to_vec(), true);

        assert_eq!(ring.try_assemble(0).unwrap(), b"ABCD");
        assert!(ring.try_assemble(1).is_none(), "second caller must not re-assemble the same span");
    }

    #[test]
    fn a_buffer_with_no_spanning_neighbor_needs_no_assembly() {
        let ring = SequenceRingBuffer::new(8);
        ring.stage(0, b"".to_vec(), b"".to_vec(), true);
        // Nothing before or after references slot 0, so no span touches it.
        assert!(ring.try_assemble(0).is_none());
    }

    #[test]
    fn aba_tag_prevents_a_stale_iteration_from_masquerading_as_a_boundary() {
        let ring = SequenceRingBuffer::new(4);
        // Iteration 0 leaves a delimiter-bearing buffer at slot index 1
        // (sequence 1) that is never consumed by an assembly.
        ring.stage(1, b"".to_vec(), b"".to_vec(), true);

        // Iteration 1 stages a pure continuation at sequence 4 (slot index
        // 0) with a genuine predecessor at sequence 3 (slot index 3), but
        // its successor at sequence 5 reuses slot index 1 and has not been
        // (re)staged for this iteration yet. A forward scan that ignored
        // the iteration tag would read slot 1's leftover `hasTupleDelimiter`
        // bit from iteration 0 and wrongly report the span complete.
        ring.stage(3, b"xx".to_vec(), b"AB".to_vec(), true);
        ring.stage(4, b"CD".to_vec(), b"CD".to_vec(), false);
        assert!(ring.try_assemble(4).is_none());

        // Once sequence 5 is genuinely staged for iteration 1, the same span
        // resolves correctly.
        ring.stage(5, b"EF".to_vec(), b"yy".to_vec(), true);
        assert_eq!(ring.try_assemble(4).unwrap(), b"ABCDEF");
    }
}
