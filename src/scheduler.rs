//! Wake queue for population routines.
//!
//! Each population owns one pending event per cadence. The population system
//! drains every event due at the current tick and reschedules the routine at
//! `tick + period` while the population is alive.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::population::Cadence;
use crate::world::PopulationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WakeEvent {
    pub tick: u64,
    pub cadence: Cadence,
    pub sequence: u64,
    pub population: PopulationId,
}

#[derive(Debug, Default, Clone)]
pub struct WakeQueue {
    heap: BinaryHeap<Reverse<WakeEvent>>,
    next_sequence: u64,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, population: PopulationId, cadence: Cadence, tick: u64) {
        let event = WakeEvent {
            tick,
            cadence,
            sequence: self.next_sequence,
            population,
        };
        self.next_sequence += 1;
        self.heap.push(Reverse(event));
    }

    /// Daily routines wake at `now`; slower cadences wait one full period.
    pub fn schedule_cadences(&mut self, population: PopulationId, now: u64, cadences: &[Cadence]) {
        for cadence in cadences {
            let first = match cadence {
                Cadence::Daily => now,
                other => now + other.period_days(),
            };
            self.schedule(population, *cadence, first);
        }
    }

    pub fn pop_due(&mut self, now: u64) -> Option<WakeEvent> {
        match self.heap.peek() {
            Some(Reverse(event)) if event.tick <= now => self.heap.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    pub fn next_tick(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(event)| event.tick)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
