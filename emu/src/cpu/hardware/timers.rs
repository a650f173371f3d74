//! # Timers (0x0400_0100 - 0x0400_010F)
//!
//! Four 16-bit up-counters. Each channel has a reload/counter register
//! (`TMxCNT_L`) and a control register (`TMxCNT_H`):
//!
//! ```text
//!  TMxCNT_H  7      6     2        1-0
//!           ┌──────┬─────┬────────┬──────────┐
//!           │start │ IRQ │cascade │prescaler │
//!           └──────┴─────┴────────┴──────────┘
//! ```
//!
//! A running timer is not ticked. Its counter is derived from the cycle at
//! which it was started and only one overflow event sits in the scheduler.
//! Cascading timers count the overflows of the channel below them instead.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Event;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::scheduler::{EventHandle, Scheduler};

const PRESCALER: [u64; 4] = [1, 64, 256, 1024];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Timer {
    reload: u16,
    control: u16,
    /// Counter value at `start`.
    counter: u16,
    start: u64,
    overflow: Option<EventHandle>,
}

impl Timer {
    fn running(&self) -> bool {
        self.control.get_bit(7)
    }

    fn cascade(&self) -> bool {
        self.control.get_bit(2)
    }

    fn irq_enabled(&self) -> bool {
        self.control.get_bit(6)
    }

    fn prescaler(&self) -> u64 {
        PRESCALER[usize::from(self.control & 3)]
    }

    fn current(&self, now: u64) -> u16 {
        if self.overflow.is_some() {
            let elapsed = (now - self.start) / self.prescaler();
            self.counter.wrapping_add(elapsed as u16)
        } else {
            self.counter
        }
    }

    fn schedule(&mut self, index: usize, scheduler: &mut Scheduler<Event>) {
        self.start = scheduler.counter();
        let delay = (0x1_0000 - u64::from(self.counter)) * self.prescaler();
        self.overflow = Some(scheduler.schedule(delay, Event::TimerOverflow(index)));
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Timers {
    timers: [Timer; 4],
}

impl Timers {
    /// `offset` is relative to the I/O base, in 0x100..=0x10F.
    #[must_use]
    pub fn read16(&self, offset: u32, scheduler: &Scheduler<Event>) -> u16 {
        let timer = &self.timers[((offset - 0x100) >> 2) as usize];
        if offset & 2 == 0 {
            timer.current(scheduler.counter())
        } else {
            timer.control
        }
    }

    pub fn write16(&mut self, offset: u32, value: u16, scheduler: &mut Scheduler<Event>) {
        let index = ((offset - 0x100) >> 2) as usize;
        if offset & 2 == 0 {
            self.timers[index].reload = value;
        } else {
            self.write_control(index, value, scheduler);
        }
    }

    fn write_control(&mut self, index: usize, value: u16, scheduler: &mut Scheduler<Event>) {
        let now = scheduler.counter();
        let timer = &mut self.timers[index];

        let mut control = value & 0x00C7;
        if index == 0 {
            control.set_bit(2, false);
        }

        let was_running = timer.running();
        let prescaler_changed = (timer.control ^ control) & 3 != 0;
        // Latched with the old prescaler.
        let count = timer.current(now);
        timer.control = control;

        if let Some(handle) = timer.overflow {
            if !timer.running() || timer.cascade() || prescaler_changed {
                timer.counter = count;
                scheduler.cancel(handle);
                timer.overflow = None;
            }
        }

        if !was_running && timer.running() {
            timer.counter = timer.reload;
            tracing::debug!("timer {index} started, reload {:#06X}", timer.reload);
        }

        if timer.running() && !timer.cascade() && timer.overflow.is_none() {
            timer.schedule(index, scheduler);
        }
    }

    /// Handles the overflow event of timer `index`, then the overflows it
    /// cascades into.
    pub fn overflow(
        &mut self,
        index: usize,
        scheduler: &mut Scheduler<Event>,
        interrupt_control: &mut InterruptControl,
    ) {
        let mut index = index;
        loop {
            let timer = &mut self.timers[index];
            timer.counter = timer.reload;
            if timer.cascade() {
                timer.overflow = None;
            } else {
                timer.schedule(index, scheduler);
            }

            if timer.irq_enabled() {
                interrupt_control.request(Interrupt::timer(index));
            }

            let Some(next) = self.timers.get_mut(index + 1) else {
                break;
            };
            if !(next.running() && next.cascade()) {
                break;
            }
            next.counter = next.counter.wrapping_add(1);
            if next.counter != 0 {
                break;
            }
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(
        timers: &mut Timers,
        scheduler: &mut Scheduler<Event>,
        interrupt_control: &mut InterruptControl,
        cycles: u64,
    ) {
        for _ in 0..cycles {
            scheduler.advance(|event, scheduler| {
                if let Event::TimerOverflow(i) = event {
                    timers.overflow(i, scheduler, interrupt_control);
                }
            });
        }
    }

    #[test]
    fn counter_tracks_elapsed_cycles() {
        let mut timers = Timers::default();
        let mut scheduler = Scheduler::new();
        let mut ic = InterruptControl::default();

        timers.write16(0x100, 0xFFF0, &mut scheduler);
        timers.write16(0x102, 0x00C0, &mut scheduler);
        assert_eq!(timers.read16(0x100, &scheduler), 0xFFF0);
        assert_eq!(timers.read16(0x102, &scheduler), 0x00C0);

        run(&mut timers, &mut scheduler, &mut ic, 5);
        assert_eq!(timers.read16(0x100, &scheduler), 0xFFF5);
        assert_eq!(ic.interrupt_request, 0);

        run(&mut timers, &mut scheduler, &mut ic, 11);
        assert_eq!(ic.interrupt_request, Interrupt::Timer0.mask());
        assert_eq!(timers.read16(0x100, &scheduler), 0xFFF0);

        // Periodic: the next overflow comes 16 cycles later.
        ic.acknowledge(0xFFFF);
        run(&mut timers, &mut scheduler, &mut ic, 16);
        assert_eq!(ic.interrupt_request, Interrupt::Timer0.mask());
    }

    #[test]
    fn prescaler_divides_elapsed_cycles() {
        let mut timers = Timers::default();
        let mut scheduler = Scheduler::new();
        let mut ic = InterruptControl::default();

        timers.write16(0x104, 0, &mut scheduler);
        // Prescaler 64, no IRQ
        timers.write16(0x106, 0x0081, &mut scheduler);
        run(&mut timers, &mut scheduler, &mut ic, 64 * 3 + 10);
        assert_eq!(timers.read16(0x104, &scheduler), 3);
    }

    #[test]
    fn stopping_latches_the_count() {
        let mut timers = Timers::default();
        let mut scheduler = Scheduler::new();
        let mut ic = InterruptControl::default();

        timers.write16(0x102, 0x0080, &mut scheduler);
        run(&mut timers, &mut scheduler, &mut ic, 100);
        timers.write16(0x102, 0x0000, &mut scheduler);
        assert!(scheduler.is_empty());

        run(&mut timers, &mut scheduler, &mut ic, 100);
        assert_eq!(timers.read16(0x100, &scheduler), 100);
    }

    #[test]
    fn cascade_counts_overflows() {
        let mut timers = Timers::default();
        let mut scheduler = Scheduler::new();
        let mut ic = InterruptControl::default();

        timers.write16(0x104, 0xFFFE, &mut scheduler);
        // Timer 1: start, IRQ, cascade
        timers.write16(0x106, 0x00C4, &mut scheduler);
        timers.write16(0x100, 0xFFFF, &mut scheduler);
        timers.write16(0x102, 0x0080, &mut scheduler);
        assert_eq!(scheduler.len(), 1);

        run(&mut timers, &mut scheduler, &mut ic, 1);
        assert_eq!(timers.read16(0x104, &scheduler), 0xFFFF);
        assert_eq!(ic.interrupt_request, 0);

        run(&mut timers, &mut scheduler, &mut ic, 1);
        assert_eq!(timers.read16(0x104, &scheduler), 0xFFFE);
        assert_eq!(ic.interrupt_request, Interrupt::Timer1.mask());
    }

    #[test]
    fn timer_zero_cannot_cascade() {
        let mut timers = Timers::default();
        let mut scheduler = Scheduler::new();
        timers.write16(0x102, 0x0084, &mut scheduler);
        assert_eq!(timers.read16(0x102, &scheduler), 0x0080);
        assert_eq!(scheduler.len(), 1);
    }
}
