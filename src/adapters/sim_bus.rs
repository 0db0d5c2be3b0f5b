//! In-memory two-wire bus for host testing and simulation.
//!
//! Any number of [`TwiSlave`] endpoints attach to one [`SimBus`]; every
//! device's master gets its own [`SimPort`] onto the same bus.  Bus steps
//! are delivered to the addressed slave synchronously, so a master's
//! `service()` call reaches the remote device's callbacks the same way the
//! TWI interrupt would on hardware.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::twi::master::TwiPeripheral;
use crate::twi::slave::TwiSlave;
use crate::twi::{Ack, Direction};

#[derive(Default)]
struct BusCore {
    slaves: Vec<Rc<RefCell<TwiSlave>>>,
    active: Option<Rc<RefCell<TwiSlave>>>,
    /// Set by START, cleared only by STOP.
    owned: bool,
}

/// Shared handle to the simulated bus.
#[derive(Clone, Default)]
pub struct SimBus {
    core: Rc<RefCell<BusCore>>,
    steps: Rc<Cell<u64>>,
    fault: Rc<Cell<bool>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a slave endpoint.  It answers on whatever address it holds
    /// at the time it is addressed.
    pub fn attach(&self, slave: Rc<RefCell<TwiSlave>>) {
        self.core.borrow_mut().slaves.push(slave);
    }

    /// Disconnect every slave currently answering on `address`.
    pub fn detach(&self, address: u8) {
        self.core
            .borrow_mut()
            .slaves
            .retain(|s| s.borrow().address() != address);
    }

    /// A new master port onto this bus.
    pub fn port(&self) -> SimPort {
        SimPort { bus: self.clone() }
    }

    /// `true` from a master's START until its STOP, including a hold and
    /// the gap between a repeated START and its address byte.
    pub fn is_held(&self) -> bool {
        self.core.borrow().owned
    }

    /// Total bus steps taken by all ports.
    pub fn step_count(&self) -> u64 {
        self.steps.get()
    }

    /// While set, every START reports an illegal bus condition.
    pub fn set_fault(&self, fault: bool) {
        self.fault.set(fault);
    }

    fn count(&self) {
        self.steps.set(self.steps.get() + 1);
    }

    fn find(&self, address: u8) -> Option<Rc<RefCell<TwiSlave>>> {
        self.core
            .borrow()
            .slaves
            .iter()
            .find(|s| s.borrow().address() == address)
            .cloned()
    }

    fn active(&self) -> Option<Rc<RefCell<TwiSlave>>> {
        self.core.borrow().active.clone()
    }

    /// Finish the transfer in progress, delivering any pending write.
    fn end_transfer(&self) {
        let active = self.core.borrow_mut().active.take();
        if let Some(slave) = active {
            slave.borrow_mut().end_of_transfer();
        }
    }
}

/// One master's connection to a [`SimBus`].
pub struct SimPort {
    bus: SimBus,
}

impl SimPort {
    pub fn bus(&self) -> &SimBus {
        &self.bus
    }
}

impl TwiPeripheral for SimPort {
    fn start(&mut self) -> bool {
        self.bus.count();
        self.bus.end_transfer();
        let ok = !self.bus.fault.get();
        self.bus.core.borrow_mut().owned = ok;
        ok
    }

    fn address(&mut self, addr: u8, dir: Direction) -> Ack {
        self.bus.count();
        let Some(slave) = self.bus.find(addr) else {
            return Ack::Nack;
        };
        self.bus.core.borrow_mut().active = Some(slave.clone());
        slave.borrow_mut().addressed(dir)
    }

    fn write_byte(&mut self, byte: u8) -> Ack {
        self.bus.count();
        match self.bus.active() {
            Some(slave) => slave.borrow_mut().receive_byte(byte),
            None => Ack::Nack,
        }
    }

    fn read_byte(&mut self, _ack: bool) -> Option<u8> {
        self.bus.count();
        self.bus
            .active()
            .map(|slave| slave.borrow_mut().transmit_byte())
    }

    fn stop(&mut self) {
        self.bus.count();
        self.bus.end_transfer();
        self.bus.core.borrow_mut().owned = false;
    }
}
