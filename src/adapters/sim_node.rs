//! Simulated devices on a [`SimBus`].
//!
//! [`ManagerNode`] wires a [`ManagerService`] to a slave endpoint (the
//! command table) and a master (notifications).  [`ApplicationNode`]
//! owns a [`DayNightClient`] and a slave that queues the manager's
//! notification frames until the application loop drains them.
//!
//! Slave callbacks reach the shared state through `Rc<RefCell<_>>`;
//! a callback that finds the service already borrowed (the manager
//! addressing itself) answers with the error reply instead of panicking.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;

use heapless::Vec;
use log::warn;

use super::eeprom::SimEeprom;
use super::hardware::SimBoard;
use super::sim_bus::{SimBus, SimPort};
use crate::app::ports::{Clock, EventSink};
use crate::app::service::ManagerService;
use crate::config::ManagerConfig;
use crate::protocol::{BUFFER_LENGTH, ERROR_REPLY};
use crate::remote::daynight::{ClientRoutes, DayNightClient};
use crate::twi::master::TwiMaster;
use crate::twi::slave::{TwiSlave, TxBuffer};

// ───────────────────────────────────────────────────────────────
// Manager
// ───────────────────────────────────────────────────────────────

pub struct ManagerNode<K> {
    service: Rc<RefCell<ManagerService>>,
    board: Rc<RefCell<SimBoard>>,
    eeprom: SimEeprom,
    master: TwiMaster<SimPort>,
    slave: Rc<RefCell<TwiSlave>>,
    clock: K,
}

impl<K: Clock + Clone + 'static> ManagerNode<K> {
    pub fn new(bus: &SimBus, config: ManagerConfig, eeprom: SimEeprom, clock: K) -> Self {
        let address = config.manager_address;
        let service = Rc::new(RefCell::new(ManagerService::new(
            config,
            &eeprom,
            clock.millis(),
        )));
        let board = Rc::new(RefCell::new(SimBoard::new()));
        let slave = Rc::new(RefCell::new(TwiSlave::new(address)));
        let reply = Rc::new(RefCell::new(TxBuffer::new()));

        {
            let service = service.clone();
            let board = board.clone();
            let reply = reply.clone();
            let clock = clock.clone();
            slave.borrow_mut().register_receive(move |frame| {
                let answer = match (service.try_borrow_mut(), board.try_borrow_mut()) {
                    (Ok(mut svc), Ok(mut hw)) => svc.dispatch(frame, clock.millis(), &mut *hw),
                    _ => {
                        warn!("TWI: manager busy, refusing {:02X?}", frame);
                        let mut r = TxBuffer::new();
                        let _ = r.push(ERROR_REPLY);
                        r
                    }
                };
                if !frame.is_empty() {
                    *reply.borrow_mut() = answer;
                }
            });
        }
        slave.borrow_mut().register_transmit(move |tx| {
            let _ = tx.extend_from_slice(&reply.borrow());
        });
        bus.attach(slave.clone());

        Self {
            service,
            board,
            eeprom,
            master: TwiMaster::new(bus.port()),
            slave,
            clock,
        }
    }

    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.service.borrow_mut().start(sink);
    }

    /// One pass of the manager's cooperative loop.  Skipped while another
    /// master holds the bus (lost arbitration; retried next pass).
    pub fn tick(&mut self, sink: &mut impl EventSink) {
        if self.master.peripheral().bus().is_held() && !self.master.is_in_use() {
            return;
        }
        let now = self.clock.millis();
        let address = {
            let mut svc = self.service.borrow_mut();
            let mut hw = self.board.borrow_mut();
            svc.tick(now, &mut self.master, &mut *hw, &mut self.eeprom, sink);
            svc.address()
        };
        // A command-table address change lands here, outside the callback.
        let mut slave = self.slave.borrow_mut();
        if slave.address() != address {
            slave.set_address(address);
        }
    }

    pub fn service(&self) -> Ref<'_, ManagerService> {
        self.service.borrow()
    }

    pub fn board(&self) -> RefMut<'_, SimBoard> {
        self.board.borrow_mut()
    }

    pub fn eeprom(&self) -> &SimEeprom {
        &self.eeprom
    }

    pub fn address(&self) -> u8 {
        self.slave.borrow().address()
    }
}

// ───────────────────────────────────────────────────────────────
// Application
// ───────────────────────────────────────────────────────────────

/// A notification frame as received by the application slave.
pub type Frame = Vec<u8, BUFFER_LENGTH>;

pub struct ApplicationNode {
    client: DayNightClient,
    master: TwiMaster<SimPort>,
    inbox: Rc<RefCell<VecDeque<Frame>>>,
}

impl ApplicationNode {
    pub fn new(bus: &SimBus, manager: u8, routes: ClientRoutes, report_repeat_ms: u32) -> Self {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let slave = Rc::new(RefCell::new(TwiSlave::new(routes.address)));
        {
            let inbox = inbox.clone();
            slave.borrow_mut().register_receive(move |frame| {
                if frame.is_empty() {
                    return;
                }
                if let Ok(f) = Frame::from_slice(frame) {
                    inbox.borrow_mut().push_back(f);
                }
            });
        }
        bus.attach(slave);

        Self {
            client: DayNightClient::new(manager, routes, report_repeat_ms),
            master: TwiMaster::new(bus.port()),
            inbox,
        }
    }

    /// Hand every queued notification to the client.  Returns how many
    /// frames were consumed.
    pub fn pump_events(&mut self) -> usize {
        let mut n = 0;
        loop {
            let Some(frame) = self.inbox.borrow_mut().pop_front() else {
                return n;
            };
            self.client.handle_event(&frame);
            n += 1;
        }
    }

    pub fn client(&self) -> &DayNightClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut DayNightClient {
        &mut self.client
    }

    pub fn master(&mut self) -> &mut TwiMaster<SimPort> {
        &mut self.master
    }

    /// Client and bus master together, for polling.
    pub fn parts(&mut self) -> (&mut DayNightClient, &mut TwiMaster<SimPort>) {
        (&mut self.client, &mut self.master)
    }
}
