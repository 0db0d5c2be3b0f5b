//! Bus slave endpoint.
//!
//! The slave interrupt (or [`SimBus`](crate::adapters::sim_bus::SimBus)
//! on host) reports bus events here; the endpoint buffers them and hands
//! complete frames to the registered callbacks:
//!
//! - **receive** runs on STOP or repeated START after a master write and
//!   gets the received bytes;
//! - **transmit** runs when a master addresses us for reading and fills
//!   the outgoing buffer.
//!
//! One callback of each kind may be registered; registering again
//! replaces the previous one.  With no callback registered a write is
//! accepted and dropped and a read returns `0xFF` bytes.

use heapless::Vec;

use super::{Ack, Direction};
use crate::protocol::BUFFER_LENGTH;

/// Outgoing buffer handed to the transmit callback.
pub type TxBuffer = Vec<u8, BUFFER_LENGTH>;

pub type ReceiveFn = Box<dyn FnMut(&[u8])>;
pub type TransmitFn = Box<dyn FnMut(&mut TxBuffer)>;

pub struct TwiSlave {
    address: u8,
    rx: Vec<u8, BUFFER_LENGTH>,
    receiving: bool,
    tx: TxBuffer,
    tx_index: usize,
    on_receive: Option<ReceiveFn>,
    on_transmit: Option<TransmitFn>,
}

impl TwiSlave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            rx: Vec::new(),
            receiving: false,
            tx: Vec::new(),
            tx_index: 0,
            on_receive: None,
            on_transmit: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// Install the receive callback, replacing any previous one.
    pub fn register_receive(&mut self, f: impl FnMut(&[u8]) + 'static) {
        self.on_receive = Some(Box::new(f));
    }

    /// Install the transmit callback, replacing any previous one.
    pub fn register_transmit(&mut self, f: impl FnMut(&mut TxBuffer) + 'static) {
        self.on_transmit = Some(Box::new(f));
    }

    // ── Bus events ────────────────────────────────────────────

    /// Our address matched.  Always acknowledged.
    pub fn addressed(&mut self, dir: Direction) -> Ack {
        match dir {
            Direction::Write => {
                self.rx.clear();
                self.receiving = true;
            }
            Direction::Read => {
                self.tx.clear();
                self.tx_index = 0;
                if let Some(f) = self.on_transmit.as_mut() {
                    f(&mut self.tx);
                }
            }
        }
        Ack::Ack
    }

    /// A data byte arrived.  NACKed once the buffer is full.
    pub fn receive_byte(&mut self, byte: u8) -> Ack {
        match self.rx.push(byte) {
            Ok(()) => Ack::Ack,
            Err(_) => Ack::Nack,
        }
    }

    /// Next byte to clock out; `0xFF` past the end of the buffer.
    pub fn transmit_byte(&mut self) -> u8 {
        let byte = self.tx.get(self.tx_index).copied().unwrap_or(0xFF);
        self.tx_index += 1;
        byte
    }

    /// STOP or repeated START: deliver a pending master write.
    pub fn end_of_transfer(&mut self) {
        if !self.receiving {
            return;
        }
        self.receiving = false;
        if let Some(f) = self.on_receive.as_mut() {
            f(&self.rx);
        }
    }
}
