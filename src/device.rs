//! The uniform operation set every driver exposes, and the table the kernel
//! looks devices up in.
//!
//! Structures that cross into user space are `#[repr(C)]`. Errors leave this
//! layer either as a structured [`Error`] or, through the `isize` entry points
//! on [`DeviceEntry`], in the encoding existing callers expect (see
//! [`Error::as_return_code`]).

use crate::engine::{Action, EventFlags, TransferRequest};
use crate::error::{Error, Result};
use bitflags::bitflags;

/// Pins one attribute structure can name
pub const ATTR_PINS: usize = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinAssignment {
    pub port: u8,
    pub pin: u8,
}

impl PinAssignment {
    /// Marks an unused slot
    pub const NONE: PinAssignment = PinAssignment {
        port: 0xff,
        pin: 0xff,
    };

    pub const fn new(port: u8, pin: u8) -> Self {
        Self { port, pin }
    }

    pub const fn is_none(&self) -> bool {
        self.port == 0xff && self.pin == 0xff
    }
}

bitflags! {
    /// Which output channels an attribute update enables
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AttrFlags: u32 {
        const CHANNEL_0 = 1 << 0;
        const CHANNEL_1 = 1 << 1;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attr {
    pub o_flags: AttrFlags,
    pub pin_assignment: [PinAssignment; ATTR_PINS],
    pub freq: u32,
}

impl Attr {
    pub const fn new(freq: u32) -> Self {
        Self {
            o_flags: AttrFlags::empty(),
            pin_assignment: [PinAssignment::NONE; ATTR_PINS],
            freq,
        }
    }
}

/// Names a field of [`Attr`] in validation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrField {
    Flags,
    PinAssignment,
    Freq,
}

impl AttrField {
    /// Byte offset of the field inside [`Attr`]
    pub const fn offset(&self) -> usize {
        match self {
            AttrField::Flags => core::mem::offset_of!(Attr, o_flags),
            AttrField::PinAssignment => core::mem::offset_of!(Attr, pin_assignment),
            AttrField::Freq => core::mem::offset_of!(Attr, freq),
        }
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InfoFlags: u32 {
        const ASYNC_WRITE = 1 << 0;
        const ASYNC_READ = 1 << 1;
        /// Transfers are moved by a DMA channel
        const DMA = 1 << 2;
        /// `get`/`set` access the current sample directly
        const SAMPLE_ACCESS = 1 << 3;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Info {
    pub o_flags: InfoFlags,
    pub o_events: EventFlags,
    /// Bits per sample (or per character)
    pub resolution: u8,
    /// Maximum rate in Hz
    pub freq: u32,
}

/// Operations common to every peripheral driver. `port` selects the physical
/// instance and is checked by the driver.
pub trait Device: Sync {
    fn open(&self, port: usize) -> Result<()>;
    fn close(&self, port: usize) -> Result<()>;
    fn get_info(&self, port: usize) -> Result<Info>;
    fn set_attr(&self, port: usize, attr: &mut Attr) -> Result<()>;
    fn set_action(&self, port: usize, action: &Action) -> Result<()>;

    /// Starts an asynchronous write and returns the number of bytes accepted.
    fn write(&self, port: usize, request: &TransferRequest) -> Result<usize>;

    fn read(&self, _port: usize, _request: &TransferRequest) -> Result<usize> {
        Err(Error::Unsupported)
    }

    fn get(&self, _port: usize) -> Result<u32> {
        Err(Error::Unsupported)
    }

    fn set(&self, _port: usize, _value: u32) -> Result<()> {
        Err(Error::Unsupported)
    }
}

/// An ioctl request with its argument.
pub enum Request<'a> {
    GetInfo(&'a mut Info),
    SetAttr(&'a mut Attr),
    SetAction(Action),
    Get(&'a mut u32),
    Set(u32),
}

#[derive(Clone, Copy)]
pub struct DeviceEntry {
    pub name: &'static str,
    pub driver: &'static dyn Device,
    pub port: usize,
}

fn encode(result: Result<usize>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(err) => err.as_return_code(),
    }
}

impl DeviceEntry {
    pub const fn new(name: &'static str, driver: &'static dyn Device, port: usize) -> Self {
        Self { name, driver, port }
    }

    pub fn open(&self) -> isize {
        encode(self.driver.open(self.port).map(|()| 0))
    }

    pub fn close(&self) -> isize {
        encode(self.driver.close(self.port).map(|()| 0))
    }

    pub fn ioctl(&self, request: Request) -> isize {
        let result = match request {
            Request::GetInfo(info) => self.driver.get_info(self.port).map(|i| *info = i),
            Request::SetAttr(attr) => self.driver.set_attr(self.port, attr),
            Request::SetAction(action) => self.driver.set_action(self.port, &action),
            Request::Get(value) => self.driver.get(self.port).map(|v| *value = v),
            Request::Set(value) => self.driver.set(self.port, value),
        };
        encode(result.map(|()| 0))
    }

    pub fn write(&self, request: &TransferRequest) -> isize {
        encode(self.driver.write(self.port, request))
    }

    pub fn read(&self, request: &TransferRequest) -> isize {
        encode(self.driver.read(self.port, request))
    }
}

pub struct DeviceTable<const N: usize> {
    entries: heapless::Vec<DeviceEntry, N>,
}

impl<const N: usize> DeviceTable<N> {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    pub fn register(&mut self, entry: DeviceEntry) -> Result<()> {
        if self.entries.iter().any(|e| e.name == entry.name) {
            return Err(Error::InvalidArgument);
        }
        self.entries.push(entry).map_err(|_| Error::TableFull)?;
        log::info!("Registered device {} (port {})", entry.name, entry.port);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&DeviceEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or(Error::NoDevice)
    }
}

impl<const N: usize> Default for DeviceTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
