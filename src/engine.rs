//! The asynchronous transfer engine shared by every interrupt-driven driver.
//!
//! A driver owns a [`PortTable`] with one [`PortState`] per physical port and
//! implements [`TransferBackend`] for its hardware. Foreground operations
//! (power, attributes, action registration, submission) and the interrupt
//! path ([`PortTable::complete`]) are all methods on the table:
//!
//! ```text
//!  acquire ──> configure ──> set_action ──> submit ──┐
//!                                                    │ arm first page
//!                                   terminal count   ▼
//!               handler(WRITE_COMPLETE) <── complete ─┘ (repeat per page)
//! ```
//!
//! Concurrency contract: foreground code masks the port's interrupt source
//! and then takes the port's spin lock; the interrupt path only takes the
//! spin lock. Completion handlers always run with the spin lock released.

pub mod action;
pub mod attr;
pub mod dispatch;
pub mod port;
pub mod power;
pub mod transfer;

pub use action::{
    Action, AddressSpaceValidator, CallbackValidator, Event, EventFlags, EventHandler, Handler,
    Privilege,
};
pub use attr::{configure, Applied, ClockLimits, Peripheral, PeripheralClock, PinMux};
pub use port::{PortState, PortTable};
pub use transfer::{Direction, TransferBackend, TransferPage, TransferRequest};
