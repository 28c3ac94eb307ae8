//! Runtime core of a trading platform's component substrate.
//!
//! Two tightly-coupled subsystems form the nervous system of the host
//! process:
//!
//! - **Dual-mode clock** ([`Clock`]): one abstraction over wall-clock time
//!   ([`LiveClock`]) and fully driveable virtual time ([`TestClock`]), with
//!   named cancellable timers and one-shot alerts producing [`TimeEvent`]s.
//! - **Message bus** ([`MessageBus`]): in-process point-to-point,
//!   request/response, and wildcard pub/sub routing with priority-ordered,
//!   deterministic delivery.
//!
//! The bus timestamps messages through a clock; timers deliver time events
//! which are frequently published back onto the bus. Both run on one
//! logical executor: `TestClock::advance_time` returns handler batches for
//! the caller to dispatch, which is what makes backtests reproducible.

pub mod bus;
pub mod clock;
pub mod error;
pub mod events;
pub mod ident;
pub mod live;
pub mod messages;
pub mod registry;
pub mod time;
pub mod topics;


pub use bus::{MessageBus, MessageBusConfig, MessageHandler, Request, Response, Subscription};
pub use clock::{Clock, TestClock};
pub use error::{BusError, ClockError, IdentError};
pub use events::{TimeEvent, TimeEventHandler, TimerCallback};
pub use ident::{ComponentId, Identifier, TraderId, UUID4};
pub use live::LiveClock;
pub use messages::{ComponentState, ComponentStateChanged, ShutdownSystem};
pub use registry::{
    deregister_component_clock, get_component_clocks, is_backtest_force_stop,
    register_component_clock, remove_instance_component_clocks, set_backtest_force_stop,
};
pub use time::UnixNanos;
