//! Framework Messages
//!
//! Concrete command/event shapes built on the identifier and time
//! primitives. These are illustrative of the message records the substrate
//! carries; payload-level semantics live with the components.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ident::{ComponentId, TraderId, UUID4};
use crate::time::UnixNanos;

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentState {
    PreInitialized,
    Ready,
    Starting,
    Running,
    Stopping,
    Stopped,
    Resuming,
    Degrading,
    Degraded,
    Faulting,
    Faulted,
    Disposing,
    Disposed,
}

impl ComponentState {
    /// The uppercase wire name of this state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreInitialized => "PRE_INITIALIZED",
            Self::Ready => "READY",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Resuming => "RESUMING",
            Self::Degrading => "DEGRADING",
            Self::Degraded => "DEGRADED",
            Self::Faulting => "FAULTING",
            Self::Faulted => "FAULTED",
            Self::Disposing => "DISPOSING",
            Self::Disposed => "DISPOSED",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRE_INITIALIZED" => Ok(Self::PreInitialized),
            "READY" => Ok(Self::Ready),
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "STOPPING" => Ok(Self::Stopping),
            "STOPPED" => Ok(Self::Stopped),
            "RESUMING" => Ok(Self::Resuming),
            "DEGRADING" => Ok(Self::Degrading),
            "DEGRADED" => Ok(Self::Degraded),
            "FAULTING" => Ok(Self::Faulting),
            "FAULTED" => Ok(Self::Faulted),
            "DISPOSING" => Ok(Self::Disposing),
            "DISPOSED" => Ok(Self::Disposed),
            other => Err(format!("unknown component state '{other}'")),
        }
    }
}

/// Command to shut down the system, attributed to the issuing component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSystem {
    /// The trader the command applies to.
    pub trader_id: TraderId,
    /// The component issuing the command.
    pub component_id: ComponentId,
    /// Optional operator-facing reason.
    pub reason: Option<String>,
    /// Unique command ID.
    pub command_id: UUID4,
    /// Creation time (Unix nanoseconds).
    pub ts_init: UnixNanos,
}

impl ShutdownSystem {
    pub fn new(
        trader_id: TraderId,
        component_id: ComponentId,
        reason: Option<String>,
        command_id: UUID4,
        ts_init: UnixNanos,
    ) -> Self {
        Self {
            trader_id,
            component_id,
            reason,
            command_id,
            ts_init,
        }
    }
}

impl fmt::Display for ShutdownSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ShutdownSystem(trader_id={}, component_id={}, reason={}, command_id={})",
            self.trader_id,
            self.component_id,
            self.reason.as_deref().unwrap_or("None"),
            self.command_id,
        )
    }
}

/// Event recording a component lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStateChanged {
    /// The trader the component belongs to.
    pub trader_id: TraderId,
    /// The component that transitioned.
    pub component_id: ComponentId,
    /// The component's type name.
    pub component_type: String,
    /// The state entered.
    pub state: ComponentState,
    /// Component configuration at transition time.
    pub config: HashMap<String, serde_json::Value>,
    /// Unique event ID.
    pub event_id: UUID4,
    /// When the transition occurred (Unix nanoseconds).
    pub ts_event: UnixNanos,
    /// When this record was created (Unix nanoseconds).
    pub ts_init: UnixNanos,
}

impl ComponentStateChanged {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trader_id: TraderId,
        component_id: ComponentId,
        component_type: impl Into<String>,
        state: ComponentState,
        config: HashMap<String, serde_json::Value>,
        event_id: UUID4,
        ts_event: UnixNanos,
        ts_init: UnixNanos,
    ) -> Self {
        Self {
            trader_id,
            component_id,
            component_type: component_type.into(),
            state,
            config,
            event_id,
            ts_event,
            ts_init,
        }
    }
}

impl fmt::Display for ComponentStateChanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentStateChanged(trader_id={}, component_id={}, component_type={}, state={}, event_id={})",
            self.trader_id, self.component_id, self.component_type, self.state, self.event_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_state_wire_names() {
        assert_eq!(ComponentState::PreInitialized.to_string(), "PRE_INITIALIZED");
        assert_eq!(ComponentState::Running.to_string(), "RUNNING");
        assert_eq!(ComponentState::Disposed.to_string(), "DISPOSED");
        assert_eq!(
            serde_json::to_string(&ComponentState::PreInitialized).unwrap(),
            "\"PRE_INITIALIZED\""
        );
        assert_eq!(
            "DEGRADING".parse::<ComponentState>().unwrap(),
            ComponentState::Degrading
        );
        assert!("degrading".parse::<ComponentState>().is_err());
    }

    #[test]
    fn test_shutdown_system_roundtrip() {
        let cmd = ShutdownSystem::new(
            TraderId::new("TESTER-001").unwrap(),
            ComponentId::new("RiskEngine").unwrap(),
            Some("margin breach".to_string()),
            UUID4::new(),
            42,
        );
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ShutdownSystem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_component_state_changed_roundtrip() {
        let mut config = HashMap::new();
        config.insert("max_orders".to_string(), serde_json::json!(100));

        let event = ComponentStateChanged::new(
            TraderId::new("TESTER-001").unwrap(),
            ComponentId::new("DataEngine").unwrap(),
            "DataEngine",
            ComponentState::Running,
            config,
            UUID4::new(),
            1_000,
            2_000,
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ComponentStateChanged = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.state, ComponentState::Running);
    }
}
