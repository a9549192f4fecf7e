//! TOML scenario format.
//!
//! A scenario describes a window tree, the selections and passive grabs on
//! it, the devices, and an ordered list of steps. Each step is either a
//! hardware event or a client request.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use xitouch_core::TouchConfig;
use xitouch_engine::sim::{PassiveGrab, Rect, SimEnvironment};
use xitouch_engine::{
    ClientId, DeviceDescriptor, DeviceId, EngineError, EventFlags, EventMask, EventRecord, EventType, Grab, GrabKind,
    GrabMode, InputCore, InputLevel, Point, ResourceId, Selection, TouchId, TouchPhase, TouchVerdict, WindowId,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub root: RootSpec,
    #[serde(default)]
    pub windows: Vec<WindowSpec>,
    #[serde(default)]
    pub selections: Vec<SelectionSpec>,
    #[serde(default)]
    pub grabs: Vec<GrabSpec>,
    pub devices: Vec<DeviceDescriptor>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootSpec {
    pub id: WindowId,
    #[serde(default = "default_root_owner")]
    pub owner: ClientId,
    pub rect: Rect,
}

fn default_root_owner() -> ClientId {
    ClientId(0)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSpec {
    pub id: WindowId,
    pub parent: WindowId,
    pub owner: ClientId,
    pub rect: Rect,
}

fn default_level() -> InputLevel {
    InputLevel::Xi2
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionSpec {
    pub window: WindowId,
    pub client: ClientId,
    pub resource: ResourceId,
    #[serde(default = "default_level")]
    pub level: InputLevel,
    pub events: Vec<EventType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrabSpec {
    pub window: WindowId,
    pub client: ClientId,
    pub resource: ResourceId,
    #[serde(default = "default_level")]
    pub level: InputLevel,
    pub kind: GrabKind,
    #[serde(default = "default_mode")]
    pub mode: GrabMode,
    #[serde(default)]
    pub owner_events: bool,
    pub events: Vec<EventType>,
    pub device: Option<DeviceId>,
    pub detail: Option<u32>,
}

fn default_mode() -> GrabMode {
    GrabMode::Async
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Touch {
        device: DeviceId,
        phase: TouchPhase,
        touch: TouchId,
        at: Point,
        #[serde(default)]
        emulate: bool,
    },
    Resolve {
        device: DeviceId,
        touch: TouchId,
        resource: ResourceId,
        verdict: TouchVerdict,
    },
    DestroyWindow {
        window: WindowId,
    },
    ClientGone {
        client: ClientId,
    },
    RemoveDevice {
        device: DeviceId,
    },
}

impl Scenario {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scenario")
    }

    /// Builds the window tree and registers the devices.
    pub fn build(&self, touch: &TouchConfig) -> Result<InputCore<SimEnvironment>> {
        let mut env = SimEnvironment::new(self.root.id, self.root.owner, self.root.rect);
        for window in &self.windows {
            if !env.add_window(window.id, window.parent, window.owner, window.rect) {
                bail!("Window {} already exists or its parent {} is unknown", window.id, window.parent);
            }
        }
        for selection in &self.selections {
            env.select(
                selection.window,
                Selection {
                    client: selection.client,
                    resource: selection.resource,
                    level: selection.level,
                    mask: EventMask::from_types(&selection.events),
                },
            );
        }
        for grab in &self.grabs {
            env.add_passive_grab(PassiveGrab {
                grab: Grab {
                    resource: grab.resource,
                    client: grab.client,
                    window: grab.window,
                    level: grab.level,
                    kind: grab.kind,
                    owner_events: grab.owner_events,
                    mode: grab.mode,
                    event_mask: EventMask::from_types(&grab.events),
                },
                device: grab.device,
                detail: grab.detail,
            });
        }

        let mut core = InputCore::new(env, touch);
        for device in &self.devices {
            core.register_device(device.clone())
                .with_context(|| format!("Failed to register device {}", device.name))?;
        }
        Ok(core)
    }
}

impl Step {
    /// Applies the step. Protocol errors are returned as-is so the caller can
    /// report them the way a client would see them.
    pub fn apply(&self, core: &mut InputCore<SimEnvironment>) -> Result<(), EngineError> {
        match self {
            Step::Touch {
                device,
                phase,
                touch,
                at,
                emulate,
            } => {
                let mut event = EventRecord::touch(*device, *phase, *touch, *at);
                if *emulate {
                    event = event.with_flags(EventFlags::POINTER_EMULATED);
                }
                core.dispatch(event)
            }
            Step::Resolve {
                device,
                touch,
                resource,
                verdict,
            } => core.accept_or_reject_touch(*device, *touch, *resource, *verdict),
            Step::DestroyWindow { window } => {
                core.window_destroyed(*window);
                core.env_mut().destroy_window(*window);
                Ok(())
            }
            Step::ClientGone { client } => {
                core.env_mut().remove_client(*client);
                core.client_gone(*client);
                Ok(())
            }
            Step::RemoveDevice { device } => core.device_removed(*device),
        }
    }
}
