//! Virtual pointer device using evdev/uinput
//!
//! Creates a relative pointer with three buttons, a hi-res wheel and a
//! touch contact. It shows up to the desktop as an ordinary mouse.

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, Key, RelativeAxisType,
};
use tracing::debug;

use crate::cursor::{CursorTracker, ScreenBounds, WheelAccumulator};
use crate::sink::{PointerButton, PointerError, PointerSink};

/// Virtual pointer device
pub struct VirtualPointer {
    device: VirtualDevice,
    cursor: CursorTracker,
    wheel: WheelAccumulator,
    /// Current button states (for change detection)
    buttons: [bool; 3],
    touch: bool,
}

impl VirtualPointer {
    /// Create a new virtual pointer device
    ///
    /// # Arguments
    /// * `name` - Device name (shown in `evtest` and `libinput list-devices`)
    /// * `bounds` - Screen the cursor is clamped to
    pub fn new(name: &str, bounds: ScreenBounds) -> Result<Self, PointerError> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);
        keys.insert(Key::BTN_MIDDLE);
        keys.insert(Key::BTN_TOUCH);

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);
        axes.insert(RelativeAxisType::REL_WHEEL_HI_RES);

        let device = VirtualDeviceBuilder::new()
            .map_err(PointerError::CreateDevice)?
            .name(name)
            .with_keys(&keys)
            .map_err(PointerError::CreateDevice)?
            .with_relative_axes(&axes)
            .map_err(PointerError::CreateDevice)?
            .build()
            .map_err(PointerError::CreateDevice)?;

        debug!("Created virtual pointer '{}' ({}x{})", name, bounds.width, bounds.height);

        Ok(Self {
            device,
            cursor: CursorTracker::new(bounds),
            wheel: WheelAccumulator::default(),
            buttons: [false; 3],
            touch: false,
        })
    }

    /// Get the device path (e.g., /dev/input/eventX)
    pub fn device_path(&mut self) -> Option<std::path::PathBuf> {
        self.device
            .enumerate_dev_nodes_blocking()
            .ok()?
            .next()?
            .ok()
    }

    fn emit(&mut self, events: &[InputEvent]) -> Result<(), PointerError> {
        if events.is_empty() {
            return Ok(());
        }
        self.device.emit(events).map_err(PointerError::EmitEvent)
    }
}

impl PointerSink for VirtualPointer {
    fn move_pointer(&mut self, dx: f32, dy: f32) -> Result<(), PointerError> {
        let (step_x, step_y) = self.cursor.advance(dx, dy);

        let mut events = Vec::with_capacity(2);
        if step_x != 0 {
            events.push(rel_event(RelativeAxisType::REL_X, step_x));
        }
        if step_y != 0 {
            events.push(rel_event(RelativeAxisType::REL_Y, step_y));
        }
        self.emit(&events)
    }

    fn set_button(&mut self, button: PointerButton, pressed: bool) -> Result<(), PointerError> {
        // Only emit if changed
        if self.buttons[button.index()] == pressed {
            return Ok(());
        }
        self.buttons[button.index()] = pressed;
        self.emit(&[key_event(button_to_key(button), pressed)])
    }

    fn scroll(&mut self, amount: i32) -> Result<(), PointerError> {
        if amount == 0 {
            return Ok(());
        }
        let notches = self.wheel.add(amount);

        let mut events = vec![rel_event(RelativeAxisType::REL_WHEEL_HI_RES, amount)];
        if notches != 0 {
            events.push(rel_event(RelativeAxisType::REL_WHEEL, notches));
        }
        self.emit(&events)
    }

    fn set_touch(&mut self, pressed: bool) -> Result<(), PointerError> {
        if self.touch == pressed {
            return Ok(());
        }
        self.touch = pressed;
        self.emit(&[key_event(Key::BTN_TOUCH, pressed)])
    }
}

fn button_to_key(button: PointerButton) -> Key {
    match button {
        PointerButton::Left => Key::BTN_LEFT,
        PointerButton::Right => Key::BTN_RIGHT,
        PointerButton::Middle => Key::BTN_MIDDLE,
    }
}

fn rel_event(axis: RelativeAxisType, value: i32) -> InputEvent {
    InputEvent::new_now(EventType::RELATIVE, axis.0, value)
}

fn key_event(key: Key, pressed: bool) -> InputEvent {
    InputEvent::new_now(EventType::KEY, key.code(), i32::from(pressed))
}
