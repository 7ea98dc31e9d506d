//! Virtual keyboard injection via uinput

use std::sync::Mutex;

use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, EventType, InputEvent, Key};

use crate::keys::KeyId;

use super::{InjectError, KeyInjector};

/// Key-level output of a keyboard device
pub trait KeyEmitter: Send {
    fn press_key(&mut self, key: Key) -> Result<(), InjectError>;

    fn release_key(&mut self, key: Key) -> Result<(), InjectError>;
}

/// A virtual input device for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    /// Create a new virtual keyboard device
    pub fn new_keyboard(name: &str) -> Result<Self, InjectError> {
        let mut keys = AttributeSet::<Key>::new();

        // Add all standard keys
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .build()?;

        Ok(Self { device })
    }

    /// Emit input events
    pub fn emit(&mut self, events: &[InputEvent]) -> Result<(), InjectError> {
        self.device.emit(events)?;
        Ok(())
    }
}

impl KeyEmitter for VirtualDevice {
    fn press_key(&mut self, key: Key) -> Result<(), InjectError> {
        self.emit(&[key_event(key, 1), syn()])
    }

    fn release_key(&mut self, key: Key) -> Result<(), InjectError> {
        self.emit(&[key_event(key, 0), syn()])
    }
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

fn syn() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)
}

/// [`KeyInjector`] backed by a uinput virtual keyboard.
///
/// Literal characters are typed on a US layout: shifted symbols such as `"`
/// press Shift around the base key. Characters with no key on that layout
/// fail with [`InjectError::Unsupported`] before anything is emitted.
///
/// Each call leaves the device as it found it on failure: if the base key of
/// a shifted character cannot be pressed, Shift is released again.
pub struct UinputInjector<D = VirtualDevice> {
    device: Mutex<D>,
}

impl UinputInjector<VirtualDevice> {
    pub fn new(name: &str) -> Result<Self, InjectError> {
        Ok(Self::with_emitter(VirtualDevice::new_keyboard(name)?))
    }
}

impl<D: KeyEmitter> UinputInjector<D> {
    /// Drive an already-open device
    pub fn with_emitter(device: D) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&mut D) -> Result<T, InjectError>,
    ) -> Result<T, InjectError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| InjectError::Backend("virtual keyboard lock poisoned".to_string()))?;
        f(&mut device)
    }

    fn physical(&self, key: KeyId) -> Result<(Key, bool), InjectError> {
        match key {
            KeyId::Named(key) => Ok((key, false)),
            KeyId::Char(c) => char_to_key(c).ok_or(InjectError::Unsupported {
                backend: "uinput",
                key,
            }),
        }
    }
}

impl<D: KeyEmitter> KeyInjector for UinputInjector<D> {
    fn name(&self) -> &'static str {
        "uinput"
    }

    fn press(&self, key: KeyId) -> Result<(), InjectError> {
        let (code, shifted) = self.physical(key)?;
        self.with_device(|vd| {
            if !shifted {
                return vd.press_key(code);
            }

            vd.press_key(Key::KEY_LEFTSHIFT)?;
            if let Err(e) = vd.press_key(code) {
                // The caller never sees this key as held, so Shift must not stay down
                if let Err(release) = vd.release_key(Key::KEY_LEFTSHIFT) {
                    tracing::warn!(%key, "Shift release after failed press failed: {}", release);
                }
                return Err(e);
            }
            Ok(())
        })
    }

    fn release(&self, key: KeyId) -> Result<(), InjectError> {
        let (code, shifted) = self.physical(key)?;
        self.with_device(|vd| {
            let released = vd.release_key(code);
            // Shift goes up even if the base key failed, so it is never left held
            if shifted {
                vd.release_key(Key::KEY_LEFTSHIFT)?;
            }
            released
        })
    }
}


/// Physical key and whether Shift is needed, on a US layout
pub fn char_to_key(c: char) -> Option<(Key, bool)> {
    let plain = |key| Some((key, false));
    let shifted = |key| Some((key, true));

    match c {
        'a' => plain(Key::KEY_A),
        'b' => plain(Key::KEY_B),
        'c' => plain(Key::KEY_C),
        'd' => plain(Key::KEY_D),
        'e' => plain(Key::KEY_E),
        'f' => plain(Key::KEY_F),
        'g' => plain(Key::KEY_G),
        'h' => plain(Key::KEY_H),
        'i' => plain(Key::KEY_I),
        'j' => plain(Key::KEY_J),
        'k' => plain(Key::KEY_K),
        'l' => plain(Key::KEY_L),
        'm' => plain(Key::KEY_M),
        'n' => plain(Key::KEY_N),
        'o' => plain(Key::KEY_O),
        'p' => plain(Key::KEY_P),
        'q' => plain(Key::KEY_Q),
        'r' => plain(Key::KEY_R),
        's' => plain(Key::KEY_S),
        't' => plain(Key::KEY_T),
        'u' => plain(Key::KEY_U),
        'v' => plain(Key::KEY_V),
        'w' => plain(Key::KEY_W),
        'x' => plain(Key::KEY_X),
        'y' => plain(Key::KEY_Y),
        'z' => plain(Key::KEY_Z),

        '0' => plain(Key::KEY_0),
        '1' => plain(Key::KEY_1),
        '2' => plain(Key::KEY_2),
        '3' => plain(Key::KEY_3),
        '4' => plain(Key::KEY_4),
        '5' => plain(Key::KEY_5),
        '6' => plain(Key::KEY_6),
        '7' => plain(Key::KEY_7),
        '8' => plain(Key::KEY_8),
        '9' => plain(Key::KEY_9),

        '-' => plain(Key::KEY_MINUS),
        '=' => plain(Key::KEY_EQUAL),
        '[' => plain(Key::KEY_LEFTBRACE),
        ']' => plain(Key::KEY_RIGHTBRACE),
        ';' => plain(Key::KEY_SEMICOLON),
        '\'' => plain(Key::KEY_APOSTROPHE),
        '`' => plain(Key::KEY_GRAVE),
        '\\' => plain(Key::KEY_BACKSLASH),
        ',' => plain(Key::KEY_COMMA),
        '.' => plain(Key::KEY_DOT),
        '/' => plain(Key::KEY_SLASH),
        ' ' => plain(Key::KEY_SPACE),

        '!' => shifted(Key::KEY_1),
        '@' => shifted(Key::KEY_2),
        '#' => shifted(Key::KEY_3),
        '$' => shifted(Key::KEY_4),
        '%' => shifted(Key::KEY_5),
        '^' => shifted(Key::KEY_6),
        '&' => shifted(Key::KEY_7),
        '*' => shifted(Key::KEY_8),
        '(' => shifted(Key::KEY_9),
        ')' => shifted(Key::KEY_0),
        '_' => shifted(Key::KEY_MINUS),
        '+' => shifted(Key::KEY_EQUAL),
        '{' => shifted(Key::KEY_LEFTBRACE),
        '}' => shifted(Key::KEY_RIGHTBRACE),
        ':' => shifted(Key::KEY_SEMICOLON),
        '"' => shifted(Key::KEY_APOSTROPHE),
        '~' => shifted(Key::KEY_GRAVE),
        '|' => shifted(Key::KEY_BACKSLASH),
        '<' => shifted(Key::KEY_COMMA),
        '>' => shifted(Key::KEY_DOT),
        '?' => shifted(Key::KEY_SLASH),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingClock;
    use crate::combo::{ComboError, ComboExecutor};
    use std::sync::Arc;
    use std::time::Duration;

    /// (key, pressed) as seen by the device, including failed emits
    type DeviceLog = Arc<Mutex<Vec<(Key, bool)>>>;

    /// In-memory device that fails chosen presses
    struct ScriptedDevice {
        log: DeviceLog,
        failing_presses: Vec<Key>,
    }

    impl ScriptedDevice {
        fn new(failing_presses: &[Key]) -> (Self, DeviceLog) {
            let log = DeviceLog::default();
            let device = Self {
                log: log.clone(),
                failing_presses: failing_presses.to_vec(),
            };
            (device, log)
        }
    }

    impl KeyEmitter for ScriptedDevice {
        fn press_key(&mut self, key: Key) -> Result<(), InjectError> {
            self.log.lock().unwrap().push((key, true));
            if self.failing_presses.contains(&key) {
                return Err(InjectError::Backend(format!("write of {:?} failed", key)));
            }
            Ok(())
        }

        fn release_key(&mut self, key: Key) -> Result<(), InjectError> {
            self.log.lock().unwrap().push((key, false));
            Ok(())
        }
    }

    #[test]
    fn test_shifted_char_wraps_base_key_in_shift() {
        let (device, log) = ScriptedDevice::new(&[]);
        let injector = UinputInjector::with_emitter(device);

        injector.press(KeyId::Char('"')).unwrap();
        injector.release(KeyId::Char('"')).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Key::KEY_LEFTSHIFT, true),
                (Key::KEY_APOSTROPHE, true),
                (Key::KEY_APOSTROPHE, false),
                (Key::KEY_LEFTSHIFT, false),
            ]
        );
    }

    #[test]
    fn test_failed_shifted_press_releases_shift() {
        let (device, log) = ScriptedDevice::new(&[Key::KEY_APOSTROPHE]);
        let injector = UinputInjector::with_emitter(device);

        let result = injector.press(KeyId::Char('"'));

        assert!(matches!(result, Err(InjectError::Backend(_))));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Key::KEY_LEFTSHIFT, true),
                (Key::KEY_APOSTROPHE, true),
                (Key::KEY_LEFTSHIFT, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_combo_leaves_no_key_down() {
        let (device, log) = ScriptedDevice::new(&[Key::KEY_APOSTROPHE]);
        let injector = Arc::new(UinputInjector::with_emitter(device));
        let executor = ComboExecutor::new(
            injector,
            Arc::new(RecordingClock::new()),
            Duration::from_millis(10),
        );

        let err = executor.execute("lctrl+\"").await.unwrap_err();
        assert!(matches!(err, ComboError::Press { .. }));

        // Every key that went down came back up
        let mut down: Vec<Key> = Vec::new();
        for (key, pressed) in log.lock().unwrap().iter() {
            if *pressed {
                down.push(*key);
            } else {
                down.retain(|k| k != key);
            }
        }
        // The failed apostrophe press never reached the device
        down.retain(|k| *k != Key::KEY_APOSTROPHE);
        assert!(down.is_empty(), "still held: {:?}", down);
    }

    #[test]
    fn test_letters_and_digits_are_unshifted() {
        assert_eq!(char_to_key('w'), Some((Key::KEY_W, false)));
        assert_eq!(char_to_key('7'), Some((Key::KEY_7, false)));
    }

    #[test]
    fn test_shifted_symbols() {
        assert_eq!(char_to_key('"'), Some((Key::KEY_APOSTROPHE, true)));
        assert_eq!(char_to_key('+'), Some((Key::KEY_EQUAL, true)));
        assert_eq!(char_to_key('?'), Some((Key::KEY_SLASH, true)));
    }

    #[test]
    fn test_unmapped_characters() {
        assert_eq!(char_to_key('é'), None);
        assert_eq!(char_to_key('€'), None);
        // The resolver lowercases, so uppercase never reaches the backend
        assert_eq!(char_to_key('A'), None);
    }

    /// Requires write access to /dev/uinput; skipped otherwise.
    #[test]
    fn test_uinput_injector_rejects_unmapped_char() {
        let injector = match UinputInjector::new("sim-deck-test-unmapped") {
            Ok(injector) => injector,
            Err(e) => {
                eprintln!("Skipping test_uinput_injector_rejects_unmapped_char: {}", e);
                return;
            }
        };

        let result = injector.press(KeyId::Char('é'));
        assert!(matches!(result, Err(InjectError::Unsupported { .. })));
    }

    /// Requires write access to /dev/uinput; skipped otherwise.
    #[test]
    fn test_uinput_injector_press_release() {
        let injector = match UinputInjector::new("sim-deck-test-press") {
            Ok(injector) => injector,
            Err(e) => {
                eprintln!("Skipping test_uinput_injector_press_release: {}", e);
                return;
            }
        };

        // F24 is unlikely to be bound to anything on the test machine
        let key = KeyId::Named(Key::KEY_F24);
        assert!(injector.press(key).is_ok());
        assert!(injector.release(key).is_ok());
    }
}
