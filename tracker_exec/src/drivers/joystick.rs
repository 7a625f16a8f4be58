//! [`InputDevice`] implementation for the Linux joystick API
//!
//! The device node (`/dev/input/jsN`) produces fixed size 8 byte events. A reader thread blocks on
//! the device and forwards decoded events over a channel, so reads from the handle can time out.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{LittleEndian, ReadBytesExt};
use eqpt_if::{
    device::{DeviceHandle, DeviceOpener, OpenError},
    input::{InputDevice, InputEvent, ReadError}
};
use log::{debug, trace};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Size of one joystick event.
pub const EVENT_SIZE: usize = 8;

/// Event type of a button change.
const JS_EVENT_BUTTON: u8 = 0x01;

/// Event type of an axis change.
const JS_EVENT_AXIS: u8 = 0x02;

/// Flag set on the synthetic events reporting the initial state of the device.
const JS_EVENT_INIT: u8 = 0x80;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Opener for a joystick device node.
#[derive(Debug, Clone)]
pub struct JoystickOpener {
    path: PathBuf,
    name: String,
}

/// An open joystick.
pub struct Joystick {
    rx: Option<Receiver<Result<InputEvent, ReadError>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JoystickOpener {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = format!("joystick {}", path.display());

        Self {
            path,
            name
        }
    }
}

impl DeviceOpener for JoystickOpener {
    type Handle = Joystick;

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Self::Handle, OpenError> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(self.path.display().to_string()),
            _ => OpenError::Io(self.path.display().to_string(), e)
        })?;

        Joystick::from_reader(file)
            .map_err(|e| OpenError::Io(self.path.display().to_string(), e))
    }
}

impl Joystick {
    /// Start reading events from `reader` on a background thread.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("joystick_reader".into())
            .spawn(move || reader_thread(reader, tx))?;

        Ok(Self {
            rx: Some(rx)
        })
    }
}

impl DeviceHandle for Joystick {
    fn close(&mut self) {
        // Dropping the receiver stops the reader thread on its next event
        self.rx = None;
    }
}

impl InputDevice for Joystick {
    fn read_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>, ReadError> {
        let rx = match self.rx {
            Some(ref rx) => rx,
            None => return Err(ReadError::Disconnected)
        };

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ReadError::Disconnected)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode a single raw joystick event.
///
/// Returns `Ok(None)` for the initial state events sent when the device is opened.
pub fn decode_event(mut buf: &[u8]) -> Result<Option<InputEvent>, ReadError> {
    if buf.len() != EVENT_SIZE {
        return Err(ReadError::Malformed(format!("event of {} bytes", buf.len())))
    }

    // Event timestamp, unused
    let _time_ms = buf.read_u32::<LittleEndian>().map_err(ReadError::Io)?;
    let value = buf.read_i16::<LittleEndian>().map_err(ReadError::Io)?;
    let event_type = buf.read_u8().map_err(ReadError::Io)?;
    let number = buf.read_u8().map_err(ReadError::Io)?;

    if event_type & JS_EVENT_INIT != 0 {
        return Ok(None)
    }

    match event_type {
        JS_EVENT_BUTTON => Ok(Some(InputEvent::Button {
            number,
            pressed: value != 0
        })),
        JS_EVENT_AXIS => Ok(Some(InputEvent::Axis {
            number,
            value
        })),
        t => Err(ReadError::Malformed(format!("unknown event type {:#04x}", t)))
    }
}

/// Background thread, reads raw events until the device or the channel closes.
fn reader_thread<R: Read>(mut reader: R, tx: Sender<Result<InputEvent, ReadError>>) {
    let mut buf = [0u8; EVENT_SIZE];

    loop {
        let result = match reader.read_exact(&mut buf) {
            Ok(()) => match decode_event(&buf) {
                Ok(Some(e)) => Ok(e),
                Ok(None) => continue,
                Err(e) => Err(e)
            },
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Joystick reached end of stream");
                break
            },
            Err(e) => {
                // Report the failure then stop, the handle will be reopened
                tx.send(Err(ReadError::Io(e))).ok();
                break
            }
        };

        trace!("Joystick event: {:?}", result);

        if tx.send(result).is_err() {
            break
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn raw(time: u32, value: i16, event_type: u8, number: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(time).unwrap();
        buf.write_i16::<LittleEndian>(value).unwrap();
        buf.write_u8(event_type).unwrap();
        buf.write_u8(number).unwrap();
        buf
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            decode_event(&raw(1000, 1, JS_EVENT_BUTTON, 3)).unwrap(),
            Some(InputEvent::Button { number: 3, pressed: true })
        );
        assert_eq!(
            decode_event(&raw(1000, 0, JS_EVENT_BUTTON, 3)).unwrap(),
            Some(InputEvent::Button { number: 3, pressed: false })
        );
        assert_eq!(
            decode_event(&raw(1000, -32767, JS_EVENT_AXIS, 1)).unwrap(),
            Some(InputEvent::Axis { number: 1, value: -32767 })
        );

        // Initial state events are skipped
        assert_eq!(decode_event(&raw(0, 1, JS_EVENT_BUTTON | JS_EVENT_INIT, 0)).unwrap(), None);

        assert!(matches!(decode_event(&raw(0, 0, 0x04, 0)), Err(ReadError::Malformed(_))));
        assert!(matches!(decode_event(&[0u8; 5]), Err(ReadError::Malformed(_))));
    }

    #[test]
    fn test_joystick_reads_stream() {
        let mut stream = raw(0, 1, JS_EVENT_BUTTON | JS_EVENT_INIT, 0);
        stream.extend(raw(10, 1, JS_EVENT_BUTTON, 2));
        stream.extend(raw(20, 500, JS_EVENT_AXIS, 0));

        let mut js = Joystick::from_reader(Cursor::new(stream)).unwrap();
        let timeout = Duration::from_secs(1);

        assert_eq!(
            js.read_event(timeout).unwrap(),
            Some(InputEvent::Button { number: 2, pressed: true })
        );
        assert_eq!(
            js.read_event(timeout).unwrap(),
            Some(InputEvent::Axis { number: 0, value: 500 })
        );

        // End of stream closes the channel
        assert!(matches!(js.read_event(timeout), Err(ReadError::Disconnected)));

        js.close();
        assert!(matches!(js.read_event(timeout), Err(ReadError::Disconnected)));
    }

    #[test]
    fn test_missing_device() {
        let mut opener = JoystickOpener::new("/dev/input/does_not_exist");
        assert!(matches!(opener.open(), Err(OpenError::NotFound(_))));
    }
}
