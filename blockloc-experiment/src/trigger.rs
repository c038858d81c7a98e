//! Scanner trigger sources.
//!
//! Each source blocks in `await_trigger` until the scanner signals the start
//! of acquisition. The core imposes no timeout; a source fails only when its
//! device does.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Stdin};
use std::time::Duration;

use blockloc_core::{ParadigmError, Result};
use blockloc_timing::precise_sleep;

use crate::config::TriggerConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub trait TriggerSource {
    fn await_trigger(&mut self) -> Result<()>;

    fn describe(&self) -> String;
}

impl<T: TriggerSource + ?Sized> TriggerSource for Box<T> {
    fn await_trigger(&mut self) -> Result<()> {
        (**self).await_trigger()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl TriggerConfig {
    /// Selects the trigger source once, at configuration time.
    pub fn build(&self) -> Result<Box<dyn TriggerSource>> {
        self.validate()?;
        Ok(match self {
            TriggerConfig::Key { value } => Box::new(KeyTrigger::stdin(value)),
            TriggerConfig::Parallel { address, pin } => {
                let address = address.as_deref().unwrap_or_default();
                Box::new(ParallelPortTrigger::new(address, *pin)?)
            }
            TriggerConfig::Serial { port, value, baud } => {
                let port = port.as_deref().unwrap_or_default();
                Box::new(SerialPortTrigger::new(port, value, *baud)?)
            }
        })
    }
}

/// Recognises a byte pattern in a byte stream.
#[derive(Debug, Clone)]
struct ByteMatcher {
    pattern: Vec<u8>,
    window: Vec<u8>,
}

impl ByteMatcher {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.as_bytes().to_vec(),
            window: Vec::with_capacity(pattern.len()),
        }
    }

    fn feed(&mut self, byte: u8) -> bool {
        if self.window.len() == self.pattern.len() {
            self.window.remove(0);
        }
        self.window.push(byte);
        self.window == self.pattern
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Trigger delivered as characters on an input stream, typically a button
/// box or scanner interface that emulates a keyboard.
///
/// When the input is a terminal it is switched to unbuffered, no-echo mode
/// for the wait, so a bare keystroke fires without Enter. Keys typed before
/// the wait began are discarded.
pub struct KeyTrigger<R> {
    input: R,
    matcher: ByteMatcher,
    value: String,
    terminal: Option<libc::c_int>,
}

#[cfg(unix)]
impl KeyTrigger<Stdin> {
    pub fn stdin(value: &str) -> Self {
        Self::from_terminal(io::stdin(), value)
    }
}

#[cfg(not(unix))]
impl KeyTrigger<Stdin> {
    pub fn stdin(value: &str) -> Self {
        Self::new(io::stdin(), value)
    }
}

impl<R: Read> KeyTrigger<R> {
    /// Reads `input` as is, with no terminal handling.
    pub fn new(input: R, value: &str) -> Self {
        Self {
            input,
            matcher: ByteMatcher::new(value),
            value: value.to_owned(),
            terminal: None,
        }
    }
}

#[cfg(unix)]
impl<R: Read + std::os::fd::AsRawFd> KeyTrigger<R> {
    /// Like [`KeyTrigger::new`], but puts `input` in keystroke mode while
    /// waiting if it is a terminal.
    pub fn from_terminal(input: R, value: &str) -> Self {
        let fd = input.as_raw_fd();
        let is_tty = unsafe { libc::isatty(fd) } == 1;
        Self {
            terminal: is_tty.then_some(fd),
            ..Self::new(input, value)
        }
    }
}

impl<R: Read> TriggerSource for KeyTrigger<R> {
    fn await_trigger(&mut self) -> Result<()> {
        tracing::info!("waiting for key press: {}", self.value);
        let _keystrokes = self
            .terminal
            .map(KeystrokeMode::enter)
            .transpose()
            .map_err(ParadigmError::TriggerWaitFailure)?;
        self.matcher.reset();
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => {
                    return Err(ParadigmError::TriggerWaitFailure(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "input closed before trigger",
                    )));
                }
                Ok(_) => {
                    if self.matcher.feed(byte[0]) {
                        tracing::info!("trigger received (key press)");
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ParadigmError::TriggerWaitFailure(e)),
            }
        }
    }

    fn describe(&self) -> String {
        format!("key {:?}", self.value)
    }
}

/// Terminal switched to per-keystroke, no-echo input. The previous settings
/// are restored on drop.
#[cfg(unix)]
struct KeystrokeMode {
    fd: libc::c_int,
    saved: libc::termios,
}

#[cfg(unix)]
impl KeystrokeMode {
    fn enter(fd: libc::c_int) -> io::Result<Self> {
        unsafe {
            let mut saved: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut saved) != 0 {
                return Err(io::Error::last_os_error());
            }
            let mut tio = saved;
            // ISIG stays on so Ctrl-C still reaches the abort handler.
            tio.c_lflag &= !(libc::ICANON | libc::ECHO);
            tio.c_cc[libc::VMIN] = 1;
            tio.c_cc[libc::VTIME] = 0;
            if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
                return Err(io::Error::last_os_error());
            }
            let mode = Self { fd, saved };
            if libc::tcflush(fd, libc::TCIFLUSH) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(mode)
        }
    }
}

#[cfg(unix)]
impl Drop for KeystrokeMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}

#[cfg(not(unix))]
struct KeystrokeMode;

#[cfg(not(unix))]
impl KeystrokeMode {
    fn enter(_fd: libc::c_int) -> io::Result<Self> {
        Ok(Self)
    }
}

/// Bit of the parallel port status register carrying `pin`.
///
/// Only the five status lines are inputs: 10 (nAck), 11 (Busy),
/// 12 (PaperOut), 13 (Select) and 15 (nError).
pub fn status_mask(pin: u8) -> Option<u8> {
    match pin {
        10 => Some(0x40),
        11 => Some(0x80),
        12 => Some(0x20),
        13 => Some(0x10),
        15 => Some(0x08),
        _ => None,
    }
}

/// Trigger on a parallel port status pin, read through the Linux `ppdev`
/// interface (`/dev/parportN`).
pub struct ParallelPortTrigger {
    address: String,
    mask: u8,
    pin: u8,
}

impl ParallelPortTrigger {
    pub fn new(address: &str, pin: u8) -> Result<Self> {
        if address.is_empty() {
            return Err(ParadigmError::invalid(
                "port address must be provided for parallel input",
            ));
        }
        let mask = status_mask(pin).ok_or_else(|| {
            ParadigmError::invalid(format!("parallel pin {pin} is not an input pin"))
        })?;
        Ok(Self {
            address: address.to_owned(),
            mask,
            pin,
        })
    }

    #[cfg(target_os = "linux")]
    fn poll_until_high(&self) -> io::Result<()> {
        use std::os::fd::AsRawFd;

        // ioctl request numbers from <linux/ppdev.h>.
        const PPCLAIM: u64 = 0x708b;
        const PPRELEASE: u64 = 0x708c;
        const PPRSTATUS: u64 = 0x8001_7081;

        let port: File = OpenOptions::new().read(true).write(true).open(&self.address)?;
        let fd = port.as_raw_fd();
        if unsafe { libc::ioctl(fd, PPCLAIM as _) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let result = loop {
            let mut status: u8 = 0;
            if unsafe { libc::ioctl(fd, PPRSTATUS as _, &mut status as *mut u8) } < 0 {
                break Err(io::Error::last_os_error());
            }
            if status & self.mask != 0 {
                break Ok(());
            }
            precise_sleep(POLL_INTERVAL);
        };
        unsafe {
            libc::ioctl(fd, PPRELEASE as _);
        }
        result
    }

    #[cfg(not(target_os = "linux"))]
    fn poll_until_high(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "parallel port triggers need the Linux ppdev driver",
        ))
    }
}

impl TriggerSource for ParallelPortTrigger {
    fn await_trigger(&mut self) -> Result<()> {
        tracing::info!("waiting for parallel port trigger at address {}...", self.address);
        self.poll_until_high()
            .map_err(ParadigmError::TriggerWaitFailure)?;
        tracing::info!("trigger received (parallel port)");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("parallel {} pin {}", self.address, self.pin)
    }
}

/// Trigger on a serial line. The port is opened raw with a one second read
/// timeout, and bytes are scanned for the trigger value.
pub struct SerialPortTrigger {
    port: String,
    baud: u32,
    matcher: ByteMatcher,
    value: String,
}

impl SerialPortTrigger {
    pub fn new(port: &str, value: &str, baud: u32) -> Result<Self> {
        if port.is_empty() {
            return Err(ParadigmError::invalid(
                "serial port must be provided for serial input",
            ));
        }
        if value.is_empty() {
            return Err(ParadigmError::invalid("serial trigger value must not be empty"));
        }
        baud_constant(baud)
            .ok_or_else(|| ParadigmError::invalid(format!("unsupported baud rate {baud}")))?;
        Ok(Self {
            port: port.to_owned(),
            baud,
            matcher: ByteMatcher::new(value),
            value: value.to_owned(),
        })
    }

    /// Opens the port without waiting for carrier detect and without making
    /// it the controlling terminal, then switches back to blocking reads
    /// and drops any bytes that arrived before the wait.
    #[cfg(unix)]
    fn open(&self) -> io::Result<File> {
        use std::os::fd::AsRawFd;
        use std::os::unix::fs::OpenOptionsExt;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.port)?;
        configure_raw(&file, self.baud)?;
        let fd = file.as_raw_fd();
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::tcflush(fd, libc::TCIFLUSH) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(file)
    }

    #[cfg(not(unix))]
    fn open(&self) -> io::Result<File> {
        let file = OpenOptions::new().read(true).open(&self.port)?;
        configure_raw(&file, self.baud)?;
        Ok(file)
    }
}

impl TriggerSource for SerialPortTrigger {
    fn await_trigger(&mut self) -> Result<()> {
        tracing::info!("waiting for serial port trigger on {}...", self.port);
        let mut port = self.open().map_err(ParadigmError::TriggerWaitFailure)?;
        self.matcher.reset();
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                // Read timed out with nothing pending.
                Ok(0) => precise_sleep(POLL_INTERVAL),
                Ok(_) => {
                    if self.matcher.feed(byte[0]) {
                        tracing::info!("trigger received (serial port)");
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ParadigmError::TriggerWaitFailure(e)),
            }
        }
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud, value {:?}", self.port, self.baud, self.value)
    }
}

#[cfg(unix)]
fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    })
}

#[cfg(not(unix))]
fn baud_constant(baud: u32) -> Option<u32> {
    Some(baud)
}

#[cfg(unix)]
fn configure_raw(file: &File, baud: u32) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let speed = baud_constant(baud)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unsupported baud rate"))?;
    let fd = file.as_raw_fd();
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 10;
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_raw(_file: &File, _baud: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "serial triggers are only supported on unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn key_trigger_returns_on_value() {
        let mut trigger = KeyTrigger::new(Cursor::new(b"1 2\n5rest".to_vec()), "5");
        trigger.await_trigger().unwrap();

        let mut rest = String::new();
        trigger.input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "rest");
    }

    #[test]
    fn key_trigger_matches_multibyte_values() {
        let mut trigger = KeyTrigger::new(Cursor::new(b"TTRIG".to_vec()), "TRIG");
        trigger.await_trigger().unwrap();
    }

    #[test]
    fn closed_input_is_a_trigger_failure() {
        let mut trigger = KeyTrigger::new(Cursor::new(b"1234".to_vec()), "5");
        let err = trigger.await_trigger().unwrap_err();
        assert!(matches!(err, ParadigmError::TriggerWaitFailure(_)));
    }

    #[test]
    fn parallel_trigger_needs_address_and_input_pin() {
        assert!(matches!(
            ParallelPortTrigger::new("", 10),
            Err(ParadigmError::InvalidConfiguration(_))
        ));
        assert!(ParallelPortTrigger::new("/dev/parport0", 2).is_err());
        assert_eq!(status_mask(10), Some(0x40));
        let trigger = ParallelPortTrigger::new("/dev/parport0", 10).unwrap();
        assert_eq!(trigger.describe(), "parallel /dev/parport0 pin 10");
    }

    #[test]
    fn serial_trigger_validates_settings() {
        assert!(SerialPortTrigger::new("", "5", 9600).is_err());
        assert!(SerialPortTrigger::new("/dev/ttyUSB0", "", 9600).is_err());
        assert!(SerialPortTrigger::new("/dev/ttyUSB0", "5", 9600).is_ok());
    }

    #[test]
    fn missing_serial_device_fails_the_wait() {
        let mut trigger = SerialPortTrigger::new("/nonexistent/blockloc-tty", "5", 9600).unwrap();
        assert!(matches!(
            trigger.await_trigger(),
            Err(ParadigmError::TriggerWaitFailure(_))
        ));
    }

    #[cfg(target_os = "linux")]
    mod pty {
        use super::*;
        use std::ffi::CStr;
        use std::io::Write;
        use std::os::fd::{AsRawFd, FromRawFd};
        use std::os::unix::fs::OpenOptionsExt;
        use std::path::PathBuf;
        use std::sync::mpsc;
        use std::thread;

        /// Master side of a fresh pseudo terminal and the path of its slave.
        fn open_pty() -> (File, PathBuf) {
            unsafe {
                let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
                assert!(fd >= 0, "posix_openpt: {}", io::Error::last_os_error());
                assert_eq!(libc::grantpt(fd), 0);
                assert_eq!(libc::unlockpt(fd), 0);
                let mut name = [0 as libc::c_char; 128];
                assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
                let path = CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned();
                (File::from_raw_fd(fd), PathBuf::from(path))
            }
        }

        fn open_slave(path: &PathBuf) -> File {
            OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NOCTTY)
                .open(path)
                .unwrap()
        }

        fn lflag(file: &File) -> libc::tcflag_t {
            unsafe {
                let mut tio: libc::termios = std::mem::zeroed();
                assert_eq!(libc::tcgetattr(file.as_raw_fd(), &mut tio), 0);
                tio.c_lflag
            }
        }

        /// Sends `key` the way a scanner does, once per interval with no
        /// newline, until the waiting thread reports back.
        fn pulse_until_done<T>(
            master: &mut File,
            key: &[u8],
            done: &mpsc::Receiver<T>,
        ) -> Option<T> {
            for _ in 0..40 {
                master.write_all(key).unwrap();
                if let Ok(value) = done.recv_timeout(Duration::from_millis(50)) {
                    return Some(value);
                }
            }
            None
        }

        #[test]
        fn terminal_key_fires_without_newline() {
            let (mut master, path) = open_pty();
            let slave = open_slave(&path);
            assert_ne!(lflag(&slave) & libc::ICANON, 0);

            let mut trigger = KeyTrigger::from_terminal(slave, "5");
            assert!(trigger.terminal.is_some());
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let result = trigger.await_trigger();
                tx.send((result.is_ok(), trigger)).unwrap();
            });

            let (fired, trigger) = pulse_until_done(&mut master, b"5", &rx)
                .expect("no trigger from a bare '5' keystroke");
            assert!(fired);
            // Line editing and echo are back once the wait is over.
            let restored = lflag(&trigger.input);
            assert_ne!(restored & libc::ICANON, 0);
            assert_ne!(restored & libc::ECHO, 0);
        }

        #[test]
        fn keys_typed_before_the_wait_are_discarded() {
            let (mut master, path) = open_pty();
            let slave = open_slave(&path);
            master.write_all(b"5").unwrap();
            thread::sleep(Duration::from_millis(100));

            let mut trigger = KeyTrigger::from_terminal(slave, "5");
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                tx.send(trigger.await_trigger().is_ok()).unwrap();
            });
            assert!(
                rx.recv_timeout(Duration::from_millis(300)).is_err(),
                "stale keystroke fired the trigger"
            );
            assert_eq!(pulse_until_done(&mut master, b"5", &rx), Some(true));
        }

        #[test]
        fn plain_files_are_not_terminals() {
            let file = File::open("/dev/null").unwrap();
            assert!(KeyTrigger::from_terminal(file, "5").terminal.is_none());
        }

        #[test]
        fn serial_port_opens_blocking_and_raw() {
            let (_master, path) = open_pty();
            let trigger = SerialPortTrigger::new(path.to_str().unwrap(), "5", 9600).unwrap();
            let port = trigger.open().unwrap();
            let fd = port.as_raw_fd();
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            assert_eq!(flags & libc::O_NONBLOCK, 0);
            assert_eq!(lflag(&port) & libc::ICANON, 0);
        }

        #[test]
        fn serial_trigger_fires_on_value() {
            let (mut master, path) = open_pty();
            let mut trigger = SerialPortTrigger::new(path.to_str().unwrap(), "5", 9600).unwrap();
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                tx.send(trigger.await_trigger().is_ok()).unwrap();
            });
            assert_eq!(pulse_until_done(&mut master, b"5", &rx), Some(true));
        }
    }

    #[test]
    fn config_selects_source_once() {
        let key = TriggerConfig::default().build().unwrap();
        assert_eq!(key.describe(), "key \"5\"");

        let missing = TriggerConfig::Serial {
            port: None,
            value: "5".into(),
            baud: 9600,
        };
        assert!(matches!(
            missing.build().err(),
            Some(ParadigmError::InvalidConfiguration(_))
        ));
    }
}
