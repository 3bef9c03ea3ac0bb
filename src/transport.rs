//! External collaborators of the peripheral models
//!
//! The LPUART is connected to a [CharBackend] (a terminal, a socket, a test harness) and the
//! LPSPI to a [SpiPeer] (the device on the other end of the bus). The devices only hold shared
//! references to them and never own their lifecycle.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::Mutex;

// ————————————————————————————— Character Backend —————————————————————————— //

/// A byte-stream transport.
///
/// Bytes flowing to the device are delivered by the owner of the backend through
/// `VirtLpuart::receive`, which is the receive callback of the transport.
pub trait CharBackend: Sync + Send {
    /// Whether the backend can take a new byte right now.
    fn can_accept(&self) -> bool {
        true
    }

    /// Sends a byte to the outside world.
    fn send(&self, byte: u8);
}

/// A backend that drops everything.
#[derive(Debug, Default)]
pub struct NullBackend;

impl CharBackend for NullBackend {
    fn send(&self, _byte: u8) {}
}

/// A backend recording the transmitted bytes into a fixed-size buffer.
///
/// Bytes sent once the buffer is full are dropped. The backend can be told to stop accepting
/// bytes to exercise the flow control of the device.
#[derive(Debug)]
pub struct CaptureBackend<const N: usize> {
    buffer: Mutex<CaptureBuffer<N>>,
    accepting: AtomicBool,
}

#[derive(Debug)]
struct CaptureBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> CaptureBackend<N> {
    pub const fn new() -> Self {
        CaptureBackend {
            buffer: Mutex::new(CaptureBuffer {
                bytes: [0; N],
                len: 0,
            }),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Calls `f` with the bytes captured so far.
    pub fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        let buffer = self.buffer.lock();
        f(&buffer.bytes[..buffer.len])
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buffer.lock().len = 0;
    }
}

impl<const N: usize> Default for CaptureBackend<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CharBackend for CaptureBackend<N> {
    fn can_accept(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn send(&self, byte: u8) {
        let mut buffer = self.buffer.lock();
        if buffer.len < N {
            let len = buffer.len;
            buffer.bytes[len] = byte;
            buffer.len += 1;
        } else {
            log::debug!("Capture backend full, dropping 0x{:02x}", byte);
        }
    }
}

// ———————————————————————————————— SPI Peers ——————————————————————————————— //

/// The device on the other side of an SPI bus.
pub trait SpiPeer: Sync + Send {
    /// Shifts `word` out to the peer and returns the word simultaneously shifted in.
    fn exchange(&self, word: u32) -> u32;
}

/// Connects SDO to SDI: every word comes back unchanged.
#[derive(Debug, Default)]
pub struct LoopbackPeer;

impl SpiPeer for LoopbackPeer {
    fn exchange(&self, word: u32) -> u32 {
        word
    }
}

/// A peer behaving like a one-word shift register: each exchange returns the word received
/// during the previous one, starting from 0.
#[derive(Debug, Default)]
pub struct ShiftRegisterPeer {
    last: AtomicU32,
}

impl ShiftRegisterPeer {
    pub const fn new() -> Self {
        ShiftRegisterPeer {
            last: AtomicU32::new(0),
        }
    }
}

impl SpiPeer for ShiftRegisterPeer {
    fn exchange(&self, word: u32) -> u32 {
        self.last.swap(word, Ordering::SeqCst)
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture() {
        let backend: CaptureBackend<4> = CaptureBackend::new();
        assert!(backend.can_accept());
        for byte in b"hello" {
            backend.send(*byte);
        }
        assert_eq!(backend.len(), 4);
        backend.with_bytes(|bytes| assert_eq!(bytes, b"hell"));

        backend.clear();
        assert!(backend.is_empty());
        backend.set_accepting(false);
        assert!(!backend.can_accept());
    }

    #[test]
    fn peers() {
        assert_eq!(LoopbackPeer.exchange(0xAA), 0xAA);

        let peer = ShiftRegisterPeer::new();
        assert_eq!(peer.exchange(0xAA), 0);
        assert_eq!(peer.exchange(0x55), 0xAA);
        assert_eq!(peer.exchange(0x12), 0x55);
    }
}
