//! Serial link abstraction shared by both peripheral drivers.

use crate::error::Result;

/// Non-blocking byte pipe to a peripheral.
///
/// Reads may return any number of bytes: a fraction of a logical message,
/// exactly one, or several back to back. Drivers built on this trait must
/// reassemble their own framing and never assume chunk boundaries mean
/// anything.
///
/// None of the methods block. A driver polls [`bytes_available`] or simply
/// calls [`read_available`] in a loop with a short sleep between polls.
///
/// # Examples
///
/// ```
/// use bopbox_hardware::SerialLink;
/// use bopbox_hardware::error::Result;
///
/// fn drain<L: SerialLink>(link: &mut L) -> Result<Vec<u8>> {
///     let mut out = Vec::new();
///     while link.bytes_available()? > 0 {
///         out.extend(link.read_available()?);
///     }
///     Ok(out)
/// }
/// ```
///
/// [`bytes_available`]: SerialLink::bytes_available
/// [`read_available`]: SerialLink::read_available
pub trait SerialLink: Send {
    /// Queue bytes for transmission and return how many were accepted.
    ///
    /// A short count is not retried here; callers decide whether a partial
    /// write is fatal.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Return every byte currently buffered, possibly none.
    fn read_available(&mut self) -> Result<Vec<u8>>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        (**self).read_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerialLink;

    #[test]
    fn test_trait_object_write_read() {
        let (link, handle) = MockSerialLink::new();
        let mut link: Box<dyn SerialLink> = Box::new(link);

        handle.push_rx(b"OK\r\n");
        assert_eq!(link.write(b"AT\r\n").unwrap(), 4);
        assert_eq!(link.bytes_available().unwrap(), 4);
        assert_eq!(link.read_available().unwrap(), b"OK\r\n".to_vec());
        assert_eq!(handle.written(), vec![b"AT\r\n".to_vec()]);
    }
}
