//! Positioned reads and writes of on-disk records over a seekable stream.
//!
//! Every helper reports failures with the absolute offset it was working at,
//! so a short read deep inside a fat slice can be traced back to the byte.

use std::io::{Read, Seek, SeekFrom, Write};

use zerocopy::{FromZeros, IntoBytes};

use crate::error::{Error, Result};
use crate::macho::Record;

/// Returns the current stream position.
#[inline]
pub fn position<S: Seek>(stream: &mut S, what: &'static str) -> Result<u64> {
    stream.stream_position().map_err(|e| Error::read(what, 0, e))
}

/// Moves the stream to an absolute offset.
#[inline]
pub fn seek_to<S: Seek>(stream: &mut S, offset: u64, what: &'static str) -> Result<()> {
    stream
        .seek(SeekFrom::Start(offset))
        .map(|_| ())
        .map_err(|e| Error::read(what, offset, e))
}

/// Reads one record at the current position, byte-swapping it if requested.
pub fn read_record<T, S>(stream: &mut S, swap: bool, what: &'static str) -> Result<T>
where
    T: Record,
    S: Read + Seek,
{
    let offset = position(stream, what)?;
    let mut record = T::new_zeroed();
    stream
        .read_exact(record.as_mut_bytes())
        .map_err(|e| Error::read(what, offset, e))?;
    if swap {
        record.swap_bytes();
    }
    Ok(record)
}

/// Reads one record without consuming it.
pub fn peek_record<T, S>(stream: &mut S, swap: bool, what: &'static str) -> Result<T>
where
    T: Record,
    S: Read + Seek,
{
    let offset = position(stream, what)?;
    let record = read_record(stream, swap, what)?;
    seek_to(stream, offset, what)?;
    Ok(record)
}

/// Reads the 4-byte magic at the current position in host order, without
/// consuming it.
pub fn peek_magic<S: Read + Seek>(stream: &mut S) -> Result<(u32, u64)> {
    let offset = position(stream, "magic")?;
    let mut bytes = [0u8; 4];
    stream
        .read_exact(&mut bytes)
        .map_err(|e| Error::read("magic", offset, e))?;
    seek_to(stream, offset, "magic")?;
    Ok((u32::from_ne_bytes(bytes), offset))
}

/// Reads exactly `len` bytes at `offset`.
///
/// The buffer is reserved fallibly since `len` comes from the file itself.
pub fn read_bytes_at<S: Read + Seek>(
    stream: &mut S,
    offset: u64,
    len: u64,
    what: &'static str,
) -> Result<Vec<u8>> {
    let oom = || Error::OutOfMemory { what, count: len };
    let len = usize::try_from(len).map_err(|_| oom())?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| oom())?;
    buf.resize(len, 0);

    seek_to(stream, offset, what)?;
    stream
        .read_exact(&mut buf)
        .map_err(|e| Error::read(what, offset, e))?;
    Ok(buf)
}

/// Writes all of `data` at `offset`.
pub fn write_bytes_at<S: Write + Seek>(stream: &mut S, offset: u64, data: &[u8]) -> Result<()> {
    let fail = |source| Error::WriteFailed {
        offset,
        len: data.len(),
        source,
    };
    stream.seek(SeekFrom::Start(offset)).map_err(fail)?;
    stream.write_all(data).map_err(fail)?;
    stream.flush().map_err(fail)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::ErrorKind;
    use crate::macho::LoadCommand;

    #[test]
    fn test_peek_does_not_consume() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x19u32.to_ne_bytes());
        bytes.extend_from_slice(&0x48u32.to_ne_bytes());
        let mut stream = Cursor::new(bytes);

        let lc: LoadCommand = peek_record(&mut stream, false, "load command").unwrap();
        assert_eq!((lc.cmd, lc.cmdsize), (0x19, 0x48));
        assert_eq!(stream.position(), 0);

        let swapped: LoadCommand = read_record(&mut stream, true, "load command").unwrap();
        assert_eq!(swapped.cmd, 0x19u32.swap_bytes());
        assert_eq!(stream.position(), 8);
    }

    #[test]
    fn test_short_read_reports_offset() {
        let mut stream = Cursor::new(vec![0u8; 6]);
        stream.set_position(2);
        let err = read_record::<LoadCommand, _>(&mut stream, false, "load command").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReadFailed);
        assert!(matches!(err, Error::ReadFailed { offset: 2, .. }));
    }

    #[test]
    fn test_bytes_at() {
        let mut stream = Cursor::new(b"0123456789".to_vec());
        assert_eq!(read_bytes_at(&mut stream, 3, 4, "data").unwrap(), b"3456");

        write_bytes_at(&mut stream, 3, b"abcd").unwrap();
        assert_eq!(stream.get_ref().as_slice(), b"012abcd789");

        let err = read_bytes_at(&mut stream, 8, 4, "data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadFailed);
    }
}
