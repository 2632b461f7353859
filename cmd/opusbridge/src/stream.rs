//! Length-prefixed packet stream.

use std::io::{self, Read, Write};

/// Writes one packet: `u32` little-endian length, then the bytes.
pub fn write_packet<W: Write>(w: &mut W, packet: &[u8]) -> io::Result<()> {
    let len = u32::try_from(packet.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(packet)
}

/// Reads one packet, or `None` at a clean end of stream.
pub fn read_packet<R: Read>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match r.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let mut packet = vec![0u8; u32::from_le_bytes(len) as usize];
    r.read_exact(&mut packet)?;
    Ok(Some(packet))
}

/// Reads every packet in the stream.
pub fn read_all<R: Read>(r: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let mut packets = Vec::new();
    while let Some(packet) = read_packet(r)? {
        packets.push(packet);
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_read() {
        let mut buf = Vec::new();
        write_packet(&mut buf, &[1, 2, 3]).unwrap();
        write_packet(&mut buf, &[]).unwrap();
        write_packet(&mut buf, &[9]).unwrap();
        assert_eq!(&buf[..7], &[3, 0, 0, 0, 1, 2, 3]);

        let packets = read_all(&mut Cursor::new(buf)).unwrap();
        assert_eq!(packets, vec![vec![1, 2, 3], vec![], vec![9]]);
    }

    #[test]
    fn test_truncated_packet() {
        let buf = vec![5, 0, 0, 0, 1, 2];
        assert!(read_all(&mut Cursor::new(buf)).is_err());
    }
}
