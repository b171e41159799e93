use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::Path;

pub fn crc32(data: &[u8]) -> u32 { crc32fast::hash(data) }

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> { w.write_u64::<LE>(v) }
pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> { w.write_u32::<LE>(v) }
pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> { w.write_u16::<LE>(v) }
pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> { r.read_u64::<LE>() }
pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> { r.read_u32::<LE>() }
pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> { r.read_u16::<LE>() }

#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = path.parent().unwrap_or(Path::new("."));
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> io::Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_ints() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 7).unwrap();
        write_u32(&mut buf, 0xdead_beef).unwrap();
        write_u64(&mut buf, 42).unwrap();
        let mut cur = std::io::Cursor::new(buf);
        assert_eq!(read_u16(&mut cur).unwrap(), 7);
        assert_eq!(read_u32(&mut cur).unwrap(), 0xdead_beef);
        assert_eq!(read_u64(&mut cur).unwrap(), 42);
    }
}
