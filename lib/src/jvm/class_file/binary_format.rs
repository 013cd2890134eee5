use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Result};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`] for reading class file structures back
///
/// Running out of input is reported as [`Error::MalformedInput`], since the only streams that end
/// early are truncated class files.
pub trait Deserialize: Sized {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

/// Convert a low-level read failure into a class file error
pub fn read_error(err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        Error::MalformedInput(String::from("unexpected end of input"))
    } else {
        Error::IoError(err)
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: Read>(reader: &mut R, len: usize) -> std::result::Result<Vec<u8>, Error> {
    let mut buffer = vec![0; len];
    reader.read_exact(&mut buffer).map_err(read_error)?;
    Ok(buffer)
}

/// Serialize into a fresh buffer
pub fn to_bytes<A: Serialize>(value: &A) -> std::result::Result<Vec<u8>, Error> {
    let mut buffer = vec![];
    value.serialize(&mut buffer)?;
    Ok(buffer)
}

macro_rules! binary_number {
    ($num:ty, $write:ident, $read:ident $(, $endian:ty)?) => {
        impl Serialize for $num {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write$(::<$endian>)?(*self)
            }
        }

        impl Deserialize for $num {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                reader.$read$(::<$endian>)?().map_err(read_error)
            }
        }
    };
}

binary_number!(u8, write_u8, read_u8);
binary_number!(u16, write_u16, read_u16, BigEndian);
binary_number!(u32, write_u32, read_u32, BigEndian);
binary_number!(u64, write_u64, read_u64, BigEndian);
binary_number!(i8, write_i8, read_i8);
binary_number!(i16, write_i16, read_i16, BigEndian);
binary_number!(i32, write_i32, read_i32, BigEndian);
binary_number!(i64, write_i64, read_i64, BigEndian);
binary_number!(f32, write_f32, read_f32, BigEndian);
binary_number!(f64, write_f64, read_f64, BigEndian);

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        (0..len).map(|_| A::deserialize(reader)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_numbers() {
        let mut buffer = vec![];
        0xCAFEu16.serialize(&mut buffer).unwrap();
        (-2i32).serialize(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0xCA, 0xFE, 0xFF, 0xFF, 0xFF, 0xFE]);

        let mut reader: &[u8] = &buffer;
        assert_eq!(u16::deserialize(&mut reader).unwrap(), 0xCAFE);
        assert_eq!(i32::deserialize(&mut reader).unwrap(), -2);
    }

    #[test]
    fn truncated_input_is_malformed() {
        let mut reader: &[u8] = &[0x00, 0x02, 0x00, 0x01, 0x00];
        assert!(matches!(
            Vec::<u16>::deserialize(&mut reader),
            Err(Error::MalformedInput(_))
        ));
    }
}
