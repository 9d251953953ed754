//! PFM (portable float map) serialization for correspondence rasters.
//!
//! Grayscale variant only: ASCII header `Pf\n<width> <height>\n<scale>\n`
//! followed by `width*height` 32-bit floats in row-major order. A
//! negative scale marks little-endian data (what we write); positive
//! marks big-endian (accepted on read). No-match pixels are `+inf`.

use crate::code::Raster;
use crate::error::MlightError;

/// Serialize a raster to PFM bytes (little-endian).
pub fn write(raster: &Raster) -> Vec<u8> {
    let header = format!("Pf\n{} {}\n-1\n", raster.width(), raster.height());
    let mut out = Vec::with_capacity(header.len() + raster.data().len() * 4);
    out.extend_from_slice(header.as_bytes());
    for &v in raster.data() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Parse PFM bytes back into a raster.
pub fn read(bytes: &[u8]) -> Result<Raster, MlightError> {
    let mut cursor = 0usize;

    let mut token = |bytes: &[u8]| -> Result<String, MlightError> {
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        let start = cursor;
        while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if start == cursor {
            return Err(MlightError::MalformedFrame("pfm header truncated"));
        }
        std::str::from_utf8(&bytes[start..cursor])
            .map(str::to_string)
            .map_err(|_| MlightError::MalformedFrame("pfm header not ascii"))
    };

    if token(bytes)? != "Pf" {
        return Err(MlightError::MalformedFrame("not a grayscale pfm"));
    }
    let width: usize = token(bytes)?
        .parse()
        .map_err(|_| MlightError::MalformedFrame("bad pfm width"))?;
    let height: usize = token(bytes)?
        .parse()
        .map_err(|_| MlightError::MalformedFrame("bad pfm height"))?;
    let scale: f32 = token(bytes)?
        .parse()
        .map_err(|_| MlightError::MalformedFrame("bad pfm scale"))?;

    // Exactly one whitespace byte separates the header from the data.
    cursor += 1;
    let data_bytes = bytes
        .get(cursor..)
        .ok_or(MlightError::MalformedFrame("pfm data missing"))?;
    if data_bytes.len() != width * height * 4 {
        return Err(MlightError::MalformedFrame("pfm data length mismatch"));
    }

    let little_endian = scale < 0.0;
    let data = data_bytes
        .chunks_exact(4)
        .map(|c| {
            let raw: [u8; 4] = c.try_into().expect("chunks of 4");
            if little_endian {
                f32::from_le_bytes(raw)
            } else {
                f32::from_be_bytes(raw)
            }
        })
        .collect();
    Raster::from_data(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::NO_MATCH;

    fn sample() -> Raster {
        Raster::from_data(3, 2, vec![0.0, 1.5, NO_MATCH, 2.0, -3.25, 1023.0]).unwrap()
    }

    #[test]
    fn roundtrip_preserves_values_and_infinity() {
        let raster = sample();
        let back = read(&write(&raster)).unwrap();
        assert_eq!(back.width(), 3);
        assert_eq!(back.height(), 2);
        assert_eq!(back.data(), raster.data());
        assert_eq!(back.get(2, 0), Some(NO_MATCH));
    }

    #[test]
    fn header_declares_little_endian() {
        let bytes = write(&sample());
        let header = std::str::from_utf8(&bytes[..10]).unwrap();
        assert_eq!(header, "Pf\n3 2\n-1\n");
    }

    #[test]
    fn big_endian_input_accepted() {
        let raster = sample();
        let mut bytes = format!("Pf\n{} {}\n1\n", raster.width(), raster.height()).into_bytes();
        for &v in raster.data() {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let back = read(&bytes).unwrap();
        assert_eq!(back.data(), raster.data());
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut bytes = write(&sample());
        bytes[1] = b'F'; // "PF" is the color variant
        assert!(read(&bytes).is_err());
    }

    #[test]
    fn short_data_rejected() {
        let bytes = write(&sample());
        assert!(read(&bytes[..bytes.len() - 4]).is_err());
    }
}
