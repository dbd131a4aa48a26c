//! Hex dump rendering for verbose chunk logging.

use std::fmt::Write;

const BYTES_PER_ROW: usize = 16;

/// Render `bytes` as offset, hex columns and a printable-ASCII gutter,
/// one row per 16 bytes:
///
/// ```text
/// 00000000  4d 41 49 4c 20 46 52 4f  4d 3a 3c 61 40 65 78 61  |MAIL FROM:<a@exa|
/// ```
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(BYTES_PER_ROW) * 79);

    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let _ = write!(out, "{:08x}  ", row * BYTES_PER_ROW);

        for col in 0..BYTES_PER_ROW {
            match chunk.get(col) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if col == 7 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}
