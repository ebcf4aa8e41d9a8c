//! GSM 03.38 default alphabet ⇄ ISO-8859-1 transcoding (spec component A).
//!
//! Grounded in the teacher's `GSM_ENCODING_TABLE`/`GSM_EXTENDED_ENCODING_TABLE`
//! (`gsm_encoding.rs`), converted from `char` to raw ISO-8859-1 byte values
//! (Latin-1 code points 0-255 are identical to Unicode code points 0-255, so
//! a `u8` is a lossless, allocation-free stand-in for the teacher's `char`).
//! Conversion is pure and infallible, as spec §4.A requires.
//!
//! The default alphabet is ASCII-identical for most printable positions; only
//! the control-character block (`0x00`-`0x1A`), a handful of punctuation
//! positions, and the accented-letter block at `0x5B`-`0x60`/`0x7B`-`0x7F`
//! diverge. The Greek capital letters at `0x10`, `0x12`-`0x1A` have no
//! Latin-1 representation at all; this table substitutes the visually
//! closest Latin letter (the "closest Latin-1 equivalents" spec §4.A calls
//! for), a long-standing convention among GSM/ISO transcoders since the
//! alternative is simply dropping the character.

/// `ESC` (`0x1B`) is not a default-alphabet character; it switches the next
/// septet to the extended table. It never appears as a table value.
pub const ESC: u8 = 0x1B;

/// `ext_convert` returns this to mean "not an extended character" — the
/// codec's in-band signal, per spec §4.A. Never a legitimate output of a
/// *decode*, since the space character has its own unescaped default-table
/// encoding and would never be reached through the extension path.
pub const EXT_SENTINEL: u8 = b' ';

/// The 10 code points 3GPP TS 23.038 actually assigns in the basic
/// extension table, reached via an `ESC` (`0x1B`) prefix septet.
/// `0x0A` (page break) decodes to ASCII form-feed per the standard.
const EXT_TABLE: &[(u8, u8)] = &[
    (0x0A, 0x0C), // page break -> form feed
    (0x14, b'^'),
    (0x28, b'{'),
    (0x29, b'}'),
    (0x2F, b'\\'),
    (0x3C, b'['),
    (0x3D, b'~'),
    (0x3E, b']'),
    (0x40, b'|'),
    (0x65, 0xA4), // EURO SIGN -- see note below
];

/// Decode one default-alphabet septet to its ISO-8859-1 byte.
///
/// The Euro sign has no ISO-8859-1 code point; this codec reuses ISO byte
/// `0xA4` (the generic currency sign, `¤`) for it on *both* the default
/// septet `0x24` (`¤`) and the extended septet `0x65` (`€`) — they decode to
/// the same Latin-1 byte, since the receiving side can only render Latin-1
/// anyway. See `iso_to_sms` for how the ambiguity resolves on encode.
pub fn sms_to_iso(b: u8) -> u8 {
    match b & 0x7F {
        0x00 => 0x40, // @
        0x01 => 0xA3, // £
        0x02 => 0x24, // $
        0x03 => 0xA5, // ¥
        0x04 => 0xE8, // è
        0x05 => 0xE9, // é
        0x06 => 0xF9, // ù
        0x07 => 0xEC, // ì
        0x08 => 0xF2, // ò
        0x09 => 0xC7, // Ç
        0x0A => 0x0A, // LF
        0x0B => 0xD8, // Ø
        0x0C => 0xF8, // ø
        0x0D => 0x0D, // CR
        0x0E => 0xC5, // Å
        0x0F => 0xE5, // å
        0x10 => b'D', // GREEK CAPITAL DELTA (no Latin-1 code point)
        0x11 => b'_',
        0x12 => b'F', // GREEK CAPITAL PHI
        0x13 => b'G', // GREEK CAPITAL GAMMA
        0x14 => b'L', // GREEK CAPITAL LAMBDA
        0x15 => b'W', // GREEK CAPITAL OMEGA
        0x16 => b'P', // GREEK CAPITAL PI
        0x17 => b'Y', // GREEK CAPITAL PSI
        0x18 => b'S', // GREEK CAPITAL SIGMA
        0x19 => b'Q', // GREEK CAPITAL THETA
        0x1A => b'X', // GREEK CAPITAL XI
        0x1C => 0xC6, // Æ
        0x1D => 0xE6, // æ
        0x1E => 0xDF, // ß
        0x1F => 0xC9, // É
        0x24 => 0xA4, // ¤ (currency sign; also the Euro slot, see above)
        0x40 => 0xA1, // ¡
        0x5B => 0xC4, // Ä
        0x5C => 0xD6, // Ö
        0x5D => 0xD1, // Ñ
        0x5E => 0xDC, // Ü
        0x5F => 0xA7, // §
        0x60 => 0xBF, // ¿
        0x7B => 0xE4, // ä
        0x7C => 0xF6, // ö
        0x7D => 0xF1, // ñ
        0x7E => 0xFC, // ü
        0x7F => 0xE0, // à
        other => other, // ASCII-identical range
    }
}

/// Encode one ISO-8859-1 byte to its default-alphabet septet, if representable
/// without an escape. Non-representable bytes return `None` (caller
/// substitutes `?`, per spec §4.A).
pub fn iso_to_sms(b: u8) -> Option<u8> {
    let septet = match b {
        0x0A => 0x0A,
        0x0D => 0x0D,
        0x40 => 0x00, // @
        0xA3 => 0x01, // £
        0x24 => 0x02, // $
        0xA5 => 0x03, // ¥
        0xE8 => 0x04, // è
        0xE9 => 0x05, // é
        0xF9 => 0x06, // ù
        0xEC => 0x07, // ì
        0xF2 => 0x08, // ò
        0xC7 => 0x09, // Ç
        0xD8 => 0x0B, // Ø
        0xF8 => 0x0C, // ø
        0xC5 => 0x0E, // Å
        0xE5 => 0x0F, // å
        b'_' => 0x11,
        0xC6 => 0x1C, // Æ
        0xE6 => 0x1D, // æ
        0xDF => 0x1E, // ß
        0xC9 => 0x1F, // É
        0xA1 => 0x40, // ¡
        0xC4 => 0x5B, // Ä
        0xD6 => 0x5C, // Ö
        0xD1 => 0x5D, // Ñ
        0xDC => 0x5E, // Ü
        0xA7 => 0x5F, // §
        0xBF => 0x60, // ¿
        0xE4 => 0x7B, // ä
        0xF6 => 0x7C, // ö
        0xF1 => 0x7D, // ñ
        0xFC => 0x7E, // ü
        0xE0 => 0x7F, // à
        0x20..=0x7E => b, // ASCII-identical printable range, including 0xA4's
                          // sibling '$' at 0x24 handled above; plain ASCII
                          // falls through here unchanged.
        _ => return None,
    };
    Some(septet)
}

/// Decode one extended-table septet (the byte following an unescaped `ESC`)
/// to its ISO-8859-1 byte. Returns `EXT_SENTINEL` for any unassigned
/// position, per spec §4.A's "not an extended character" contract.
pub fn ext_sms_to_iso(b: u8) -> u8 {
    for &(septet, iso) in EXT_TABLE {
        if septet == b & 0x7F {
            return iso;
        }
    }
    EXT_SENTINEL
}

/// Encode one ISO-8859-1 byte via the extended table, if it has no
/// unescaped representation. `0xA4` resolves here (the Euro sign), ahead of
/// the default table's claim on the same byte for `¤` — see `sms_to_iso`.
pub fn ext_iso_to_sms(b: u8) -> Option<u8> {
    for &(septet, iso) in EXT_TABLE {
        if iso == b {
            return Some(septet);
        }
    }
    None
}

/// Encode a single ISO-8859-1 byte, preferring the extended table when both
/// tables claim the same ISO byte (currently only `0xA4`, Euro vs. currency
/// sign). Returns `(escape_needed, septet)`.
pub fn encode_byte(b: u8) -> Option<(bool, u8)> {
    if let Some(s) = ext_iso_to_sms(b) {
        return Some((true, s));
    }
    iso_to_sms(b).map(|s| (false, s))
}

/// Unpack a GSM 7-bit-packed octet stream into septets (one byte per
/// septet, high bit clear), per spec §4.B: "bit 0 of septet 0 at bit 0 of
/// octet 0, bit 0 of septet 1 at bit 7 of octet 0, and so on."
///
/// Stops after `septet_count` septets, or earlier at a NUL septet if
/// `stop_at_null` is set (used when unpacking alphanumeric addresses).
pub fn unpack_septets(packed: &[u8], septet_count: usize, stop_at_null: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(septet_count);
    let mut bitpos = 0usize;
    for _ in 0..septet_count {
        let mut c: u8 = 0;
        for bit in 0..7 {
            let bytepos = bitpos / 8;
            let byteofs = bitpos % 8;
            let Some(&byte) = packed.get(bytepos) else {
                return out;
            };
            if byte & (1 << byteofs) != 0 {
                c |= 1 << bit;
            }
            bitpos += 1;
        }
        if c == 0 && stop_at_null {
            break;
        }
        out.push(c);
    }
    out
}

/// Pack septets (each a 7-bit value, high bit ignored) into an octet stream,
/// the inverse of `unpack_septets`.
pub fn pack_septets(septets: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; (septets.len() * 7 + 7) / 8];
    let mut bitpos = 0usize;
    for &septet in septets {
        for bit in 0..7 {
            if septet & (1 << bit) != 0 {
                let bytepos = bitpos / 8;
                let byteofs = bitpos % 8;
                out[bytepos] |= 1 << byteofs;
            }
            bitpos += 1;
        }
    }
    out
}

/// Decode packed default-alphabet septets straight to ISO-8859-1 bytes,
/// handling the `ESC`-prefixed extended table and the NUL-stop convention
/// used for alphanumeric addresses. This is `binary2ascii` from the
/// original source, restated without the shared output/input length
/// aliasing that made the original hard to follow.
pub fn decode_7bit(packed: &[u8], septet_count: usize, stop_at_null: bool) -> Vec<u8> {
    let septets = unpack_septets(packed, septet_count, stop_at_null);
    let mut out = Vec::with_capacity(septets.len());
    let mut escaped = false;
    for s in septets {
        if escaped {
            out.push(ext_sms_to_iso(s));
            escaped = false;
        } else if s == ESC {
            escaped = true;
        } else {
            out.push(sms_to_iso(s));
        }
    }
    out
}

/// Encode ISO-8859-1 bytes to packed default-alphabet septets, inserting an
/// `ESC` septet before each character that requires the extended table.
/// Returns the packed octets and the septet count actually used (the UDL
/// spec §4.B asks callers to report, since an escape adds one septet).
pub fn encode_7bit(content: &[u8]) -> (Vec<u8>, usize) {
    let mut septets = Vec::with_capacity(content.len());
    for &b in content {
        match encode_byte(b) {
            Some((true, s)) => {
                septets.push(ESC);
                septets.push(s);
            }
            Some((false, s)) => septets.push(s),
            None => septets.push(iso_to_sms(b'?').unwrap()),
        }
    }
    let count = septets.len();
    (pack_septets(&septets), count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alphabet_round_trips_ascii() {
        for b in 0x20u8..=0x7E {
            if let Some(s) = iso_to_sms(b) {
                assert_eq!(sms_to_iso(s), b, "byte {:#x} did not round-trip", b);
            }
        }
    }

    #[test]
    fn euro_sign_uses_extended_table() {
        let (packed, count) = encode_7bit(&[0xA4]);
        assert_eq!(count, 2);
        let septets = unpack_septets(&packed, 2, false);
        assert_eq!(septets, vec![ESC, 0x65]);
        assert_eq!(decode_7bit(&packed, 2, false), vec![0xA4]);
    }

    #[test]
    fn pack_unpack_round_trip() {
        let septets: Vec<u8> = b"Hello"
            .iter()
            .map(|&b| iso_to_sms(b).unwrap())
            .collect();
        let packed = pack_septets(&septets);
        let unpacked = unpack_septets(&packed, septets.len(), false);
        assert_eq!(unpacked, septets);
    }

    #[test]
    fn stop_at_null_truncates() {
        let septets = vec![b'A' & 0x7F, 0, b'B' & 0x7F];
        let packed = pack_septets(&septets);
        let unpacked = unpack_septets(&packed, 3, true);
        assert_eq!(unpacked, vec![b'A']);
    }
}
