//! Big-endian integer conversions for the wire format.
//!
//! Every multi-byte field in a frame is network order. Stream ids and
//! request-N counts are 32-bit, header words and RPC lengths 16-bit, tracing
//! ids 64-bit. Metadata lengths and the transport prefix are 24-bit, which
//! has no primitive, so [`write_network_u24`] refuses values that would not
//! fit instead of truncating them.

/// Largest value representable in a 24-bit length field.
pub const MAX_U24: u32 = 0x00FF_FFFF;

macro_rules! network_order {
    ($($ty:ty: $write:ident, $read:ident, $n:literal;)*) => {$(
        #[doc = concat!("Encode a `", stringify!($ty), "` as it appears on the wire.")]
        #[must_use]
        pub fn $write(value: $ty) -> [u8; $n] {
            #[expect(clippy::big_endian_bytes, reason = "wire fields are big-endian")]
            value.to_be_bytes()
        }

        #[doc = concat!("Decode a `", stringify!($ty), "` from its wire bytes.")]
        #[must_use]
        pub fn $read(bytes: [u8; $n]) -> $ty {
            #[expect(clippy::big_endian_bytes, reason = "wire fields are big-endian")]
            <$ty>::from_be_bytes(bytes)
        }
    )*};
}

network_order! {
    u16: write_network_u16, read_network_u16, 2;
    u32: write_network_u32, read_network_u32, 4;
    u64: write_network_u64, read_network_u64, 8;
}

/// Encode a 24-bit length, or `None` if `value` exceeds [`MAX_U24`].
///
/// ```
/// use rsframe::byte_order::write_network_u24;
///
/// assert_eq!(write_network_u24(0x00_0102), Some([0x00, 0x01, 0x02]));
/// assert_eq!(write_network_u24(1 << 24), None);
/// ```
#[must_use]
pub fn write_network_u24(value: u32) -> Option<[u8; 3]> {
    match write_network_u32(value) {
        [0, hi, mid, lo] => Some([hi, mid, lo]),
        _ => None,
    }
}

/// Decode a 24-bit length.
#[must_use]
pub fn read_network_u24([hi, mid, lo]: [u8; 3]) -> u32 { read_network_u32([0, hi, mid, lo]) }
