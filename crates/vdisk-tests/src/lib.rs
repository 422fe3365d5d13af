//! Shared test helpers: hex round-trip assertions for binrw types.

#![forbid(unsafe_code)]

pub use pastey::paste;

/// Decodes a hex string into bytes, ignoring ASCII whitespace.
///
/// Panics on odd length or non-hex characters; intended for test literals.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    let compact: String = hex.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    assert!(
        compact.len() % 2 == 0,
        "hex literal has odd length: {compact:?}"
    );
    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .unwrap_or_else(|_| panic!("invalid hex literal: {compact:?}"))
        })
        .collect()
}

/// Encodes bytes as a lowercase hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Asserts that a value bin-reads from and bin-writes to the given hex bytes.
///
/// ```ignore
/// test_binrw! {
///     Guid => efi_system: Guid::from_bytes(EFI_SYSTEM_BYTES) => "28732ac1…"
/// }
/// ```
#[macro_export]
macro_rules! test_binrw {
    ($ty:ident => $label:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw_read! { $ty => $label: $value => $hex }
        $crate::test_binrw_write! { $ty => $label: $value => $hex }
    };
    ($ty:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw! { $ty => value: $value => $hex }
    };
}

/// Read-direction half of [`test_binrw!`], for asymmetric encodings.
#[macro_export]
macro_rules! test_binrw_read {
    ($ty:ident => $label:ident: $value:expr => $hex:literal) => {
        $crate::paste! {
            #[test]
            fn [<test_ $ty:snake _ $label _read>]() {
                let bytes = $crate::decode_hex($hex);
                let mut cursor = ::std::io::Cursor::new(&bytes);
                let parsed: $ty = ::binrw::BinRead::read_le(&mut cursor)
                    .expect("value should parse");
                assert_eq!(parsed, $value);
            }
        }
    };
    ($ty:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw_read! { $ty => value: $value => $hex }
    };
}

/// Write-direction half of [`test_binrw!`], for asymmetric encodings.
#[macro_export]
macro_rules! test_binrw_write {
    ($ty:ident => $label:ident: $value:expr => $hex:literal) => {
        $crate::paste! {
            #[test]
            fn [<test_ $ty:snake _ $label _write>]() {
                let value: $ty = $value;
                let mut cursor = ::std::io::Cursor::new(::std::vec::Vec::new());
                ::binrw::BinWrite::write_le(&value, &mut cursor)
                    .expect("value should serialize");
                assert_eq!(
                    $crate::encode_hex(cursor.get_ref()),
                    $crate::encode_hex(&$crate::decode_hex($hex))
                );
            }
        }
    };
    ($ty:ident: $value:expr => $hex:literal) => {
        $crate::test_binrw_write! { $ty => value: $value => $hex }
    };
}
