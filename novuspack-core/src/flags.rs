use bitflags::bitflags;

bitflags! {
    /// Package feature bits, stored in the low byte of `Header::flags`
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Features: u32 {
        const HAS_SIGNATURES = 1 << 0;
        const HAS_COMPRESSED_FILES = 1 << 1;
        const HAS_ENCRYPTED_FILES = 1 << 2;
        const HAS_EXTENDED_ATTRS = 1 << 3;
        const HAS_PACKAGE_COMMENT = 1 << 4;
        const HAS_PER_FILE_TAGS = 1 << 5;
        const HAS_SPECIAL_METADATA = 1 << 6;
        const METADATA_ONLY = 1 << 7;
    }
}

const FEATURES_MASK: u32 = 0x0000_00FF;
const COMPRESSION_SHIFT: u32 = 8;
const COMPRESSION_MASK: u32 = 0x0000_FF00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Zstd = 1,
    Lz4 = 2,
    Lzma = 3,
    Reserved(u8),
}

impl CompressionType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CompressionType::None,
            1 => CompressionType::Zstd,
            2 => CompressionType::Lz4,
            3 => CompressionType::Lzma,
            v => CompressionType::Reserved(v),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zstd => 1,
            CompressionType::Lz4 => 2,
            CompressionType::Lzma => 3,
            CompressionType::Reserved(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionType {
    None = 0,
    Aes256Gcm = 1,
    QuantumSafe = 2,
    Reserved(u8),
}

impl EncryptionType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => EncryptionType::None,
            1 => EncryptionType::Aes256Gcm,
            2 => EncryptionType::QuantumSafe,
            v => EncryptionType::Reserved(v),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            EncryptionType::None => 0,
            EncryptionType::Aes256Gcm => 1,
            EncryptionType::QuantumSafe => 2,
            EncryptionType::Reserved(n) => n,
        }
    }
}

/// Split the raw header flags word into its feature bits and compression tag
pub fn split_flags(bits: u32) -> (Features, CompressionType) {
    let features = Features::from_bits_retain(bits & FEATURES_MASK);
    let compression = ((bits & COMPRESSION_MASK) >> COMPRESSION_SHIFT) as u8;
    (features, CompressionType::from_u8(compression))
}

/// Inverse of [`split_flags`]. Bits above the compression byte are preserved
/// from `previous` so unknown future fields survive a rewrite.
pub fn join_flags(previous: u32, features: Features, compression: CompressionType) -> u32 {
    let mut bits = previous & !(FEATURES_MASK | COMPRESSION_MASK);
    bits |= features.bits() & FEATURES_MASK;
    bits |= (compression.as_u8() as u32) << COMPRESSION_SHIFT;
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_word_layout() {
        let bits = join_flags(
            0xAB00_0000,
            Features::HAS_PACKAGE_COMMENT | Features::HAS_SPECIAL_METADATA,
            CompressionType::Lz4,
        );
        assert_eq!(bits, 0xAB00_0250);

        let (features, compression) = split_flags(bits);
        assert!(features.contains(Features::HAS_PACKAGE_COMMENT));
        assert!(!features.contains(Features::HAS_SIGNATURES));
        assert_eq!(compression, CompressionType::Lz4);
    }

    #[test]
    fn reserved_compression_tag() {
        assert_eq!(CompressionType::from_u8(9), CompressionType::Reserved(9));
        assert_eq!(CompressionType::Reserved(9).as_u8(), 9);
    }
}
