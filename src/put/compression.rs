use std::fmt;
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::{Error, Result};

/// Compression of a file as it is stored in the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Gzip,
    Bzip2,
    Brotli,
    Zstd,
    Deflate,
    RawDeflate,
    Parquet,
    Orc,
}

impl CompressionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
            Self::Brotli => "BROTLI",
            Self::Zstd => "ZSTD",
            Self::Deflate => "DEFLATE",
            Self::RawDeflate => "RAW_DEFLATE",
            Self::Parquet => "PARQUET",
            Self::Orc => "ORC",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::None)
    }

    fn from_name(name: &str) -> Result<Self> {
        let compression = match name.to_ascii_uppercase().as_str() {
            "NONE" => Self::None,
            "GZIP" => Self::Gzip,
            "BZIP2" => Self::Bzip2,
            "BROTLI" => Self::Brotli,
            "ZSTD" => Self::Zstd,
            "DEFLATE" => Self::Deflate,
            "RAW_DEFLATE" => Self::RawDeflate,
            "PARQUET" => Self::Parquet,
            "ORC" => Self::Orc,
            other => return Err(unsupported(other)),
        };
        Ok(compression)
    }

    fn from_extension(file_name: &str) -> Result<Option<Self>> {
        let Some((_, extension)) = file_name.rsplit_once('.') else {
            return Ok(None);
        };
        let compression = match extension.to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Self::Gzip,
            "bz2" => Self::Bzip2,
            "br" => Self::Brotli,
            "zst" => Self::Zstd,
            "deflate" => Self::Deflate,
            "raw_deflate" => Self::RawDeflate,
            "parquet" => Self::Parquet,
            "orc" => Self::Orc,
            "xz" | "lz" | "lzma" | "lzo" | "z" => return Err(unsupported(extension)),
            _ => return Ok(None),
        };
        Ok(Some(compression))
    }

    fn from_magic(data: &[u8]) -> Result<Option<Self>> {
        let compression = if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else if data.starts_with(b"PAR1") {
            Self::Parquet
        } else if data.starts_with(b"ORC") {
            Self::Orc
        } else if data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            return Err(unsupported("xz"));
        } else {
            return Ok(None);
        };
        Ok(Some(compression))
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unsupported(name: &str) -> Error {
    Error::UnsupportedFormat(format!("compression type {name} is not supported"))
}

/// `SOURCE_COMPRESSION` option of the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceCompression {
    AutoDetect,
    Declared(CompressionType),
}

impl SourceCompression {
    pub(crate) fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(Self::AutoDetect),
            Some(value) if value.eq_ignore_ascii_case("auto_detect") => Ok(Self::AutoDetect),
            Some(value) => CompressionType::from_name(value).map(Self::Declared),
        }
    }

    /// Resolves the compression of one source file.
    pub(crate) fn resolve(&self, file_name: &str, data: &[u8]) -> Result<CompressionType> {
        match self {
            Self::Declared(compression) => Ok(*compression),
            Self::AutoDetect => {
                if let Some(compression) = CompressionType::from_extension(file_name)? {
                    return Ok(compression);
                }
                Ok(CompressionType::from_magic(data)?.unwrap_or(CompressionType::None))
            }
        }
    }
}

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn test_detects_compression_by_extension() -> Result<()> {
        let auto = SourceCompression::AutoDetect;
        assert_eq!(auto.resolve("a.csv.gz", b"")?, CompressionType::Gzip);
        assert_eq!(auto.resolve("a.csv.BZ2", b"")?, CompressionType::Bzip2);
        assert_eq!(auto.resolve("a.zst", b"")?, CompressionType::Zstd);
        assert_eq!(auto.resolve("a.parquet", b"")?, CompressionType::Parquet);
        assert_eq!(auto.resolve("a.csv", b"id,name\n")?, CompressionType::None);
        assert_eq!(auto.resolve("README", b"text")?, CompressionType::None);
        Ok(())
    }

    #[test]
    fn test_detects_compression_by_magic_bytes() -> Result<()> {
        let auto = SourceCompression::AutoDetect;
        let gz = gzip(b"hello")?;
        assert_eq!(auto.resolve("upload.bin", &gz)?, CompressionType::Gzip);
        assert_eq!(auto.resolve("upload.bin", b"PAR1....")?, CompressionType::Parquet);
        assert_eq!(auto.resolve("upload.bin", b"BZh91AY")?, CompressionType::Bzip2);
        Ok(())
    }

    #[test]
    fn test_unsupported_compression_is_rejected() {
        let auto = SourceCompression::AutoDetect;
        assert!(matches!(
            auto.resolve("a.csv.xz", b""),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(SourceCompression::parse(Some("lzma")).is_err());
    }

    #[test]
    fn test_declared_compression_skips_detection() -> Result<()> {
        let declared = SourceCompression::parse(Some("none"))?;
        assert_eq!(declared, SourceCompression::Declared(CompressionType::None));
        assert_eq!(declared.resolve("a.gz", &[0x1f, 0x8b])?, CompressionType::None);
        assert_eq!(
            SourceCompression::parse(Some("AUTO_DETECT"))?,
            SourceCompression::AutoDetect
        );
        Ok(())
    }

    #[test]
    fn test_gzip_output_decompresses_to_input() -> Result<()> {
        let input = b"id,title\n1,first video\n2,second video\n".repeat(100);
        let compressed = gzip(&input)?;
        assert!(compressed.len() < input.len());

        let mut output = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut output)?;
        assert_eq!(output, input);
        Ok(())
    }
}
