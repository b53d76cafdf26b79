use std::{
    collections::HashSet,
    io::{self, Read, Write},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

/// Suffix appended to the extension of gzip-encoded blobs.
pub const GZIP_SUFFIX: &str = ".gz";

/// How the bytes of a blob relate to the original file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Verbatim,
    Gzip,
}

impl Encoding {
    /// Extension under which a blob with this encoding is stored.
    pub fn stored_extension(self, extension: &str) -> String {
        match self {
            Encoding::Verbatim => extension.to_string(),
            Encoding::Gzip => format!("{extension}{GZIP_SUFFIX}"),
        }
    }

    /// Inverse of [`Encoding::stored_extension`].
    pub fn original_extension(self, stored: &str) -> &str {
        match self {
            Encoding::Verbatim => stored,
            Encoding::Gzip => stored.strip_suffix(GZIP_SUFFIX).unwrap_or(stored),
        }
    }
}

/// Compression policy applied to file bytes before they are identified and stored.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    enabled: bool,
    precompressed: HashSet<String>,
}

impl CompressionCodec {
    pub fn new<I, S>(enabled: bool, precompressed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            enabled,
            precompressed: precompressed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, std::iter::empty::<&str>())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Picks the encoding for a file with the given normalized extension.
    pub fn plan(&self, extension: &str) -> Encoding {
        if self.enabled && !self.precompressed.contains(extension) {
            Encoding::Gzip
        } else {
            Encoding::Verbatim
        }
    }

    /// Streams `src` into `dst` using `encoding`; returns the number of bytes read from `src`.
    pub fn encode<R: Read, W: Write>(
        &self,
        encoding: Encoding,
        src: &mut R,
        dst: W,
    ) -> io::Result<u64> {
        match encoding {
            Encoding::Verbatim => {
                let mut dst = dst;
                let copied = io::copy(src, &mut dst)?;
                dst.flush()?;
                Ok(copied)
            }
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(dst, Compression::default());
                let copied = io::copy(src, &mut encoder)?;
                encoder.finish()?.flush()?;
                Ok(copied)
            }
        }
    }

    /// Streams a stored blob back to its original bytes.
    pub fn decode<R: Read, W: Write>(encoding: Encoding, src: R, dst: &mut W) -> io::Result<u64> {
        match encoding {
            Encoding::Verbatim => {
                let mut src = src;
                io::copy(&mut src, dst)
            }
            Encoding::Gzip => io::copy(&mut GzDecoder::new(src), dst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CompressionCodec {
        CompressionCodec::new(true, [".zip", ".MP4"])
    }

    #[test]
    fn precompressed_extensions_bypass_compression() {
        let codec = codec();
        assert_eq!(codec.plan(".zip"), Encoding::Verbatim);
        assert_eq!(codec.plan(".mp4"), Encoding::Verbatim);
        assert_eq!(codec.plan(".txt"), Encoding::Gzip);
        assert_eq!(codec.plan(""), Encoding::Gzip);
    }

    #[test]
    fn disabled_codec_never_compresses() {
        let codec = CompressionCodec::disabled();
        assert!(!codec.is_enabled());
        assert_eq!(codec.plan(".txt"), Encoding::Verbatim);
    }

    #[test]
    fn gzip_output_decodes_to_original() {
        let codec = codec();
        let original = b"line one\nline two\nline two\nline two\n".repeat(64);

        let mut encoded = Vec::new();
        let read = codec
            .encode(Encoding::Gzip, &mut original.as_slice(), &mut encoded)
            .expect("encode");
        assert_eq!(read, original.len() as u64);
        assert_ne!(encoded, original);
        assert!(encoded.len() < original.len());

        let mut decoded = Vec::new();
        CompressionCodec::decode(Encoding::Gzip, encoded.as_slice(), &mut decoded)
            .expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn verbatim_copies_bytes_unchanged() {
        let mut out = Vec::new();
        codec()
            .encode(Encoding::Verbatim, &mut b"abc".as_slice(), &mut out)
            .expect("copy");
        assert_eq!(out, b"abc");
    }

    #[test]
    fn stored_extension_round_trips() {
        assert_eq!(Encoding::Gzip.stored_extension(".txt"), ".txt.gz");
        assert_eq!(Encoding::Gzip.original_extension(".txt.gz"), ".txt");
        assert_eq!(Encoding::Verbatim.stored_extension(".gz"), ".gz");
        assert_eq!(Encoding::Verbatim.original_extension(".gz"), ".gz");
    }
}
