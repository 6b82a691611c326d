//! Charset-aware file IO
//!
//! Test documents are read under the configured source encoding and every
//! rendered document (and the summary report) is written under the configured
//! output encoding. Neither direction substitutes replacement characters:
//! malformed input and unmappable output are reported as encoding errors.

use crate::error::{Error, Result};
use encoding_rs::{CoderResult, Encoder, EncoderResult, Encoding};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size of the intermediate buffer used while encoding
const ENCODE_BUFFER_SIZE: usize = 8 * 1024;

/// A resolved character encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    encoding: &'static Encoding,
}

impl Charset {
    pub const UTF_8: Charset = Charset {
        encoding: encoding_rs::UTF_8,
    };

    /// Resolve an encoding label such as `UTF-8`, `ISO-8859-1` or `Shift_JIS`
    pub fn for_label(label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .filter(|e| *e != encoding_rs::REPLACEMENT)
            .ok_or_else(|| Error::Config(format!("unknown character encoding '{}'", label)))?;
        Ok(Self { encoding })
    }

    /// Resolve a label for writing.
    ///
    /// Encodings without an encoder (UTF-16) resolve to the encoding that is
    /// actually produced, so declared and written bytes always agree.
    pub fn for_output_label(label: &str) -> Result<Self> {
        let charset = Self::for_label(label)?;
        Ok(Self {
            encoding: charset.encoding.output_encoding(),
        })
    }

    /// Canonical name, as declared in generated documents
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

}

impl Default for Charset {
    fn default() -> Self {
        Self::UTF_8
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read a whole file as text under the given charset
pub fn read_all(path: &Path, charset: Charset) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::file_io(path, e))?;
    charset
        .encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| Error::Encoding {
            path: path.to_path_buf(),
            message: format!("malformed byte sequence for {}", charset.name()),
        })
}

/// Writer over a file created by [`open_writer`]
pub type FileWriter = CharsetWriter<BufWriter<File>>;

/// Open a buffered, encoding writer over `path`, creating parent directories
pub fn open_writer(path: &Path, charset: Charset) -> Result<FileWriter> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::file_io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| Error::file_io(path, e))?;
    debug!(?path, charset = charset.name(), "Opened output file");
    Ok(CharsetWriter::new(BufWriter::new(file), charset, path))
}

/// Streaming text writer that encodes under a fixed charset.
///
/// Call [`CharsetWriter::finish`] to flush pending encoder state and the
/// underlying writer. A writer dropped without `finish` still releases its
/// handle, which is what happens when a caller bails out part way through.
///
/// By default unmappable characters are an error. A writer switched to
/// [`CharsetWriter::with_character_references`] writes them as HTML decimal
/// character references (`&#9731;`) instead.
pub struct CharsetWriter<W: Write> {
    inner: W,
    encoder: Encoder,
    charset: Charset,
    path: PathBuf,
    character_references: bool,
    buffer: Vec<u8>,
    scratch: String,
}

impl<W: Write> CharsetWriter<W> {
    /// Wrap `inner`; `path` only labels errors
    pub fn new(inner: W, charset: Charset, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            encoder: charset.encoding.new_encoder(),
            charset,
            path: path.into(),
            character_references: false,
            buffer: vec![0; ENCODE_BUFFER_SIZE],
            scratch: String::new(),
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Write unmappable characters as numeric character references
    pub fn with_character_references(mut self) -> Self {
        self.character_references = true;
        self
    }

    /// Encode and write `text`
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.encode(text, false)
    }

    /// Formatted write, so `write!`/`writeln!` work on this writer
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let result = match fmt::Write::write_fmt(&mut scratch, args) {
            Ok(()) => self.write_str(&scratch),
            Err(_) => Err(Error::file_io(
                &self.path,
                std::io::Error::other("formatter error"),
            )),
        };
        self.scratch = scratch;
        result
    }

    /// Flush encoder state and the underlying writer, returning it
    pub fn finish(mut self) -> Result<W> {
        self.encode("", true)?;
        self.inner
            .flush()
            .map_err(|e| Error::file_io(&self.path, e))?;
        Ok(self.inner)
    }

    fn encode(&mut self, mut text: &str, last: bool) -> Result<()> {
        loop {
            let (result, read, written) = if self.character_references {
                let (result, read, written, _) =
                    self.encoder.encode_from_utf8(text, &mut self.buffer, last);
                let result = match result {
                    CoderResult::InputEmpty => EncoderResult::InputEmpty,
                    CoderResult::OutputFull => EncoderResult::OutputFull,
                };
                (result, read, written)
            } else {
                self.encoder
                    .encode_from_utf8_without_replacement(text, &mut self.buffer, last)
            };
            self.inner
                .write_all(&self.buffer[..written])
                .map_err(|e| Error::file_io(&self.path, e))?;
            text = &text[read..];

            match result {
                EncoderResult::InputEmpty => return Ok(()),
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(c) => {
                    return Err(Error::Encoding {
                        path: self.path.clone(),
                        message: format!(
                            "character '{}' (U+{:04X}) cannot be encoded as {}",
                            c,
                            c as u32,
                            self.charset.name()
                        ),
                    });
                }
            }
        }
    }
}
