//! 파일 인코딩 감지와 라인 단위 읽기
//!
//! 파일 앞부분의 매직 바이트로 인코딩을 판별하고, 인코딩에 맞는 리더를 열어
//! 개행 단위로 라인을 돌려줍니다. gzip은 스트리밍 해제하며, UTF-8 BOM은 건너뜁니다.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::LogReplayError;

const MAGIC_GZIP: &[u8] = &[0x1F, 0x8B];
const MAGIC_XZ: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00];
const MAGIC_UTF16: &[u8] = &[0xFF, 0xFE];
const MAGIC_UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 감지할 매직 바이트의 최대 길이
const SNIFF_LEN: usize = 8;

/// 파일 콘텐츠 인코딩
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// 매직 바이트 없는 일반 텍스트
    #[default]
    Plain,
    /// gzip 압축
    Gzip,
    /// xz 압축
    Xz,
    /// UTF-16 (LE BOM)
    Utf16,
    /// UTF-8 BOM 포함 텍스트
    Utf8,
}

impl ContentEncoding {
    /// 파일 앞부분 바이트로 인코딩을 판별합니다.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(MAGIC_GZIP) {
            Self::Gzip
        } else if head.starts_with(MAGIC_XZ) {
            Self::Xz
        } else if head.starts_with(MAGIC_UTF16) {
            Self::Utf16
        } else if head.starts_with(MAGIC_UTF8_BOM) {
            Self::Utf8
        } else {
            Self::Plain
        }
    }

    /// 파일을 열어 인코딩을 감지합니다.
    pub fn detect(path: &Path) -> Result<Self, LogReplayError> {
        let mut file = File::open(path)?;
        let mut head = [0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            match file.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self::from_magic(&head[..filled]))
    }

    /// 이 인코딩을 읽을 수 있는지 확인합니다.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Plain | Self::Gzip | Self::Utf8)
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Utf16 => "utf16",
            Self::Utf8 => "utf8",
        };
        f.write_str(name)
    }
}

/// 개행 단위 라인 리더
///
/// 각 항목은 끝의 `\n`과 `\r`을 제거한 라인 바이트입니다.
pub struct LineReader {
    inner: Box<dyn BufRead + Send>,
    buf: Vec<u8>,
}

impl LineReader {
    /// 인코딩에 맞는 리더로 파일을 엽니다.
    pub fn open(path: &Path, encoding: ContentEncoding) -> Result<Self, LogReplayError> {
        let inner: Box<dyn BufRead + Send> = match encoding {
            ContentEncoding::Plain => Box::new(BufReader::new(File::open(path)?)),
            ContentEncoding::Utf8 => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(MAGIC_UTF8_BOM.len() as u64))?;
                Box::new(BufReader::new(file))
            }
            ContentEncoding::Gzip => {
                Box::new(BufReader::new(MultiGzDecoder::new(File::open(path)?)))
            }
            ContentEncoding::Xz | ContentEncoding::Utf16 => {
                return Err(LogReplayError::UnsupportedEncoding {
                    path: path.display().to_string(),
                    encoding: encoding.to_string(),
                });
            }
        };
        Ok(Self {
            inner,
            buf: Vec::with_capacity(4096),
        })
    }
}

impl Iterator for LineReader {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                Some(Ok(self.buf.clone()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
