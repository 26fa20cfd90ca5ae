//! Where command output goes: the process streams, or a shared in-memory buffer

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Default)]
pub enum Output {
    /// Inherit the process stdout and stderr
    #[default]
    Standard,
    /// Capture stdout and stderr, interleaved, in one buffer
    Buffered(Arc<Mutex<Vec<u8>>>),
}

impl Output {
    #[must_use]
    pub fn buffered() -> Self {
        Output::Buffered(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn write_out(&self, text: &str) {
        match self {
            Output::Standard => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Output::Buffered(buffer) => buffer.lock().extend_from_slice(text.as_bytes()),
        }
    }

    pub fn write_err(&self, text: &str) {
        match self {
            Output::Standard => {
                let _ = std::io::stderr().write_all(text.as_bytes());
            }
            Output::Buffered(buffer) => buffer.lock().extend_from_slice(text.as_bytes()),
        }
    }

    /// Append raw bytes produced by a child process
    pub fn append(&self, bytes: &[u8]) {
        if let Output::Buffered(buffer) = self {
            buffer.lock().extend_from_slice(bytes);
        }
    }

    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self, Output::Buffered(_))
    }

    /// Everything captured so far, lossily decoded. Empty for standard output.
    #[must_use]
    pub fn captured(&self) -> String {
        match self {
            Output::Standard => String::new(),
            Output::Buffered(buffer) => String::from_utf8_lossy(&buffer.lock()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_output_combines_streams() {
        let output = Output::buffered();
        output.write_out("one\n");
        output.write_err("two\n");
        output.append(b"three\n");
        assert_eq!(output.captured(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_clones_share_the_buffer() {
        let output = Output::buffered();
        let clone = output.clone();
        clone.write_out("shared");
        assert_eq!(output.captured(), "shared");
        assert!(Output::Standard.captured().is_empty());
    }
}
