use alloc::string::String;
use alloc::vec::Vec;
use std::io;

// -----------------------------------------------------------------------------
// Sink

/// A write destination for emitted markup.
///
/// The engine performs no buffering of its own and calls [`write`](Sink::write)
/// many times per emission, so sinks backed by I/O should buffer.
pub trait Sink {
    /// Appends `text`.
    fn write(&mut self, text: &str) -> io::Result<()>;
}

impl Sink for String {
    #[inline]
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.push_str(text);
        Ok(())
    }
}

impl Sink for Vec<u8> {
    #[inline]
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.extend_from_slice(text.as_bytes());
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    #[inline]
    fn write(&mut self, text: &str) -> io::Result<()> {
        (**self).write(text)
    }
}

// -----------------------------------------------------------------------------
// IoSink

/// Adapts any [`io::Write`] into a [`Sink`].
///
/// # Examples
///
/// ```
/// use std::io::BufWriter;
/// use vc_markup::{IoSink, Sink};
///
/// let mut sink = IoSink::new(BufWriter::new(Vec::new()));
/// sink.write("<a/>").unwrap();
///
/// let bytes = sink.into_inner().into_inner().unwrap();
/// assert_eq!(bytes, b"<a/>");
/// ```
#[derive(Debug)]
pub struct IoSink<W: io::Write> {
    inner: W,
}

impl<W: io::Write> IoSink<W> {
    /// Wraps `inner`.
    #[inline]
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns a reference to the wrapped writer.
    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the writer, without flushing it.
    #[inline]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> Sink for IoSink<W> {
    #[inline]
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_all(text.as_bytes())
    }
}
