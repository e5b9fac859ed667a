use std::io;

use crate::Sink;

// -----------------------------------------------------------------------------
// Escaping

fn write_escaped(sink: &mut dyn Sink, text: &str, in_attribute: bool) -> io::Result<()> {
    let mut start = 0;
    for (index, byte) in text.bytes().enumerate() {
        let replacement = match byte {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'"' if in_attribute => "&quot;",
            _ => continue,
        };
        // Replaced bytes are ASCII, so `index` is a char boundary.
        if start < index {
            sink.write(&text[start..index])?;
        }
        sink.write(replacement)?;
        start = index + 1;
    }
    if start < text.len() {
        sink.write(&text[start..])?;
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// MarkupWriter

/// Writes well formed markup into a [`Sink`].
///
/// The opening tag of an element stays open after [`open`](Self::open) so that
/// attributes can follow. It is completed by the first content written, or
/// self-closed by [`close`](Self::close) when no content was written at all.
///
/// # Examples
///
/// ```
/// use vc_markup::MarkupWriter;
///
/// let mut out = String::new();
/// let mut writer = MarkupWriter::new(&mut out);
///
/// writer.open("a").unwrap();
/// writer.attribute("href", "x?a=1&b=\"2\"", false).unwrap();
/// writer.open("empty").unwrap();
/// writer.close("empty").unwrap();
/// writer.open("blank").unwrap();
/// writer.text("", false).unwrap();
/// writer.close("blank").unwrap();
/// writer.close("a").unwrap();
///
/// assert_eq!(
///     out,
///     r#"<a href="x?a=1&amp;b=&quot;2&quot;"><empty/><blank></blank></a>"#,
/// );
/// ```
pub struct MarkupWriter<'s> {
    sink: &'s mut dyn Sink,
    tag_open: bool,
}

impl<'s> MarkupWriter<'s> {
    /// Creates a writer appending to `sink`.
    #[inline]
    pub fn new(sink: &'s mut dyn Sink) -> Self {
        Self {
            sink,
            tag_open: false,
        }
    }

    fn finish_tag(&mut self) -> io::Result<()> {
        if self.tag_open {
            self.tag_open = false;
            self.sink.write(">")?;
        }
        Ok(())
    }

    /// Starts the element `name`, leaving its opening tag open.
    pub fn open(&mut self, name: &str) -> io::Result<()> {
        self.finish_tag()?;
        self.sink.write("<")?;
        self.sink.write(name)?;
        self.tag_open = true;
        Ok(())
    }

    /// Adds an attribute to the element started last.
    pub fn attribute(&mut self, name: &str, value: &str, raw: bool) -> io::Result<()> {
        debug_assert!(self.tag_open, "attribute `{name}` written outside of an opening tag");
        self.sink.write(" ")?;
        self.sink.write(name)?;
        self.sink.write("=\"")?;
        if raw {
            self.sink.write(value)?;
        } else {
            write_escaped(self.sink, value, true)?;
        }
        self.sink.write("\"")
    }

    /// Writes text content, completing a pending opening tag even if `text` is empty.
    pub fn text(&mut self, text: &str, raw: bool) -> io::Result<()> {
        self.finish_tag()?;
        if raw {
            self.sink.write(text)
        } else {
            write_escaped(self.sink, text, false)
        }
    }

    /// Writes markup verbatim.
    #[inline]
    pub fn raw(&mut self, text: &str) -> io::Result<()> {
        self.text(text, true)
    }

    /// Ends the element `name`, self-closing it if nothing was written inside.
    pub fn close(&mut self, name: &str) -> io::Result<()> {
        if self.tag_open {
            self.tag_open = false;
            self.sink.write("/>")
        } else {
            self.sink.write("</")?;
            self.sink.write(name)?;
            self.sink.write(">")
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::MarkupWriter;

    #[test]
    fn text_escapes_markup_but_not_quotes() {
        let mut out = String::new();
        let mut writer = MarkupWriter::new(&mut out);
        writer.open("t").unwrap();
        writer.text(r#"a < b && "c" > d"#, false).unwrap();
        writer.close("t").unwrap();
        assert_eq!(out, r#"<t>a &lt; b &amp;&amp; "c" &gt; d</t>"#);
    }

    #[test]
    fn raw_text_is_verbatim() {
        let mut out = String::new();
        let mut writer = MarkupWriter::new(&mut out);
        writer.open("t").unwrap();
        writer.attribute("a", "<x>", true).unwrap();
        writer.text("<b>bold</b>", true).unwrap();
        writer.close("t").unwrap();
        assert_eq!(out, r#"<t a="<x>"><b>bold</b></t>"#);
    }

    #[test]
    fn multibyte_text_survives_escaping() {
        let mut out = String::new();
        let mut writer = MarkupWriter::new(&mut out);
        writer.text("héllo & wörld", false).unwrap();
        assert_eq!(out, "héllo &amp; wörld");
    }

    #[test]
    fn nested_empty_elements_self_close() {
        let mut out = String::new();
        let mut writer = MarkupWriter::new(&mut out);
        writer.open("a").unwrap();
        writer.open("b").unwrap();
        writer.close("b").unwrap();
        writer.close("a").unwrap();
        assert_eq!(out, "<a><b/></a>");
    }
}
