use bytes::{BufMut, Bytes, BytesMut};
use mime::Mime;

/// In-memory `multipart/form-data` body.
///
/// Every part is a file part whose field name doubles as its file name. The
/// encoded body is a single [`Bytes`] so each attempt can resend it.
#[derive(Debug)]
pub(crate) struct Multipart {
    boundary: String,
    fields: Vec<(String, Bytes)>,
}

impl Multipart {
    pub(crate) fn new() -> Self {
        Self {
            boundary: gen_boundary(),
            fields: Vec::new(),
        }
    }

    #[cfg(test)]
    fn with_boundary(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_owned(),
            fields: Vec::new(),
        }
    }

    pub(crate) fn add_file(&mut self, name: String, content: Bytes) {
        self.fields.push((name, content));
    }

    /// `multipart/form-data; boundary=...` for the request header.
    pub(crate) fn content_type(&self) -> Mime {
        format!("{}; boundary={}", mime::MULTIPART_FORM_DATA, self.boundary)
            .parse()
            .unwrap_or(mime::MULTIPART_FORM_DATA)
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        let capacity = self
            .fields
            .iter()
            .map(|(name, content)| content.len() + 2 * name.len() + self.boundary.len() + 128)
            .sum::<usize>()
            + self.boundary.len()
            + 8;
        let mut buf = BytesMut::with_capacity(capacity);
        for (name, content) in &self.fields {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");
            encode_headers(&mut buf, name);
            buf.put_slice(b"\r\n\r\n");
            buf.put_slice(content);
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");
        buf.freeze()
    }
}

fn gen_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn encode_headers(buf: &mut BytesMut, name: &str) {
    let name = escape_quotes(name);
    buf.put_slice(b"content-disposition: form-data; name=\"");
    buf.put_slice(name.as_bytes());
    buf.put_slice(b"\"; filename=\"");
    buf.put_slice(name.as_bytes());
    buf.put_slice(b"\"\r\ncontent-type: ");
    buf.put_slice(mime::APPLICATION_OCTET_STREAM.as_ref().as_bytes());
}

fn escape_quotes(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
