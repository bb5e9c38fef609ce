//! `multipart/form-data` bodies for file uploads.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ApiError;

/// Field name used for every attached file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub(crate) struct MultipartBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Encode `files` (in order) followed by `fields`. Each file is opened,
/// streamed into the body and closed before the next one is touched; the
/// first unreadable file aborts the whole body.
pub(crate) fn encode(
    files: &[PathBuf],
    fields: &BTreeMap<String, String>,
) -> Result<MultipartBody, ApiError> {
    let boundary = format!("----------------{}", Uuid::new_v4().simple());
    let mut bytes = Vec::new();

    for path in files {
        let attachment = |source| ApiError::Attachment {
            path: path.clone(),
            source,
        };
        let mut file = File::open(path).map_err(attachment)?;
        write_file_header(&mut bytes, &boundary, &base_name(path));
        io::copy(&mut file, &mut bytes).map_err(attachment)?;
        bytes.extend_from_slice(b"\r\n");
    }

    for (name, value) in fields {
        // Writes into a Vec<u8> cannot fail.
        let _ = write!(
            bytes,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
            quote(name)
        );
    }
    let _ = write!(bytes, "--{boundary}--\r\n");

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        bytes,
    })
}

fn write_file_header(bytes: &mut Vec<u8>, boundary: &str, file_name: &str) {
    let _ = write!(
        bytes,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{FILE_FIELD}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        quote(file_name)
    );
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &MultipartBody) -> String {
        String::from_utf8(body.bytes.clone()).unwrap()
    }

    #[test]
    fn files_come_first_in_order_then_fields() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.bin");
        std::fs::write(&first, "one").unwrap();
        std::fs::write(&second, "two").unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("json".to_string(), "{}".to_string());
        let body = encode(&[first, second], &fields).unwrap();
        let text = text(&body);

        let first_at = text.find("filename=\"first.txt\"").unwrap();
        let second_at = text.find("filename=\"second.bin\"").unwrap();
        let field_at = text.find("name=\"json\"").unwrap();
        assert!(first_at < second_at && second_at < field_at);
        assert_eq!(text.matches("name=\"file\";").count(), 2);
        assert!(text.contains("\r\n\r\none\r\n"));
        assert!(text.contains("\r\n\r\ntwo\r\n"));
    }

    #[test]
    fn content_type_carries_the_closing_boundary() {
        let body = encode(&[], &BTreeMap::new()).unwrap();
        let boundary = body
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        assert_eq!(text(&body), format!("--{boundary}--\r\n"));
    }

    #[test]
    fn missing_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "ok").unwrap();
        let missing = dir.path().join("missing.txt");

        let err = encode(&[present, missing.clone()], &BTreeMap::new()).unwrap_err();
        match err {
            ApiError::Attachment { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quotes_are_escaped_in_names() {
        assert_eq!(quote("a\"b"), "a%22b");
    }
}
