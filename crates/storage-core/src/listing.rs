//! Incremental decoding of the gateway's `/list` response.
//!
//! The gateway answers with one JSON array. Elements are cut out of the body
//! stream as soon as their closing byte arrives and deserialized one by one,
//! so the first entry is available long before a large listing has finished
//! downloading.

use std::collections::VecDeque;

use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use storage_platform::error::{Operation, StorageError};
use storage_platform::filesystem::{
    ByteStream, DirectoryAttributes, FileAttributes, ListingStream, StorageAttributes,
};
use storage_platform::path::PathPrefixer;

/// One entry of a `/list` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingRecord {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "timestamp")]
    pub mtime: Option<i64>,
    pub is_file: bool,
}

impl ListingRecord {
    /// Convert into caller-facing attributes, stripping the root from the path
    pub fn into_attributes(self, prefixer: &PathPrefixer) -> StorageAttributes {
        let path = prefixer.strip_prefix(&self.path);
        if self.is_file {
            StorageAttributes::File(FileAttributes {
                path,
                file_size: self.size,
                visibility: None,
                last_modified: self.mtime,
                mime_type: None,
            })
        } else {
            StorageAttributes::Directory(DirectoryAttributes {
                path,
                visibility: None,
                last_modified: self.mtime,
            })
        }
    }
}

/// Accepts integer or fractional Unix timestamps
fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    BeforeArray,
    BetweenElements,
    InElement,
    Done,
}

/// Splits a streamed top-level JSON array into the raw bytes of its elements
#[derive(Debug)]
pub struct JsonArraySplitter {
    state: SplitState,
    depth: usize,
    in_string: bool,
    escaped: bool,
    current: Vec<u8>,
}

impl Default for JsonArraySplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonArraySplitter {
    pub fn new() -> Self {
        Self {
            state: SplitState::BeforeArray,
            depth: 0,
            in_string: false,
            escaped: false,
            current: Vec::new(),
        }
    }

    /// Feed the next body chunk; complete elements are appended to `out`
    pub fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Vec<u8>>) -> Result<(), String> {
        for &byte in chunk {
            match self.state {
                SplitState::BeforeArray => match byte {
                    b'[' => self.state = SplitState::BetweenElements,
                    b if b.is_ascii_whitespace() => {}
                    other => {
                        return Err(format!("expected a JSON array, found {:?}", other as char))
                    }
                },
                SplitState::BetweenElements => match byte {
                    b']' => self.state = SplitState::Done,
                    b',' => {}
                    b if b.is_ascii_whitespace() => {}
                    other => {
                        self.state = SplitState::InElement;
                        self.consume(other)?;
                    }
                },
                SplitState::InElement => {
                    if !self.in_string && self.depth == 0 && (byte == b',' || byte == b']') {
                        out.push_back(std::mem::take(&mut self.current));
                        self.state = if byte == b']' {
                            SplitState::Done
                        } else {
                            SplitState::BetweenElements
                        };
                    } else {
                        self.consume(byte)?;
                    }
                }
                SplitState::Done => {
                    if !byte.is_ascii_whitespace() {
                        return Err("unexpected data after the listing array".to_string());
                    }
                }
            }
        }
        Ok(())
    }

    /// Call once the body has ended
    pub fn finish(&self) -> Result<(), String> {
        match self.state {
            SplitState::Done => Ok(()),
            SplitState::BeforeArray => Err("empty listing response".to_string()),
            _ => Err("truncated listing response".to_string()),
        }
    }

    fn consume(&mut self, byte: u8) -> Result<(), String> {
        self.current.push(byte);
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return Ok(());
        }
        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced brackets in listing response".to_string())?;
            }
            _ => {}
        }
        Ok(())
    }
}

struct DecodeState {
    body: ByteStream,
    splitter: JsonArraySplitter,
    ready: VecDeque<Vec<u8>>,
    exhausted: bool,
    prefixer: PathPrefixer,
    operation: Operation,
    path: String,
}

/// Turn a `/list` response body into a lazy stream of attributes
pub fn decode_listing(
    body: ByteStream,
    prefixer: PathPrefixer,
    operation: Operation,
    path: String,
) -> ListingStream {
    let state = DecodeState {
        body,
        splitter: JsonArraySplitter::new(),
        ready: VecDeque::new(),
        exhausted: false,
        prefixer,
        operation,
        path,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(raw) = state.ready.pop_front() {
                let record: ListingRecord = serde_json::from_slice(&raw).map_err(|e| {
                    StorageError::invalid_response(state.operation, &state.path, e)
                })?;
                if !state.prefixer.contains(&record.path) {
                    warn!(
                        "skipping listed path {} outside root {}",
                        record.path,
                        state.prefixer.root()
                    );
                    continue;
                }
                let attrs = record.into_attributes(&state.prefixer);
                return Ok::<_, StorageError>(Some((attrs, state)));
            }
            if state.exhausted {
                return Ok(None);
            }
            match state.body.try_next().await? {
                Some(chunk) => state
                    .splitter
                    .push(&chunk, &mut state.ready)
                    .map_err(|reason| {
                        StorageError::invalid_response(state.operation, &state.path, reason)
                    })?,
                None => {
                    state.splitter.finish().map_err(|reason| {
                        StorageError::invalid_response(state.operation, &state.path, reason)
                    })?;
                    state.exhausted = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn split_all(chunks: &[&[u8]]) -> Result<Vec<String>, String> {
        let mut splitter = JsonArraySplitter::new();
        let mut out = VecDeque::new();
        for chunk in chunks {
            splitter.push(chunk, &mut out)?;
        }
        splitter.finish()?;
        Ok(out
            .into_iter()
            .map(|raw| String::from_utf8(raw).unwrap().trim().to_string())
            .collect())
    }

    fn body(chunks: Vec<&'static str>) -> ByteStream {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )
        .boxed()
    }

    #[test]
    fn test_split_whole_body() {
        let elements = split_all(&[r#"[{"a":1}, {"b":[1,2]} ,{"c":{}}]"#.as_bytes()]).unwrap();
        assert_eq!(elements, vec![r#"{"a":1}"#, r#"{"b":[1,2]}"#, r#"{"c":{}}"#]);
    }

    #[test]
    fn test_split_byte_by_byte() {
        let body = r#" [ {"path":"/r/a","is_file":true} , {"path":"/r/b","is_file":false} ] "#;
        let chunks: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        let elements = split_all(&chunks).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1], r#"{"path":"/r/b","is_file":false}"#);
    }

    #[test]
    fn test_split_strings_with_brackets_and_escapes() {
        let elements = split_all(&[r#"[{"path":"/r/odd], \"name\" {x}"}]"#.as_bytes()]).unwrap();
        assert_eq!(elements, vec![r#"{"path":"/r/odd], \"name\" {x}"}"#]);
    }

    #[test]
    fn test_split_empty_array() {
        assert!(split_all(&["[".as_bytes(), " ]\n".as_bytes()]).unwrap().is_empty());
    }

    #[test]
    fn test_split_errors() {
        for body in [r#"[{"a":1}"#, r#"{"a":1}"#, "[1] x", "", "[}]"] {
            assert!(split_all(&[body.as_bytes()]).is_err(), "accepted {:?}", body);
        }
    }

    #[test]
    fn test_record_into_attributes() {
        let prefixer = PathPrefixer::new("/elabftw/uploads");
        let record: ListingRecord = serde_json::from_str(
            r#"{"path":"/elabftw/uploads/a/b.txt","size":2,"mtime":1700000000.75,"is_file":true}"#,
        )
        .unwrap();
        assert_eq!(
            record.into_attributes(&prefixer),
            StorageAttributes::File(FileAttributes {
                path: "a/b.txt".to_string(),
                file_size: Some(2),
                visibility: None,
                last_modified: Some(1_700_000_000),
                mime_type: None,
            })
        );

        let record: ListingRecord =
            serde_json::from_str(r#"{"path":"/elabftw/uploads/a/c","is_file":false}"#).unwrap();
        assert_eq!(
            record.into_attributes(&prefixer),
            StorageAttributes::Directory(DirectoryAttributes::new("a/c"))
        );
    }

    #[tokio::test]
    async fn test_decode_listing_across_chunks() {
        let listing = decode_listing(
            body(vec![
                r#"[{"path":"/root/a","size":1,"mt"#,
                r#"ime":5,"is_file":true},"#,
                r#"{"path":"/root/d","size":0,"mtime":6,"is_file":false}]"#,
            ]),
            PathPrefixer::new("/root"),
            Operation::ListContents,
            "".to_string(),
        );
        let entries: Vec<StorageAttributes> = listing.try_collect().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_file());
        assert_eq!(entries[0].path(), "a");
        assert!(entries[1].is_dir());
        assert_eq!(entries[1].last_modified(), Some(6));
    }

    #[tokio::test]
    async fn test_decode_listing_skips_paths_outside_root() {
        let listing = decode_listing(
            body(vec![
                r#"[{"path":"/data/a","is_file":true},"#,
                r#"{"path":"/database/x","is_file":true},"#,
                r#"{"path":"/data/b","is_file":false}]"#,
            ]),
            PathPrefixer::new("/data"),
            Operation::ListContents,
            "".to_string(),
        );
        let paths: Vec<String> = listing
            .map_ok(|entry| entry.path().to_string())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_decode_listing_yields_entries_before_error() {
        let mut listing = decode_listing(
            body(vec![r#"[{"path":"/root/a","is_file":true},{"path":"#]),
            PathPrefixer::new("/root"),
            Operation::ListContents,
            "".to_string(),
        );
        let first = listing.try_next().await.unwrap().unwrap();
        assert_eq!(first.path(), "a");
        let err = listing.try_next().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_decode_listing_rejects_bad_record() {
        let mut listing = decode_listing(
            body(vec![r#"[{"path":"/root/a"}]"#]),
            PathPrefixer::new("/root"),
            Operation::ListContents,
            "".to_string(),
        );
        assert!(matches!(
            listing.try_next().await,
            Err(StorageError::InvalidResponse { .. })
        ));
    }
}
