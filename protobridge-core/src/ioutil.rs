//! Small I/O helpers shared by the handler adapters and the descriptor loader.

use crate::error::{GatewayError, Result};
use bytes::Bytes;
use http_body_util::BodyExt;

/// Read an HTTP body, failing once more than `max_size` bytes have been read.
///
/// `max_size < 0` means unbounded.
pub async fn read_body_bounded<B>(body: B, max_size: i64) -> Result<Vec<u8>>
where
    B: http_body_util::BodyExt<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let mut body = body;
    let mut buf = Vec::new();
    while let Some(frame) = body
        .frame()
        .await
        .transpose()
        .map_err(|e| GatewayError::Io(std::io::Error::other(e.to_string())))?
    {
        if let Ok(data) = frame.into_data() {
            if max_size >= 0 && (buf.len() + data.len()) as i64 > max_size {
                return Err(GatewayError::Io(std::io::Error::other(
                    "request body exceeds maximum size",
                )));
            }
            buf.extend_from_slice(&data);
        }
    }
    Ok(buf)
}

/// Read a `FileDescriptorSet` blob from disk.
pub fn load_descriptor_set(path: &std::path::Path) -> Result<prost_types::FileDescriptorSet> {
    let bytes = std::fs::read(path)?;
    prost::Message::decode(bytes.as_slice())
        .map_err(|e| GatewayError::Resolve(format!("invalid descriptor set {path:?}: {e}")))
}

/// Shrink a `Vec` to exactly fit its contents, freeing any excess capacity.
///
/// Equivalent in spirit to a handwritten `Shrink` helper; `Vec::shrink_to_fit`
/// already does this, so this exists to give the operation a name at call sites
/// that build up a `Vec` incrementally and then freeze it (baked field/binding lists).
pub fn shrink<T>(mut v: Vec<T>) -> Vec<T> {
    v.shrink_to_fit();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn reads_full_body_within_limit() {
        let body = Full::new(Bytes::from_static(b"hello world"));
        let data = read_body_bounded(body, 1024).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn rejects_body_over_limit() {
        let body = Full::new(Bytes::from_static(b"hello world"));
        let err = read_body_bounded(body, 4).await.unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[tokio::test]
    async fn unbounded_when_negative() {
        let body = Full::new(Bytes::from_static(b"hello world"));
        let data = read_body_bounded(body, -1).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn shrink_preserves_contents() {
        let mut v = Vec::with_capacity(64);
        v.push(1);
        v.push(2);
        let v = shrink(v);
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn load_descriptor_set_rejects_garbage() {
        let dir = std::env::temp_dir();
        let path = dir.join("protobridge_test_not_a_descriptor.bin");
        std::fs::write(&path, b"\xff\xff\xff not a valid descriptor").unwrap();
        let result = load_descriptor_set(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
