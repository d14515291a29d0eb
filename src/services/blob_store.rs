//! Blob storage capability and its local-disk implementation.
//!
//! Blob paths are logical (`uploads/{user}/{owner}_{millis}_{rand}.ext`);
//! `LocalBlobStore` shards them on disk beneath
//! `base_path/{shard}/{shard}/{path}`. Downloads go through short-lived
//! signed URLs served by the `/blobs/{*path}` handler.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Lifetime of every download URL handed out.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(60);

const MAX_BLOB_PATH_LEN: usize = 1024;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("signed url is invalid or expired")]
    BadSignature,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Where file content lives. Not transactional with the tree store.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `bytes` and return the new blob path. `namespace` groups blobs
    /// per user and `owner_id` prefixes the file name; the extension of
    /// `original_name` is kept on the path.
    async fn put(
        &self,
        namespace: &str,
        owner_id: Uuid,
        original_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> BlobResult<String>;

    /// Remove a blob. Removing a missing blob succeeds.
    async fn remove(&self, path: &str) -> BlobResult<()>;

    /// A URL that downloads `path` as `download_name`, served with
    /// `content_type`, until `ttl` elapses.
    async fn signed_url(
        &self,
        path: &str,
        ttl: Duration,
        download_name: &str,
        content_type: &str,
    ) -> BlobResult<String>;

    /// Verify the backing storage accepts writes and reads.
    async fn health_check(&self) -> BlobResult<()>;
}

/// Blob store on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_url: String,
    secret: String,
}

impl LocalBlobStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    /// Reject paths that could escape `base_path`.
    fn ensure_path_safe(path: &str) -> BlobResult<()> {
        let invalid = path.is_empty()
            || path.len() > MAX_BLOB_PATH_LEN
            || path.starts_with('/')
            || path.contains("..")
            || path
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    /// Two-level shard from MD5(path), as lowercase hex bytes.
    fn shards(path: &str) -> (String, String) {
        let digest = md5::compute(path);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Physical location of a blob. Parent directories may not exist yet.
    pub(crate) fn physical_path(&self, path: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(path);
        self.base_path.join(shard_a).join(shard_b).join(path)
    }

    /// Build a fresh logical path for an upload.
    fn new_blob_path(namespace: &str, owner_id: Uuid, original_name: &str) -> String {
        let namespace: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let namespace = namespace.trim_matches('.');
        let ext = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "uploads/{}/{}_{}_{}{}",
            if namespace.is_empty() { "_" } else { namespace },
            owner_id,
            Utc::now().timestamp_millis(),
            &suffix[..12],
            ext
        )
    }

    /// HMAC-SHA256 over every field the URL commits to, NUL separated.
    fn mac(
        &self,
        path: &str,
        expires: i64,
        name: &str,
        content_type: &str,
    ) -> BlobResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|err| BlobError::Io(io::Error::other(err.to_string())))?;
        let expires = expires.to_string();
        for field in [path, expires.as_str(), name, content_type] {
            mac.update(field.as_bytes());
            mac.update(&[0u8]);
        }
        Ok(mac)
    }

    fn signature(
        &self,
        path: &str,
        expires: i64,
        name: &str,
        content_type: &str,
    ) -> BlobResult<String> {
        let mac = self.mac(path, expires, name, content_type)?;
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Check a signed request and open the blob for streaming.
    pub async fn open_signed(
        &self,
        path: &str,
        expires: i64,
        name: &str,
        content_type: &str,
        signature: &str,
    ) -> BlobResult<(File, u64)> {
        Self::ensure_path_safe(path)?;
        if expires < Utc::now().timestamp() {
            return Err(BlobError::BadSignature);
        }
        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| BlobError::BadSignature)?;
        self.mac(path, expires, name, content_type)?
            .verify_slice(&tag)
            .map_err(|_| BlobError::BadSignature)?;

        let physical = self.physical_path(path);
        let file = File::open(&physical).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobError::NotFound(path.to_string())
            } else {
                BlobError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove empty directories from `start` up to (excluding) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        namespace: &str,
        owner_id: Uuid,
        original_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> BlobResult<String> {
        let path = Self::new_blob_path(namespace, owner_id, original_name);
        Self::ensure_path_safe(&path)?;

        let file_path = self.physical_path(&path);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BlobError::InvalidPath(path.clone()))?;
        fs::create_dir_all(&parent).await?;

        // Write to a temp file first so a half-written blob never has the final name.
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let write = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        };
        if let Err(err) = write.await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }

        debug!(
            "stored blob {} ({} bytes, {})",
            path,
            bytes.len(),
            content_type
        );
        Ok(path)
    }

    async fn remove(&self, path: &str) -> BlobResult<()> {
        Self::ensure_path_safe(path)?;
        let file_path = self.physical_path(path);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    async fn signed_url(
        &self,
        path: &str,
        ttl: Duration,
        download_name: &str,
        content_type: &str,
    ) -> BlobResult<String> {
        Self::ensure_path_safe(path)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let sig = self.signature(path, expires, download_name, content_type)?;
        Ok(format!(
            "{}/blobs/{}?expires={}&name={}&type={}&sig={}",
            self.public_url,
            path,
            expires,
            urlencoding::encode(download_name),
            urlencoding::encode(content_type),
            sig
        ))
    }

    async fn health_check(&self) -> BlobResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read? == b"readyz" {
            Ok(())
        } else {
            Err(BlobError::Io(io::Error::other("file content mismatch")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn store(dir: &Path) -> LocalBlobStore {
        LocalBlobStore::new(dir, "http://files.test/", "secret")
    }

    struct Signed {
        path: String,
        expires: i64,
        name: String,
        content_type: String,
        sig: String,
    }

    fn parse(url: &str) -> Signed {
        let rest = url.strip_prefix("http://files.test/blobs/").unwrap();
        let (path, query) = rest.split_once('?').unwrap();
        let mut signed = Signed {
            path: path.to_string(),
            expires: 0,
            name: String::new(),
            content_type: String::new(),
            sig: String::new(),
        };
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            let v = urlencoding::decode(v).unwrap().into_owned();
            match k {
                "expires" => signed.expires = v.parse().unwrap(),
                "name" => signed.name = v,
                "type" => signed.content_type = v,
                "sig" => signed.sig = v,
                _ => {}
            }
        }
        signed
    }

    #[test]
    fn test_new_blob_path_keeps_extension() {
        let owner = Uuid::new_v4();
        let path = LocalBlobStore::new_blob_path("ann", owner, "report.final.PDF");
        assert!(path.starts_with(&format!("uploads/ann/{owner}_")));
        assert!(path.ends_with(".PDF"));
        let file_name = path.rsplit('/').next().unwrap();
        assert_eq!(file_name.split('_').count(), 3);

        let path = LocalBlobStore::new_blob_path("../evil user", owner, "noext");
        assert!(path.starts_with("uploads/"));
        assert!(!path.contains(".."));
        assert!(!path.contains(' '));
        assert!(LocalBlobStore::ensure_path_safe(&path).is_ok());
    }

    #[test]
    fn test_ensure_path_safe() {
        assert!(LocalBlobStore::ensure_path_safe("uploads/a/b.txt").is_ok());
        for bad in ["", "/etc/passwd", "uploads/../x", "a\\b", "a\0b"] {
            assert!(LocalBlobStore::ensure_path_safe(bad).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_put_sign_open_remove() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());

        let path = blobs
            .put("ann", Uuid::new_v4(), "hello.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        assert!(path.ends_with(".txt"));
        assert!(blobs.physical_path(&path).exists());

        let url = blobs
            .signed_url(&path, SIGNED_URL_TTL, "greeting.txt", "text/plain")
            .await
            .unwrap();
        let signed = parse(&url);
        assert_eq!(signed.path, path);
        assert_eq!(signed.name, "greeting.txt");
        assert_eq!(signed.content_type, "text/plain");
        assert!(signed.expires > Utc::now().timestamp());
        assert!(signed.expires <= Utc::now().timestamp() + 60);

        let open = |name: &'static str, content_type: &'static str, sig: String| {
            let blobs = blobs.clone();
            let path = path.clone();
            let expires = signed.expires;
            async move { blobs.open_signed(&path, expires, name, content_type, &sig).await }
        };

        let (mut file, len) = open("greeting.txt", "text/plain", signed.sig.clone()).await.unwrap();
        assert_eq!(len, 5);
        let mut body = String::new();
        file.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello");

        let renamed = open("other.txt", "text/plain", signed.sig.clone()).await;
        assert!(matches!(renamed, Err(BlobError::BadSignature)));
        let retyped = open("greeting.txt", "text/html", signed.sig.clone()).await;
        assert!(matches!(retyped, Err(BlobError::BadSignature)));
        let garbled = open("greeting.txt", "text/plain", "not base64!".into()).await;
        assert!(matches!(garbled, Err(BlobError::BadSignature)));
        let truncated = open("greeting.txt", "text/plain", signed.sig[..10].to_string()).await;
        assert!(matches!(truncated, Err(BlobError::BadSignature)));

        blobs.remove(&path).await.unwrap();
        assert!(!blobs.physical_path(&path).exists());
        // Removing twice is fine.
        blobs.remove(&path).await.unwrap();

        let gone = open("greeting.txt", "text/plain", signed.sig.clone()).await;
        assert!(matches!(gone, Err(BlobError::NotFound(_))));
    }

    #[test]
    fn test_signature_is_keyed() {
        let a = store(Path::new("/unused"));
        let b = LocalBlobStore::new("/unused", "http://files.test", "other secret");
        let sig_a = a.signature("uploads/a/x.txt", 10, "x.txt", "text/plain").unwrap();
        let sig_b = b.signature("uploads/a/x.txt", 10, "x.txt", "text/plain").unwrap();
        assert_ne!(sig_a, sig_b);
        // 32-byte tag, base64url without padding.
        assert_eq!(sig_a.len(), 43);
    }

    #[tokio::test]
    async fn test_expired_signature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        let path = blobs
            .put(
                "ann",
                Uuid::new_v4(),
                "a.bin",
                Bytes::from_static(b"x"),
                "application/octet-stream",
            )
            .await
            .unwrap();
        let expires = Utc::now().timestamp() - 1;
        let sig = blobs
            .signature(&path, expires, "a.bin", "application/octet-stream")
            .unwrap();
        let result = blobs
            .open_signed(&path, expires, "a.bin", "application/octet-stream", &sig)
            .await;
        assert!(matches!(result, Err(BlobError::BadSignature)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        store(&dir.path().join("fresh")).health_check().await.unwrap();
    }
}
